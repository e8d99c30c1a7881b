//! 由 CRUD 服务层触发、经实时通道分发的业务事件种类。
//!
//! 事件种类是封闭集合；字符串名只用于线协议（`admin.<kind>` 等）。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

macro_rules! event_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(DomainError::invalid_argument(
                        "kind",
                        format!("unknown event kind `{other}`"),
                    )),
                }
            }
        }
    };
}

event_kind!(
    /// 投递到 `admin` 房间的事件
    AdminEventKind {
        NewBusiness => "newBusiness",
        NewReport => "newReport",
        UserActivity => "userActivity",
        StatsUpdate => "statsUpdate",
        UserRoleUpdated => "userRoleUpdated",
        BusinessVerified => "businessVerified",
        BusinessDeleted => "businessDeleted",
        ReportHandled => "reportHandled",
        VerificationHandled => "verificationHandled",
    }
);

event_kind!(
    /// 投递到 `business:{id}` 房间的事件
    BusinessEventKind {
        BusinessCreated => "businessCreated",
        BusinessUpdated => "businessUpdated",
        BusinessDeleted => "businessDeleted",
        BusinessVerified => "businessVerified",
        BusinessClaimed => "businessClaimed",
    }
);

event_kind!(
    /// 投递到 `business:{id}` 与 `admin` 房间的评价事件
    ReviewEventKind {
        ReviewCreated => "reviewCreated",
        ReviewUpdated => "reviewUpdated",
        ReviewDeleted => "reviewDeleted",
        ReviewLikeToggled => "reviewLikeToggled",
    }
);
