//! 实时广播房间的标识。
//!
//! 房间是纯内存中的路由概念，与持久化的 [`ChatRoom`](crate::ChatRoom) 不同。
//! 文本形式为 `user:{id}`、`chat:{id}`、`business:{id}` 和 `admin`。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{BusinessId, ChatRoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoomKey {
    /// 每个用户自己的房间，连接建立时自动加入
    User(UserId),
    /// 一个聊天室的所有在线参与者
    Chat(ChatRoomId),
    /// 商家所有者接收商家/评价事件
    Business(BusinessId),
    /// 管理员广播房间
    Admin,
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::User(id) => write!(f, "user:{id}"),
            RoomKey::Chat(id) => write!(f, "chat:{id}"),
            RoomKey::Business(id) => write!(f, "business:{id}"),
            RoomKey::Admin => f.write_str("admin"),
        }
    }
}

impl FromStr for RoomKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "admin" {
            return Ok(RoomKey::Admin);
        }

        let invalid = || DomainError::invalid_argument("room", format!("unrecognized room `{s}`"));
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        match kind {
            "user" => id.parse().map(RoomKey::User).map_err(|_| invalid()),
            "chat" => id.parse().map(RoomKey::Chat).map_err(|_| invalid()),
            "business" => id.parse().map(RoomKey::Business).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for RoomKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RoomKey> for String {
    fn from(value: RoomKey) -> Self {
        value.to_string()
    }
}
