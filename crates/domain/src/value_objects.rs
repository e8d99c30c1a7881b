use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 消息内容的最大字符数。
pub const MAX_MESSAGE_CHARS: usize = 1000;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识（由认证服务签发）。
    UserId
);
uuid_id!(
    /// 聊天室唯一标识。
    ChatRoomId
);
uuid_id!(
    /// 消息唯一标识。
    MessageId
);
uuid_id!(
    /// 商家唯一标识（由目录服务维护）。
    BusinessId
);
uuid_id!(
    /// 单条实时连接的标识，仅存在于内存中。
    ConnectionId
);

/// 经过验证的消息内容：非空且不超过 [`MAX_MESSAGE_CHARS`] 个字符。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::invalid_argument("content", "cannot be empty"));
        }
        // 按字符计数，而不是字节
        let chars = value.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(DomainError::invalid_argument(
                "content",
                format!("too long ({chars} > {MAX_MESSAGE_CHARS} characters)"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageContent> for String {
    fn from(value: MessageContent) -> Self {
        value.0
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_rejects_only_the_empty_string() {
        assert!(MessageContent::new("").is_err());
        // 空白也是内容
        assert_eq!(MessageContent::new("   \n").unwrap().as_str(), "   \n");
    }

    #[test]
    fn content_bound_counts_characters() {
        let exact = "a".repeat(MAX_MESSAGE_CHARS);
        assert!(MessageContent::new(exact).is_ok());

        let over = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            MessageContent::new(over),
            Err(DomainError::InvalidArgument { .. })
        ));

        // 多字节字符按字符计数
        let wide = "你".repeat(MAX_MESSAGE_CHARS);
        assert!(MessageContent::new(wide).is_ok());
    }

    #[test]
    fn ids_parse_from_text() {
        let id = Uuid::new_v4();
        let parsed: ChatRoomId = id.to_string().parse().unwrap();
        assert_eq!(parsed, ChatRoomId::from(id));
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }
}
