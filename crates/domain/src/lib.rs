//! 商家聊天中继的核心领域模型
//!
//! 包含会话、消息、外部身份、广播房间标识和业务事件种类，
//! 以及持久化协作者的接口。

pub mod chat_room;
pub mod errors;
pub mod events;
pub mod message;
pub mod repository;
pub mod room_key;
pub mod user;
pub mod value_objects;

// 重新导出常用类型
pub use chat_room::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use repository::*;
pub use room_key::*;
pub use user::*;
pub use value_objects::*;
