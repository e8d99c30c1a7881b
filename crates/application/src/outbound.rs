use domain::{
    AdminEventKind, BusinessEventKind, BusinessId, ChatRoomId, Message, ReviewEventKind, UserId,
};
use serde_json::Value;

/// 推送给已连接客户端的事件
///
/// 同一个事件会被多个连接共享（`Arc<ServerEvent>`），线上的事件名与
/// 帧格式由传输层决定。
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    MessageCreated(Message),
    TypingChanged {
        chat_room_id: ChatRoomId,
        user_id: UserId,
        is_typing: bool,
    },
    Admin {
        kind: AdminEventKind,
        payload: Value,
    },
    Business {
        business_id: BusinessId,
        kind: BusinessEventKind,
        payload: Value,
    },
    Review {
        business_id: BusinessId,
        kind: ReviewEventKind,
        payload: Value,
    },
}

impl ServerEvent {
    /// 日志用的简短名称
    pub fn label(&self) -> &'static str {
        match self {
            ServerEvent::MessageCreated(_) => "message.created",
            ServerEvent::TypingChanged { .. } => "typing.changed",
            ServerEvent::Admin { .. } => "admin",
            ServerEvent::Business { .. } => "business",
            ServerEvent::Review { .. } => "review",
        }
    }
}
