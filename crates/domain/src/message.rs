use serde::{Deserialize, Serialize};

use crate::chat_room::ChatRoom;
use crate::errors::DomainError;
use crate::value_objects::{ChatRoomId, MessageContent, MessageId, Timestamp, UserId};

/// 会话中的一条消息。除 `is_read` 外创建后不可变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_room_id: ChatRoomId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub created_at: Timestamp,
    pub is_read: bool,
}

impl Message {
    /// 构造一条待持久化的消息。
    ///
    /// 调用方必须已确认 `sender_id` 是 `room` 的参与者；这里只校验接收者。
    pub fn compose(
        id: MessageId,
        room: &ChatRoom,
        sender_id: UserId,
        receiver_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if receiver_id == sender_id {
            return Err(DomainError::invalid_argument(
                "receiver_id",
                "cannot send a message to yourself",
            ));
        }
        if !room.has_participant(receiver_id) {
            return Err(DomainError::invalid_argument(
                "receiver_id",
                "receiver is not a participant of this chat room",
            ));
        }

        Ok(Self {
            id,
            chat_room_id: room.id,
            sender_id,
            receiver_id,
            content,
            created_at,
            is_read: false,
        })
    }

    pub fn mark_read(&mut self) {
        self.is_read = true;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::value_objects::BusinessId;

    #[test]
    fn compose_requires_receiver_in_room() {
        let user = UserId::generate();
        let owner = UserId::generate();
        let room = ChatRoom::open(
            ChatRoomId::generate(),
            BusinessId::generate(),
            user,
            owner,
            Utc::now(),
        )
        .unwrap();
        let content = MessageContent::new("Hello!").unwrap();

        let message = Message::compose(
            MessageId::generate(),
            &room,
            user,
            owner,
            content.clone(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(message.chat_room_id, room.id);
        assert!(!message.is_read);

        let outsider = UserId::generate();
        assert!(Message::compose(
            MessageId::generate(),
            &room,
            user,
            outsider,
            content.clone(),
            Utc::now()
        )
        .is_err());
        assert!(
            Message::compose(MessageId::generate(), &room, user, user, content, Utc::now())
                .is_err()
        );
    }
}
