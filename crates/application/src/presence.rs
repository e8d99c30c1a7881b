//! 输入状态广播
//!
//! 输入状态是瞬时的，不持久化。这里只记录每个连接当前在哪些会话里
//! 处于「正在输入」，以便连接断开或离开会话时补发一次 `isTyping = false`。

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use domain::{ChatRoomId, ConnectionId, RoomKey, UserId};

use crate::outbound::ServerEvent;
use crate::registry::RoomRegistry;

pub struct TypingBroadcaster {
    registry: Arc<RoomRegistry>,
    typing: DashMap<ConnectionId, HashSet<ChatRoomId>>,
}

impl TypingBroadcaster {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            typing: DashMap::new(),
        }
    }

    /// 向会话房间的其他连接广播输入状态
    ///
    /// 连接未加入 `chat:{id}` 时静默忽略，返回送达的连接数。
    pub fn set_typing(
        &self,
        connection: ConnectionId,
        user_id: UserId,
        chat_room_id: ChatRoomId,
        is_typing: bool,
    ) -> usize {
        let room = RoomKey::Chat(chat_room_id);
        if !self.registry.is_member(connection, &room) {
            tracing::trace!(
                connection_id = %connection,
                chat_room_id = %chat_room_id,
                "typing update from connection outside the room ignored"
            );
            return 0;
        }

        if is_typing {
            self.typing.entry(connection).or_default().insert(chat_room_id);
        } else {
            self.forget(connection, chat_room_id);
        }

        self.registry.deliver(
            &[room],
            ServerEvent::TypingChanged {
                chat_room_id,
                user_id,
                is_typing,
            },
            Some(connection),
        )
    }

    /// 连接离开会话房间时调用；若它仍在输入，则通知其他人已停止
    pub fn clear_room(&self, connection: ConnectionId, user_id: UserId, chat_room_id: ChatRoomId) {
        if self.forget(connection, chat_room_id) {
            self.announce_stopped(connection, user_id, chat_room_id);
        }
    }

    /// 连接断开时调用；须在连接从注册表移除之后调用
    pub fn clear_connection(&self, connection: ConnectionId, user_id: UserId) {
        let Some((_, rooms)) = self.typing.remove(&connection) else {
            return;
        };
        for chat_room_id in rooms {
            self.announce_stopped(connection, user_id, chat_room_id);
        }
    }

    pub fn is_typing(&self, connection: ConnectionId, chat_room_id: ChatRoomId) -> bool {
        self.typing
            .get(&connection)
            .map(|rooms| rooms.contains(&chat_room_id))
            .unwrap_or(false)
    }

    fn forget(&self, connection: ConnectionId, chat_room_id: ChatRoomId) -> bool {
        let removed = self
            .typing
            .get_mut(&connection)
            .map(|mut rooms| rooms.remove(&chat_room_id))
            .unwrap_or(false);
        self.typing.remove_if(&connection, |_, rooms| rooms.is_empty());
        removed
    }

    fn announce_stopped(&self, connection: ConnectionId, user_id: UserId, chat_room_id: ChatRoomId) {
        tracing::debug!(
            connection_id = %connection,
            chat_room_id = %chat_room_id,
            "clearing stale typing state"
        );
        self.registry.deliver(
            &[RoomKey::Chat(chat_room_id)],
            ServerEvent::TypingChanged {
                chat_room_id,
                user_id,
                is_typing: false,
            },
            Some(connection),
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::UserRole;

    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::registry::ConnectionHandle;

    fn connect(registry: &RoomRegistry) -> ConnectionHandle {
        registry.register(
            AuthenticatedUser {
                user_id: UserId::generate(),
                role: UserRole::User,
            },
            Utc::now(),
        )
    }

    fn typing_event(event: &ServerEvent) -> (UserId, bool) {
        match event {
            ServerEvent::TypingChanged {
                user_id, is_typing, ..
            } => (*user_id, *is_typing),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn typing_reaches_other_members_only() {
        let registry = Arc::new(RoomRegistry::new(8));
        let typing = TypingBroadcaster::new(Arc::clone(&registry));
        let room = ChatRoomId::generate();

        let mut sender = connect(&registry);
        let mut peer = connect(&registry);
        let mut outsider = connect(&registry);
        registry.join(sender.id, RoomKey::Chat(room)).unwrap();
        registry.join(peer.id, RoomKey::Chat(room)).unwrap();

        let delivered = typing.set_typing(sender.id, sender.user.user_id, room, true);
        assert_eq!(delivered, 1);

        let event = peer.events.recv().await.unwrap();
        assert_eq!(typing_event(&event), (sender.user.user_id, true));
        assert!(sender.events.try_recv().is_err());
        assert!(outsider.events.try_recv().is_err());
    }

    #[test]
    fn typing_outside_joined_room_is_ignored() {
        let registry = Arc::new(RoomRegistry::new(8));
        let typing = TypingBroadcaster::new(Arc::clone(&registry));
        let sender = connect(&registry);
        let room = ChatRoomId::generate();

        assert_eq!(typing.set_typing(sender.id, sender.user.user_id, room, true), 0);
        assert!(!typing.is_typing(sender.id, room));
    }

    #[tokio::test]
    async fn disconnect_clears_typing_state() {
        let registry = Arc::new(RoomRegistry::new(8));
        let typing = TypingBroadcaster::new(Arc::clone(&registry));
        let room = ChatRoomId::generate();

        let sender = connect(&registry);
        let mut peer = connect(&registry);
        registry.join(sender.id, RoomKey::Chat(room)).unwrap();
        registry.join(peer.id, RoomKey::Chat(room)).unwrap();

        typing.set_typing(sender.id, sender.user.user_id, room, true);
        let _ = peer.events.recv().await;

        registry.unregister(sender.id);
        typing.clear_connection(sender.id, sender.user.user_id);

        let event = peer.events.recv().await.unwrap();
        assert_eq!(typing_event(&event), (sender.user.user_id, false));
        assert!(!typing.is_typing(sender.id, room));
    }

    #[tokio::test]
    async fn stopping_explicitly_leaves_nothing_to_clear() {
        let registry = Arc::new(RoomRegistry::new(8));
        let typing = TypingBroadcaster::new(Arc::clone(&registry));
        let room = ChatRoomId::generate();

        let sender = connect(&registry);
        let mut peer = connect(&registry);
        registry.join(sender.id, RoomKey::Chat(room)).unwrap();
        registry.join(peer.id, RoomKey::Chat(room)).unwrap();

        typing.set_typing(sender.id, sender.user.user_id, room, true);
        typing.set_typing(sender.id, sender.user.user_id, room, false);
        assert!(peer.events.recv().await.is_some());
        assert!(peer.events.recv().await.is_some());

        typing.clear_room(sender.id, sender.user.user_id, room);
        assert!(peer.events.try_recv().is_err());
    }
}
