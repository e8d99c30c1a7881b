//! 房间成员注册表
//!
//! 维护「房间 -> 连接」与「连接 -> 房间」两张映射，只存在于内存中，
//! 服务重启后由客户端重新连接并加入房间来重建。
//!
//! 加锁顺序固定为先连接、后房间；广播时先复制成员列表再逐个投递，
//! 投递过程中不持有房间的锁。

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use domain::{ConnectionId, RoomKey, Timestamp};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::auth::AuthenticatedUser;
use crate::outbound::ServerEvent;

pub type EventSender = mpsc::Sender<Arc<ServerEvent>>;
pub type EventReceiver = mpsc::Receiver<Arc<ServerEvent>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection is not registered")]
    UnknownConnection,
    #[error("room {0} is not accessible to this connection")]
    Forbidden(RoomKey),
}

struct ConnectionEntry {
    user: AuthenticatedUser,
    sender: EventSender,
    rooms: HashSet<RoomKey>,
}

/// 新注册连接的句柄，`events` 收到的是推送给该连接的事件
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: AuthenticatedUser,
    pub events: EventReceiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub connections: usize,
    pub rooms: usize,
    pub memberships: usize,
}

pub struct RoomRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<RoomKey, HashSet<ConnectionId>>,
    outbound_buffer: usize,
}

impl RoomRegistry {
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// 注册一个已认证的连接，并自动加入个人房间（管理员额外加入 `admin`）
    pub fn register(&self, user: AuthenticatedUser, connected_at: Timestamp) -> ConnectionHandle {
        let id = ConnectionId::generate();
        let (sender, events) = mpsc::channel(self.outbound_buffer);

        let mut automatic = vec![RoomKey::User(user.user_id)];
        if user.is_admin() {
            automatic.push(RoomKey::Admin);
        }

        let mut entry = ConnectionEntry {
            user,
            sender,
            rooms: HashSet::new(),
        };

        // 先登记房间，再把连接放进表里；此时外部还拿不到这个 id
        for room in automatic {
            self.rooms.entry(room).or_default().insert(id);
            entry.rooms.insert(room);
        }
        self.connections.insert(id, entry);

        tracing::debug!(
            connection_id = %id,
            user_id = %user.user_id,
            role = %user.role,
            connected_at = %connected_at,
            "connection registered"
        );

        ConnectionHandle { id, user, events }
    }

    /// 移除连接及其所有房间成员关系，返回它曾加入的房间
    pub fn unregister(&self, id: ConnectionId) -> Option<Vec<RoomKey>> {
        let (_, entry) = self.connections.remove(&id)?;

        let rooms: Vec<RoomKey> = entry.rooms.into_iter().collect();
        for room in &rooms {
            self.detach(room, id);
        }

        tracing::debug!(
            connection_id = %id,
            user_id = %entry.user.user_id,
            rooms = rooms.len(),
            "connection unregistered"
        );
        Some(rooms)
    }

    /// 加入房间，重复加入无副作用；返回是否新加入
    ///
    /// 只校验注册表自身能判断的规则（`admin` 与个人房间），
    /// 会话和商家房间的归属由调用方先行确认。
    pub fn join(&self, id: ConnectionId, room: RoomKey) -> Result<bool, RegistryError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection)?;

        match room {
            RoomKey::Admin if !entry.user.is_admin() => return Err(RegistryError::Forbidden(room)),
            RoomKey::User(owner) if owner != entry.user.user_id => {
                return Err(RegistryError::Forbidden(room))
            }
            _ => {}
        }

        if !entry.rooms.insert(room) {
            return Ok(false);
        }
        self.rooms.entry(room).or_default().insert(id);
        Ok(true)
    }

    /// 离开房间，未加入时无副作用；返回是否确实离开
    pub fn leave(&self, id: ConnectionId, room: RoomKey) -> Result<bool, RegistryError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection)?;

        if !entry.rooms.remove(&room) {
            return Ok(false);
        }
        self.detach(&room, id);
        Ok(true)
    }

    fn detach(&self, room: &RoomKey, id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    pub fn is_member(&self, id: ConnectionId, room: &RoomKey) -> bool {
        self.connections
            .get(&id)
            .map(|entry| entry.rooms.contains(room))
            .unwrap_or(false)
    }

    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> Vec<RoomKey> {
        self.connections
            .get(&id)
            .map(|entry| entry.rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 把事件投递给这些房间的所有成员，每个连接最多收到一次
    ///
    /// 投递是尽力而为：连接的出站队列已满或已关闭时直接丢弃。
    /// 返回实际入队的连接数。
    pub fn deliver(
        &self,
        rooms: &[RoomKey],
        event: ServerEvent,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let mut targets = BTreeSet::new();
        for room in rooms {
            if let Some(members) = self.rooms.get(room) {
                targets.extend(members.iter().copied());
            }
        }
        if let Some(excluded) = exclude {
            targets.remove(&excluded);
        }

        let label = event.label();
        let event = Arc::new(event);
        let mut delivered = 0;

        for target in targets {
            let Some(sender) = self
                .connections
                .get(&target)
                .map(|entry| entry.sender.clone())
            else {
                continue;
            };

            match sender.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %target,
                        event = label,
                        "outbound queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %target, event = label, "connection already closed");
                }
            }
        }

        delivered
    }

    pub fn stats(&self) -> RegistryStats {
        let memberships = self.rooms.iter().map(|members| members.len()).sum();
        RegistryStats {
            connections: self.connections.len(),
            rooms: self.rooms.len(),
            memberships,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::{
        AdminEventKind, BusinessId, ChatRoomId, UserId, UserRole,
    };
    use serde_json::json;

    use super::*;

    fn user(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: UserId::generate(),
            role,
        }
    }

    fn admin_event() -> ServerEvent {
        ServerEvent::Admin {
            kind: AdminEventKind::BusinessVerified,
            payload: json!({"id": "b1"}),
        }
    }

    #[test]
    fn register_joins_personal_room_and_admin_room_for_admins() {
        let registry = RoomRegistry::new(8);
        let plain = registry.register(user(UserRole::User), Utc::now());
        let admin = registry.register(user(UserRole::Admin), Utc::now());

        assert_eq!(
            registry.rooms_of(plain.id),
            vec![RoomKey::User(plain.user.user_id)]
        );
        assert!(registry.is_member(admin.id, &RoomKey::Admin));
        assert!(registry.is_member(admin.id, &RoomKey::User(admin.user.user_id)));
        assert_eq!(registry.members(&RoomKey::Admin), vec![admin.id]);
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let registry = RoomRegistry::new(8);
        let handle = registry.register(user(UserRole::User), Utc::now());
        let room = RoomKey::Chat(ChatRoomId::generate());

        assert_eq!(registry.join(handle.id, room), Ok(true));
        assert_eq!(registry.join(handle.id, room), Ok(false));
        assert_eq!(registry.members(&room), vec![handle.id]);

        assert_eq!(registry.leave(handle.id, room), Ok(true));
        assert_eq!(registry.leave(handle.id, room), Ok(false));
        assert!(registry.members(&room).is_empty());
        assert_eq!(registry.stats().rooms, 1);
    }

    #[test]
    fn non_admin_cannot_join_admin_or_foreign_personal_room() {
        let registry = RoomRegistry::new(8);
        let handle = registry.register(user(UserRole::User), Utc::now());

        assert_eq!(
            registry.join(handle.id, RoomKey::Admin),
            Err(RegistryError::Forbidden(RoomKey::Admin))
        );
        let foreign = RoomKey::User(UserId::generate());
        assert_eq!(
            registry.join(handle.id, foreign),
            Err(RegistryError::Forbidden(foreign))
        );
        assert!(!registry.is_member(handle.id, &RoomKey::Admin));
    }

    #[test]
    fn unknown_connection_is_reported() {
        let registry = RoomRegistry::new(8);
        assert_eq!(
            registry.join(ConnectionId::generate(), RoomKey::Admin),
            Err(RegistryError::UnknownConnection)
        );
        assert!(registry.unregister(ConnectionId::generate()).is_none());
    }

    #[test]
    fn unregister_removes_every_membership() {
        let registry = RoomRegistry::new(8);
        let handle = registry.register(user(UserRole::Admin), Utc::now());
        let chat = RoomKey::Chat(ChatRoomId::generate());
        let business = RoomKey::Business(BusinessId::generate());
        registry.join(handle.id, chat).unwrap();
        registry.join(handle.id, business).unwrap();

        let mut rooms = registry.unregister(handle.id).unwrap();
        rooms.sort_by_key(|room| room.to_string());
        assert_eq!(rooms.len(), 4);

        assert_eq!(
            registry.stats(),
            RegistryStats {
                connections: 0,
                rooms: 0,
                memberships: 0
            }
        );
        assert!(registry.members(&chat).is_empty());
    }

    #[tokio::test]
    async fn deliver_reaches_each_connection_once() {
        let registry = RoomRegistry::new(8);
        let mut admin = registry.register(user(UserRole::Admin), Utc::now());
        let business = RoomKey::Business(BusinessId::generate());
        registry.join(admin.id, business).unwrap();

        let delivered = registry.deliver(&[business, RoomKey::Admin], admin_event(), None);
        assert_eq!(delivered, 1);

        let event = admin.events.recv().await.unwrap();
        assert_eq!(*event, admin_event());
        assert!(admin.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn deliver_skips_excluded_connection() {
        let registry = RoomRegistry::new(8);
        let room = RoomKey::Chat(ChatRoomId::generate());
        let mut first = registry.register(user(UserRole::User), Utc::now());
        let mut second = registry.register(user(UserRole::User), Utc::now());
        registry.join(first.id, room).unwrap();
        registry.join(second.id, room).unwrap();

        assert_eq!(registry.deliver(&[room], admin_event(), Some(first.id)), 1);
        assert!(second.events.recv().await.is_some());
        assert!(first.events.try_recv().is_err());
    }

    #[test]
    fn full_queue_drops_events_for_that_connection_only() {
        let registry = RoomRegistry::new(1);
        let slow = registry.register(user(UserRole::Admin), Utc::now());
        let mut fast = registry.register(user(UserRole::Admin), Utc::now());

        assert_eq!(registry.deliver(&[RoomKey::Admin], admin_event(), None), 2);
        assert!(fast.events.try_recv().is_ok());

        // slow 的队列仍然是满的
        assert_eq!(registry.deliver(&[RoomKey::Admin], admin_event(), None), 1);
        assert!(registry.is_member(slow.id, &RoomKey::Admin));
    }

    #[test]
    fn concurrent_join_leave_keeps_maps_consistent() {
        let registry = Arc::new(RoomRegistry::new(8));
        let room = RoomKey::Chat(ChatRoomId::generate());
        let handles: Vec<_> = (0..8)
            .map(|_| registry.register(user(UserRole::User), Utc::now()).id)
            .collect();

        let threads: Vec<_> = handles
            .iter()
            .copied()
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        registry.join(id, room).unwrap();
                        registry.deliver(&[room], admin_event(), None);
                        registry.leave(id, room).unwrap();
                    }
                    registry.join(id, room).unwrap();
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let mut members = registry.members(&room);
        members.sort();
        let mut expected = handles.clone();
        expected.sort();
        assert_eq!(members, expected);

        for id in handles {
            registry.unregister(id);
        }
        assert_eq!(registry.stats().memberships, 0);
    }
}
