//! 内存存储
//!
//! 实现全部仓储接口，数据只在进程内存活。用于开发环境和集成测试；
//! 所有写操作在同一把锁内完成，消息插入与 `last_message_at` 更新天然是原子的。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{
    BusinessDirectory, BusinessId, ChatRoom, ChatRoomId, ChatRoomOverview, ChatRoomRepository,
    Message, MessageRepository, RepositoryError, UserDirectory, UserId, UserIdentity,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    users: HashMap<UserId, UserIdentity>,
    businesses: HashMap<BusinessId, UserId>,
    rooms: HashMap<ChatRoomId, ChatRoom>,
    /// 按写入顺序保存
    messages: Vec<Message>,
}

impl MemoryState {
    fn room_for(&self, business_id: BusinessId, user_id: UserId) -> Option<&ChatRoom> {
        self.rooms
            .values()
            .filter(|room| room.business_id == business_id && room.has_participant(user_id))
            .min_by_key(|room| room.created_at)
    }

    fn latest_message(&self, chat_room_id: ChatRoomId) -> Option<&Message> {
        // 时间相同时后写入的更新
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.chat_room_id == chat_room_id)
            .max_by_key(|(index, message)| (message.created_at, *index))
            .map(|(_, message)| message)
    }
}

#[derive(Default)]
pub struct InMemoryChatStore {
    state: RwLock<MemoryState>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入或替换一个用户身份（由外部认证服务维护的数据）
    pub async fn put_user(&self, identity: UserIdentity) {
        self.state.write().await.users.insert(identity.id, identity);
    }

    /// 写入或替换商家的所有者
    pub async fn put_business(&self, business_id: BusinessId, owner_id: UserId) {
        self.state
            .write()
            .await
            .businesses
            .insert(business_id, owner_id);
    }

    pub async fn message_count(&self) -> usize {
        self.state.read().await.messages.len()
    }
}

#[async_trait]
impl UserDirectory for InMemoryChatStore {
    async fn find_identity(&self, id: UserId) -> Result<Option<UserIdentity>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }
}

#[async_trait]
impl BusinessDirectory for InMemoryChatStore {
    async fn find_owner(&self, business_id: BusinessId) -> Result<Option<UserId>, RepositoryError> {
        Ok(self.state.read().await.businesses.get(&business_id).copied())
    }
}

#[async_trait]
impl ChatRoomRepository for InMemoryChatStore {
    async fn find_by_business_and_participant(
        &self,
        business_id: BusinessId,
        user_id: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .room_for(business_id, user_id)
            .cloned())
    }

    async fn find_for_participant(
        &self,
        id: ChatRoomId,
        user_id: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .rooms
            .get(&id)
            .filter(|room| room.has_participant(user_id))
            .cloned())
    }

    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let mut state = self.state.write().await;
        let duplicate = state.rooms.contains_key(&room.id)
            || state.rooms.values().any(|existing| {
                existing.business_id == room.business_id
                    && existing.initiator_id == room.initiator_id
            });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }

        state.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ChatRoomOverview>, RepositoryError> {
        let state = self.state.read().await;
        let mut rooms: Vec<&ChatRoom> = state
            .rooms
            .values()
            .filter(|room| room.has_participant(user_id))
            .collect();

        // 有消息的按最近消息倒序，无消息的排最后
        rooms.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(rooms
            .into_iter()
            .map(|room| ChatRoomOverview {
                room: room.clone(),
                last_message: state.latest_message(room.id).cloned(),
            })
            .collect())
    }
}

#[async_trait]
impl MessageRepository for InMemoryChatStore {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if state.messages.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Conflict);
        }
        let room = state
            .rooms
            .get_mut(&message.chat_room_id)
            .ok_or(RepositoryError::NotFound)?;

        room.record_message(message.created_at);
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn list_page(
        &self,
        chat_room_id: ChatRoomId,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let mut messages: Vec<(usize, &Message)> = state
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.chat_room_id == chat_room_id)
            .collect();
        messages.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));

        let skip = page.saturating_sub(1) as usize * limit as usize;
        Ok(messages
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .map(|(_, message)| message.clone())
            .collect())
    }

    async fn mark_read(
        &self,
        chat_room_id: ChatRoomId,
        receiver_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for message in state.messages.iter_mut().filter(|message| {
            message.chat_room_id == chat_room_id && message.receiver_id == receiver_id && !message.is_read
        }) {
            message.mark_read();
            updated += 1;
        }
        Ok(updated)
    }
}
