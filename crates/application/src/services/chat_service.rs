use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domain::{
    BusinessDirectory, BusinessId, ChatRoom, ChatRoomId, ChatRoomOverview, ChatRoomRepository,
    DomainError, Message, MessageContent, MessageId, MessageRepository, RepositoryError, RoomKey,
    UserId,
};

use crate::{
    auth::AuthenticatedUser, clock::Clock, error::ApplicationError, outbound::ServerEvent,
    registry::RoomRegistry, sequencer::RoomSequencer,
};

/// 历史消息默认每页条数
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    /// 单次存储操作的超时
    pub storage_timeout: Duration,
    pub history_page_max: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(5),
            history_page_max: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub chat_room_id: ChatRoomId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryRequest {
    pub chat_room_id: ChatRoomId,
    pub user_id: UserId,
    pub page: u32,
    pub limit: u32,
}

pub struct ChatServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub business_directory: Arc<dyn BusinessDirectory>,
    pub registry: Arc<RoomRegistry>,
    pub clock: Arc<dyn Clock>,
    pub settings: ChatSettings,
}

/// 会话与消息的用例：发起会话、收发消息、历史与已读
pub struct ChatService {
    deps: ChatServiceDependencies,
    sequencer: RoomSequencer,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            deps,
            sequencer: RoomSequencer::new(),
        }
    }

    /// 给存储操作加上超时，超时视为持久化失败
    ///
    /// 超时只是不再等待，已经发出的操作不会被回滚。写操作在提交之后才超时的话，
    /// 数据已经落库，而调用方收到的是 `Timeout`。
    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, RepositoryError>>,
    ) -> Result<T, ApplicationError> {
        let timeout = self.deps.settings.storage_timeout;
        match tokio::time::timeout(timeout, operation).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RepositoryError::Timeout {
                millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into()),
        }
    }

    async fn participant_room(
        &self,
        chat_room_id: ChatRoomId,
        user_id: UserId,
    ) -> Result<ChatRoom, ApplicationError> {
        self.bounded(
            self.deps
                .room_repository
                .find_for_participant(chat_room_id, user_id),
        )
        .await?
        .ok_or_else(|| DomainError::ChatRoomNotFound.into())
    }

    /// 用户联系商家：已有会话则复用，否则创建
    pub async fn initiate_chat(
        &self,
        business_id: BusinessId,
        user_id: UserId,
    ) -> Result<ChatRoom, ApplicationError> {
        let owner_id = self
            .bounded(self.deps.business_directory.find_owner(business_id))
            .await?
            .ok_or(DomainError::BusinessNotFound)?;

        let room = ChatRoom::open(
            ChatRoomId::generate(),
            business_id,
            user_id,
            owner_id,
            self.deps.clock.now(),
        )?;

        if let Some(existing) = self
            .bounded(
                self.deps
                    .room_repository
                    .find_by_business_and_participant(business_id, user_id),
            )
            .await?
        {
            return Ok(existing);
        }

        match self.bounded(self.deps.room_repository.create(room)).await {
            Ok(created) => {
                tracing::info!(
                    chat_room_id = %created.id,
                    business_id = %business_id,
                    user_id = %user_id,
                    "chat room created"
                );
                Ok(created)
            }
            // 并发的另一次发起已经建好了会话
            Err(ApplicationError::Persistence(RepositoryError::Conflict)) => self
                .bounded(
                    self.deps
                        .room_repository
                        .find_by_business_and_participant(business_id, user_id),
                )
                .await?
                .ok_or(ApplicationError::Persistence(RepositoryError::Conflict)),
            Err(err) => Err(err),
        }
    }

    pub async fn list_rooms(&self, user_id: UserId) -> Result<Vec<ChatRoomOverview>, ApplicationError> {
        self.bounded(self.deps.room_repository.list_for_user(user_id))
            .await
    }

    /// 分页读取历史消息，最新的在前
    pub async fn list_messages(&self, request: HistoryRequest) -> Result<Vec<Message>, ApplicationError> {
        if request.page == 0 {
            return Err(DomainError::invalid_argument("page", "must be at least 1").into());
        }
        let max = self.deps.settings.history_page_max;
        if request.limit == 0 || request.limit > max {
            return Err(DomainError::invalid_argument(
                "limit",
                format!("must be between 1 and {max}"),
            )
            .into());
        }

        self.participant_room(request.chat_room_id, request.user_id)
            .await?;
        self.bounded(self.deps.message_repository.list_page(
            request.chat_room_id,
            request.page,
            request.limit,
        ))
        .await
    }

    /// 持久化并广播一条消息
    ///
    /// 广播目标是 `chat:{id}` 与 `user:{receiver}` 两个房间；持久化失败时不广播。
    pub async fn send_message(&self, request: SendMessageRequest) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(request.content)?;

        // 非参与者在拿锁之前就被拒绝，不会阻塞房间里的正常发送
        self.participant_room(request.chat_room_id, request.sender_id).await?;

        let _sequence = self.sequencer.acquire(request.chat_room_id).await;

        // 锁内重新读取，`last_message_at` 必须是最新的
        let room = self
            .participant_room(request.chat_room_id, request.sender_id)
            .await?;
        let created_at = room.next_message_time(self.deps.clock.now());
        let message = Message::compose(
            MessageId::generate(),
            &room,
            request.sender_id,
            request.receiver_id,
            content,
            created_at,
        )?;

        // 超时若发生在提交之后，消息已保存但不会广播，客户端通过历史记录补齐
        let stored = self
            .bounded(self.deps.message_repository.insert(message))
            .await
            .inspect_err(|err| {
                tracing::error!(
                    chat_room_id = %request.chat_room_id,
                    sender_id = %request.sender_id,
                    error = %err,
                    "failed to persist message"
                );
            })?;

        let delivered = self.deps.registry.deliver(
            &[
                RoomKey::Chat(stored.chat_room_id),
                RoomKey::User(stored.receiver_id),
            ],
            ServerEvent::MessageCreated(stored.clone()),
            None,
        );
        tracing::debug!(
            chat_room_id = %stored.chat_room_id,
            message_id = %stored.id,
            delivered,
            "message relayed"
        );

        Ok(stored)
    }

    /// 把发给 `user_id` 的未读消息标记为已读
    pub async fn mark_read(
        &self,
        chat_room_id: ChatRoomId,
        user_id: UserId,
    ) -> Result<u64, ApplicationError> {
        self.participant_room(chat_room_id, user_id).await?;
        self.bounded(self.deps.message_repository.mark_read(chat_room_id, user_id))
            .await
    }

    /// 判断连接能否加入某个房间
    ///
    /// 会话房间只对参与者开放（否则按不存在处理）；商家房间只对所有者和管理员开放。
    pub async fn authorize_join(
        &self,
        user: &AuthenticatedUser,
        room: RoomKey,
    ) -> Result<(), ApplicationError> {
        match room {
            RoomKey::Chat(chat_room_id) => {
                self.participant_room(chat_room_id, user.user_id).await?;
                Ok(())
            }
            RoomKey::Business(business_id) => {
                let owner = self
                    .bounded(self.deps.business_directory.find_owner(business_id))
                    .await?
                    .ok_or(DomainError::BusinessNotFound)?;
                if owner == user.user_id || user.is_admin() {
                    Ok(())
                } else {
                    Err(ApplicationError::authorization(
                        "only the business owner may join this room",
                    ))
                }
            }
            RoomKey::Admin if !user.is_admin() => {
                Err(ApplicationError::authorization("admin room requires an admin role"))
            }
            RoomKey::User(owner) if owner != user.user_id => {
                Err(ApplicationError::authorization("cannot join another user's room"))
            }
            RoomKey::Admin | RoomKey::User(_) => Ok(()),
        }
    }
}
