//! 持久化协作者的接口。
//!
//! 用户与商家由外部服务维护，这里只暴露聊天核心需要的只读查询。

use async_trait::async_trait;

use crate::chat_room::{ChatRoom, ChatRoomOverview};
use crate::errors::RepositoryError;
use crate::message::Message;
use crate::user::UserIdentity;
use crate::value_objects::{BusinessId, ChatRoomId, UserId};

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_identity(&self, id: UserId) -> Result<Option<UserIdentity>, RepositoryError>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    /// 返回商家所有者；商家不存在时为 `None`
    async fn find_owner(&self, business_id: BusinessId) -> Result<Option<UserId>, RepositoryError>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    /// 查找某用户与某商家之间已存在的会话
    async fn find_by_business_and_participant(
        &self,
        business_id: BusinessId,
        user_id: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 仅当 `user_id` 是参与者时返回会话
    async fn find_for_participant(
        &self,
        id: ChatRoomId,
        user_id: UserId,
    ) -> Result<Option<ChatRoom>, RepositoryError>;

    /// 创建会话；同一 (business, initiator) 已存在时返回 `RepositoryError::Conflict`
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError>;

    /// 用户参与的所有会话，按 `last_message_at` 倒序（无消息的排在最后）
    async fn list_for_user(&self, user_id: UserId)
        -> Result<Vec<ChatRoomOverview>, RepositoryError>;
}

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存消息并在同一事务中把所属会话的 `last_message_at` 推进到 `created_at`
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    /// 最新的在前；`page` 从 1 开始
    async fn list_page(
        &self,
        chat_room_id: ChatRoomId,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// 将接收者为 `receiver_id` 的未读消息标记为已读，返回更新条数
    async fn mark_read(
        &self,
        chat_room_id: ChatRoomId,
        receiver_id: UserId,
    ) -> Result<u64, RepositoryError>;
}
