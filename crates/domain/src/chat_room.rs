use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::message::Message;
use crate::value_objects::{BusinessId, ChatRoomId, Timestamp, UserId};

/// 用户与商家之间的持久会话。
///
/// 参与者集合在创建后不可变；`last_message_at` 只会前进。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: ChatRoomId,
    pub business_id: BusinessId,
    /// 发起会话的用户；(business_id, initiator_id) 唯一
    pub initiator_id: UserId,
    #[serde(rename = "participantUserIds")]
    pub participants: BTreeSet<UserId>,
    pub created_at: Timestamp,
    pub last_message_at: Option<Timestamp>,
}

impl ChatRoom {
    /// 用户首次联系商家时创建会话，参与者为发起人和商家所有者。
    pub fn open(
        id: ChatRoomId,
        business_id: BusinessId,
        initiator_id: UserId,
        owner_id: UserId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if initiator_id == owner_id {
            return Err(DomainError::invalid_argument(
                "business_id",
                "cannot start a chat with your own business",
            ));
        }

        Ok(Self {
            id,
            business_id,
            initiator_id,
            participants: BTreeSet::from([initiator_id, owner_id]),
            created_at: now,
            last_message_at: None,
        })
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    /// 新消息的时间戳：不早于当前的 `last_message_at`。
    pub fn next_message_time(&self, now: Timestamp) -> Timestamp {
        match self.last_message_at {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    pub fn record_message(&mut self, at: Timestamp) {
        if self.last_message_at.map_or(true, |last| at >= last) {
            self.last_message_at = Some(at);
        }
    }
}

/// 会话列表中的一项：会话本身及其最近一条消息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoomOverview {
    #[serde(flatten)]
    pub room: ChatRoom,
    pub last_message: Option<Message>,
}
