//! 连接会话
//!
//! `RelayHub` 汇总中继需要的所有协作者，`connect` 认证成功后返回一个
//! `Session`。会话把客户端命令分发给对应的服务，并在断开（或被丢弃）时
//! 清理房间成员关系和输入状态。

use std::sync::Arc;

use domain::{ChatRoomId, ConnectionId, Message, RoomKey, UserId};

use crate::auth::{AuthenticatedUser, ConnectionAuthenticator};
use crate::broadcaster::EventBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::presence::TypingBroadcaster;
use crate::registry::{EventReceiver, RegistryError, RoomRegistry};
use crate::services::{ChatService, SendMessageRequest};

/// 会话的生命周期：`Joined -> Disconnected`
///
/// 认证在会话创建之前完成，认证失败的连接不会产生会话。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Joined,
    Disconnected,
}

/// 客户端在连接上发出的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    JoinRoom {
        room: RoomKey,
    },
    LeaveRoom {
        room: RoomKey,
    },
    SendMessage {
        chat_room_id: ChatRoomId,
        receiver_id: UserId,
        content: String,
    },
    SetTyping {
        chat_room_id: ChatRoomId,
        is_typing: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// `newly` 为 false 表示之前已经在房间里
    Joined { room: RoomKey, newly: bool },
    Left { room: RoomKey, was_member: bool },
    MessageSent(Message),
    TypingRelayed { delivered: usize },
}

#[derive(Clone)]
pub struct RelayHub {
    authenticator: ConnectionAuthenticator,
    registry: Arc<RoomRegistry>,
    chat: Arc<ChatService>,
    typing: Arc<TypingBroadcaster>,
    events: EventBroadcaster,
    clock: Arc<dyn Clock>,
}

impl RelayHub {
    pub fn new(
        authenticator: ConnectionAuthenticator,
        registry: Arc<RoomRegistry>,
        chat: Arc<ChatService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let typing = Arc::new(TypingBroadcaster::new(Arc::clone(&registry)));
        let events = EventBroadcaster::new(Arc::clone(&registry));
        Self {
            authenticator,
            registry,
            chat,
            typing,
            events,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub fn chat(&self) -> &Arc<ChatService> {
        &self.chat
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub fn authenticator(&self) -> &ConnectionAuthenticator {
        &self.authenticator
    }

    /// 认证并注册一个新连接；失败时不会留下任何成员关系
    pub async fn connect(&self, token: Option<&str>) -> Result<Session, ApplicationError> {
        let user = self.authenticator.authenticate(token).await?;
        Ok(self.open_session(user))
    }

    /// 为已经认证过的身份注册连接
    pub fn open_session(&self, user: AuthenticatedUser) -> Session {
        // 注册即完成个人房间（以及管理员房间）的自动加入
        let handle = self.registry.register(user, self.clock.now());
        let session = Session {
            hub: self.clone(),
            id: handle.id,
            user,
            phase: ConnectionPhase::Joined,
            events: Some(handle.events),
        };

        tracing::info!(
            connection_id = %session.id,
            user_id = %user.user_id,
            role = %user.role,
            "client connected"
        );
        session
    }
}

pub struct Session {
    hub: RelayHub,
    id: ConnectionId,
    user: AuthenticatedUser,
    phase: ConnectionPhase,
    events: Option<EventReceiver>,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user(&self) -> &AuthenticatedUser {
        &self.user
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// 取出推送事件的接收端，只能取一次
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events.take()
    }

    pub fn rooms(&self) -> Vec<RoomKey> {
        self.hub.registry.rooms_of(self.id)
    }

    /// 处理一条客户端命令；失败不会影响连接本身
    pub async fn dispatch(&mut self, command: ClientCommand) -> Result<CommandOutcome, ApplicationError> {
        if self.phase == ConnectionPhase::Disconnected {
            return Err(ApplicationError::ConnectionClosed);
        }

        match command {
            ClientCommand::JoinRoom { room } => self.join(room).await,
            ClientCommand::LeaveRoom { room } => self.leave(room),
            ClientCommand::SendMessage {
                chat_room_id,
                receiver_id,
                content,
            } => {
                let message = self
                    .hub
                    .chat
                    .send_message(SendMessageRequest {
                        chat_room_id,
                        sender_id: self.user.user_id,
                        receiver_id,
                        content,
                    })
                    .await?;
                Ok(CommandOutcome::MessageSent(message))
            }
            ClientCommand::SetTyping {
                chat_room_id,
                is_typing,
            } => {
                let delivered =
                    self.hub
                        .typing
                        .set_typing(self.id, self.user.user_id, chat_room_id, is_typing);
                Ok(CommandOutcome::TypingRelayed { delivered })
            }
        }
    }

    async fn join(&mut self, room: RoomKey) -> Result<CommandOutcome, ApplicationError> {
        if let Err(err) = self.hub.chat.authorize_join(&self.user, room).await {
            tracing::debug!(
                connection_id = %self.id,
                room = %room,
                error = %err,
                "join rejected"
            );
            return Err(err);
        }

        let newly = self.hub.registry.join(self.id, room).map_err(registry_error)?;
        if newly {
            tracing::debug!(connection_id = %self.id, room = %room, "joined room");
        }
        Ok(CommandOutcome::Joined { room, newly })
    }

    fn leave(&mut self, room: RoomKey) -> Result<CommandOutcome, ApplicationError> {
        if let RoomKey::Chat(chat_room_id) = room {
            self.hub
                .typing
                .clear_room(self.id, self.user.user_id, chat_room_id);
        }
        let was_member = self.hub.registry.leave(self.id, room).map_err(registry_error)?;
        Ok(CommandOutcome::Left { room, was_member })
    }

    /// 从所有房间移除连接，并通知仍显示「正在输入」的会话；重复调用无副作用
    pub fn disconnect(&mut self) {
        if self.phase == ConnectionPhase::Disconnected {
            return;
        }
        self.phase = ConnectionPhase::Disconnected;

        let rooms = self.hub.registry.unregister(self.id).unwrap_or_default();
        self.hub.typing.clear_connection(self.id, self.user.user_id);

        tracing::info!(
            connection_id = %self.id,
            user_id = %self.user.user_id,
            rooms = rooms.len(),
            "client disconnected"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn registry_error(err: RegistryError) -> ApplicationError {
    match err {
        RegistryError::UnknownConnection => ApplicationError::ConnectionClosed,
        RegistryError::Forbidden(room) => {
            ApplicationError::authorization(format!("room {room} is not accessible"))
        }
    }
}
