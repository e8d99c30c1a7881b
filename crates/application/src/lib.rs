//! 应用层实现。
//!
//! 围绕领域模型的用例：连接认证、房间成员注册表、消息中继、
//! 输入状态与业务事件广播，以及把它们串起来的连接会话。

pub mod auth;
pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod outbound;
pub mod presence;
pub mod registry;
pub mod sequencer;
pub mod services;
pub mod session;

pub use auth::{
    AuthenticatedUser, ConnectionAuthenticator, CredentialError, CredentialVerifier,
    VerifiedCredential,
};
pub use broadcaster::EventBroadcaster;
pub use clock::{Clock, SystemClock};
pub use error::{ApplicationError, AuthFailure};
pub use outbound::ServerEvent;
pub use presence::TypingBroadcaster;
pub use registry::{
    ConnectionHandle, EventReceiver, RegistryError, RegistryStats, RoomRegistry,
};
pub use sequencer::RoomSequencer;
pub use services::{
    ChatService, ChatServiceDependencies, ChatSettings, HistoryRequest, SendMessageRequest,
    DEFAULT_PAGE_LIMIT,
};
pub use session::{ClientCommand, CommandOutcome, ConnectionPhase, RelayHub, Session};
