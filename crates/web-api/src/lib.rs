//! Web API 层。
//!
//! 提供 Axum 路由：聊天相关的 HTTP 接口、CRUD 服务层使用的事件入口，
//! 以及承载实时中继的 WebSocket 端点。

mod auth;
mod error;
mod protocol;
mod routes;
mod state;
mod ws_connection;

pub use auth::{bearer_token, AdminUser, CurrentUser};
pub use error::{ApiError, ErrorBody};
pub use protocol::{ClientFrame, InboundRequest, ServerFrame};
pub use routes::router;
pub use state::AppState;
