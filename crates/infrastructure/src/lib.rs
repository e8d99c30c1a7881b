//! 基础设施层实现。
//!
//! 提供 JWT 令牌校验、PostgreSQL 与内存两种持久化存储，实现应用/领域层定义的接口。

pub mod auth;
pub mod builder;
pub mod memory;
pub mod migrations;
pub mod repository;

pub use auth::{Claims, JwtService};
pub use builder::{Infrastructure, InfrastructureError};
pub use memory::InMemoryChatStore;
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgBusinessDirectory, PgChatRoomRepository, PgMessageRepository, PgStorage,
    PgUserDirectory,
};
