use std::sync::Arc;

use config::{AppConfig, JwtConfig, StoreBackend};
use domain::{BusinessDirectory, ChatRoomRepository, MessageRepository, UserDirectory};
use thiserror::Error;

use crate::{
    auth::JwtService,
    memory::InMemoryChatStore,
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 按配置装配好的适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub users: Arc<dyn UserDirectory>,
    pub businesses: Arc<dyn BusinessDirectory>,
    pub rooms: Arc<dyn ChatRoomRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub jwt: Arc<JwtService>,
    /// 仅内存后端时存在，便于直接写入种子数据
    pub memory: Option<Arc<InMemoryChatStore>>,
}

impl Infrastructure {
    /// 根据 `store.backend` 连接数据库（并执行迁移）或创建内存存储
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        match config.store.backend {
            StoreBackend::Postgres => {
                let pool =
                    create_pg_pool(&config.database.url, config.database.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!("database migrations applied");
                Ok(Self::postgres(PgStorage::new(pool), config.jwt.clone()))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory store, data is lost on restart");
                Ok(Self::in_memory(config.jwt.clone()))
            }
        }
    }

    pub fn postgres(storage: PgStorage, jwt: JwtConfig) -> Self {
        Self {
            users: storage.user_directory,
            businesses: storage.business_directory,
            rooms: storage.room_repository,
            messages: storage.message_repository,
            jwt: Arc::new(JwtService::new(jwt)),
            memory: None,
        }
    }

    pub fn in_memory(jwt: JwtConfig) -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        Self {
            users: store.clone(),
            businesses: store.clone(),
            rooms: store.clone(),
            messages: store.clone(),
            jwt: Arc::new(JwtService::new(jwt)),
            memory: Some(store),
        }
    }
}
