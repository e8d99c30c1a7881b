use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, ChatSettings, Clock, ConnectionAuthenticator, RelayHub,
    RoomRegistry, SystemClock,
};
use config::AppConfig;
use infrastructure::Infrastructure;

#[derive(Clone)]
pub struct AppState {
    pub hub: RelayHub,
    /// WebSocket 握手阶段（认证）的超时
    pub connect_timeout: Duration,
}

impl AppState {
    pub fn new(hub: RelayHub, connect_timeout: Duration) -> Self {
        Self {
            hub,
            connect_timeout,
        }
    }

    /// 用装配好的适配器和配置组装整个中继
    pub fn assemble(infra: &Infrastructure, config: &AppConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let registry = Arc::new(RoomRegistry::new(config.relay.outbound_buffer));

        let chat = Arc::new(ChatService::new(ChatServiceDependencies {
            room_repository: infra.rooms.clone(),
            message_repository: infra.messages.clone(),
            business_directory: infra.businesses.clone(),
            registry: registry.clone(),
            clock: clock.clone(),
            settings: ChatSettings {
                storage_timeout: config.storage_timeout(),
                history_page_max: config.relay.history_page_max,
            },
        }));

        let authenticator = ConnectionAuthenticator::new(
            infra.jwt.clone(),
            infra.users.clone(),
            config.storage_timeout(),
        );

        Self::new(
            RelayHub::new(authenticator, registry, chat, clock),
            config.connect_timeout(),
        )
    }
}
