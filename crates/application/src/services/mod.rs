mod chat_service;

pub use chat_service::{
    ChatService, ChatServiceDependencies, ChatSettings, HistoryRequest, SendMessageRequest,
    DEFAULT_PAGE_LIMIT,
};
