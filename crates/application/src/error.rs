use domain::{DomainError, RepositoryError};
use thiserror::Error;

/// 连接握手阶段的认证失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("authentication required")]
    MissingCredential,
    #[error("invalid or expired credential")]
    InvalidCredential,
    #[error("user not found or inactive")]
    UnknownOrInactiveUser,
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthFailure),
    /// 受角色限制的操作被拒绝，不影响连接本身
    #[error("authorization failed: {0}")]
    Authorization(String),
    /// 资源不存在或调用者无权访问，刻意不区分
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    Validation(DomainError),
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    /// 连接已经断开，无法继续处理请求
    #[error("connection closed")]
    ConnectionClosed,
}

impl ApplicationError {
    pub fn authorization(reason: impl Into<String>) -> Self {
        ApplicationError::Authorization(reason.into())
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::ChatRoomNotFound => ApplicationError::NotFound("chat room"),
            DomainError::BusinessNotFound => ApplicationError::NotFound("business"),
            invalid @ DomainError::InvalidArgument { .. } => ApplicationError::Validation(invalid),
        }
    }
}
