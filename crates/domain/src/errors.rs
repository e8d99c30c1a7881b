//! 领域模型错误定义
//!
//! 领域层只区分两类错误：违反业务规则的输入（`DomainError`），
//! 以及持久化协作者的失败（`RepositoryError`）。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 参数不满足业务约束
    #[error("invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    /// 聊天室不存在，或调用者不是参与者（两者刻意不区分）
    #[error("chat room not found")]
    ChatRoomNotFound,

    /// 商家不存在
    #[error("business not found")]
    BusinessNotFound,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("storage failure: {message}")]
    Storage { message: String },
    #[error("storage timed out after {millis}ms")]
    Timeout { millis: u64 },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储结果类型
pub type RepositoryResult<T> = Result<T, RepositoryError>;
