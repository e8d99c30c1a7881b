//! 连接认证
//!
//! 握手时校验令牌，再向用户目录确认账户存在且处于激活状态。
//! 任何失败都在加入房间之前拒绝连接，不会留下部分认证的状态。

use std::sync::Arc;
use std::time::Duration;

use domain::{UserDirectory, UserId, UserRole};
use thiserror::Error;

use crate::error::AuthFailure;

/// 令牌中携带的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedCredential {
    pub user_id: UserId,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential signature or expiry check failed: {0}")]
    Invalid(String),
}

/// 令牌校验（签名与过期时间），由认证协作者提供
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<VerifiedCredential, CredentialError>;
}

/// 认证通过后附着在连接上的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub role: UserRole,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[derive(Clone)]
pub struct ConnectionAuthenticator {
    verifier: Arc<dyn CredentialVerifier>,
    users: Arc<dyn UserDirectory>,
    lookup_timeout: Duration,
}

impl ConnectionAuthenticator {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        users: Arc<dyn UserDirectory>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            users,
            lookup_timeout,
        }
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<AuthenticatedUser, AuthFailure> {
        let token = token
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthFailure::MissingCredential)?;

        let credential = self.verifier.verify(token).map_err(|err| {
            tracing::debug!(error = %err, "rejected credential");
            AuthFailure::InvalidCredential
        })?;

        let lookup = tokio::time::timeout(
            self.lookup_timeout,
            self.users.find_identity(credential.user_id),
        )
        .await;

        let identity = match lookup {
            Ok(Ok(Some(identity))) => identity,
            Ok(Ok(None)) => {
                tracing::debug!(user_id = %credential.user_id, "credential for unknown user");
                return Err(AuthFailure::UnknownOrInactiveUser);
            }
            Ok(Err(err)) => {
                tracing::warn!(user_id = %credential.user_id, error = %err, "user lookup failed");
                return Err(AuthFailure::UnknownOrInactiveUser);
            }
            Err(_) => {
                tracing::warn!(user_id = %credential.user_id, "user lookup timed out");
                return Err(AuthFailure::UnknownOrInactiveUser);
            }
        };

        if !identity.is_active {
            tracing::debug!(user_id = %identity.id, "inactive account rejected");
            return Err(AuthFailure::UnknownOrInactiveUser);
        }

        Ok(AuthenticatedUser {
            user_id: identity.id,
            role: identity.role,
        })
    }
}
