//! 请求认证
//!
//! HTTP 接口与 WebSocket 握手使用同一个 [`ConnectionAuthenticator`](application::ConnectionAuthenticator)：
//! 令牌来自 `Authorization: Bearer` 头（WebSocket 还可以用 `?token=` 查询参数）。

use application::AuthenticatedUser;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::{error::ApiError, state::AppState};

/// 从请求头中取出 Bearer 令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 已认证的调用者
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers);
        let user = state.hub.authenticator().authenticate(token).await?;
        Ok(CurrentUser(user))
    }
}

/// 角色为 admin / super_admin 的调用者
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::debug!(user_id = %user.user_id, "admin endpoint refused");
            return Err(ApiError::forbidden("admin role required"));
        }
        Ok(AdminUser(user))
    }
}
