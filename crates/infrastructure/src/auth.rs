//! JWT 令牌校验
//!
//! 令牌由外部认证服务签发，这里只负责验证签名与过期时间并取出用户 ID。
//! 角色以用户目录中的记录为准，令牌里的角色仅作参考。

use application::{CredentialError, CredentialVerifier, VerifiedCredential};
use config::JwtConfig;
use domain::{UserId, UserRole};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64, // 过期时间 (Unix timestamp)
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_ref());
        let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// 生成 JWT token，供开发工具和测试使用
    pub fn generate_token(&self, user_id: UserId, role: UserRole) -> Result<String, CredentialError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(self.config.expiration_hours);
        let claims = Claims {
            id: Uuid::from(user_id),
            role: Some(role.as_str().to_string()),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| CredentialError::Invalid(format!("token generation failed: {err}")))
    }

    /// 验证并解析 JWT token
    pub fn verify_token(&self, token: &str) -> Result<Claims, CredentialError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| CredentialError::Invalid(err.to_string()))
    }
}

impl CredentialVerifier for JwtService {
    fn verify(&self, token: &str) -> Result<VerifiedCredential, CredentialError> {
        let claims = self.verify_token(token)?;
        Ok(VerifiedCredential {
            user_id: UserId::from(claims.id),
        })
    }
}
