//! JWT 认证
//!
//! 提供 token 签发与校验，以及从请求头解析当前用户的提取器。
//! 同时接受 `Authorization: Bearer <token>` 和旧客户端使用的 `token` 请求头。

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use application::ApplicationError;
use config::JwtConfig;
use domain::{DomainError, User, UserId};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
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

    pub fn generate_token(&self, user_id: UserId) -> Result<String, ApiError> {
        let exp = chrono::TimeDelta::try_hours(self.config.expiration_hours)
            .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| ApiError::internal_server_error("Token expiration is out of range"))?;
        let claims = Claims {
            user_id: user_id.into(),
            exp: exp.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| ApiError::internal_server_error(format!("Token generation failed: {}", err)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| ApiError::unauthorized(format!("Invalid token: {}", err)))
    }

    /// 从请求头中提取并校验 token，返回其中的用户标识
    pub fn extract_user_from_headers(&self, headers: &HeaderMap) -> Result<UserId, ApiError> {
        let token = bearer_token(headers)
            .or_else(|| raw_token(headers))
            .ok_or_else(|| ApiError::unauthorized("Not authorized, token missing"))?;

        let claims = self.verify_token(token)?;
        Ok(UserId::from(claims.user_id))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn raw_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("token")
        .and_then(|header| header.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 已认证的当前用户；token 有效但用户已不存在时同样拒绝
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = state.jwt_service.extract_user_from_headers(&parts.headers)?;
        let user = state
            .user_service
            .get_user(user_id)
            .await
            .map_err(lookup_rejection)?;
        Ok(AuthUser(user))
    }
}

/// token 对应的用户已被删除时按未认证处理，其余错误照常映射
fn lookup_rejection(error: ApplicationError) -> ApiError {
    match error {
        ApplicationError::Domain(DomainError::UserNotFound) => ApiError::unauthorized("User not found"),
        other => ApiError::from(other),
    }
}

/// 注册 / 登录响应
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use domain::RepositoryError;

    fn service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "unit-test-secret-unit-test-secret-0000".into(),
            expiration_hours: 1,
        })
    }

    #[test]
    fn accepts_bearer_and_raw_token_headers() {
        let jwt = service();
        let user_id = UserId::generate();
        let token = jwt.generate_token(user_id).unwrap();

        let mut bearer = HeaderMap::new();
        bearer.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        assert_eq!(jwt.extract_user_from_headers(&bearer).unwrap(), user_id);

        let mut raw = HeaderMap::new();
        raw.insert("token", HeaderValue::from_str(&token).unwrap());
        assert_eq!(jwt.extract_user_from_headers(&raw).unwrap(), user_id);
    }

    #[test]
    fn missing_user_is_unauthorized_but_storage_failure_is_not() {
        let gone = lookup_rejection(ApplicationError::Domain(DomainError::UserNotFound));
        assert_eq!(gone.status(), StatusCode::UNAUTHORIZED);

        let broken = lookup_rejection(ApplicationError::Repository(RepositoryError::storage(
            "connection reset",
        )));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn out_of_range_expiration_is_an_error() {
        let jwt = JwtService::new(JwtConfig {
            secret: "unit-test-secret-unit-test-secret-0000".into(),
            expiration_hours: i64::MAX,
        });
        let error = jwt.generate_token(UserId::generate()).unwrap_err();
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejects_missing_and_foreign_tokens() {
        let jwt = service();
        assert!(jwt.extract_user_from_headers(&HeaderMap::new()).is_err());

        let other = JwtService::new(JwtConfig {
            secret: "another-secret-another-secret-11111".into(),
            expiration_hours: 1,
        });
        let foreign = other.generate_token(UserId::generate()).unwrap();
        assert!(jwt.verify_token(&foreign).is_err());
    }
}
