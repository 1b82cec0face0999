/*!
 * # Authentication and Authorization
 *
 * Bearer JWTs (HS256) identify users. [`auth_middleware`] validates the token, loads the user and
 * rejects missing or deactivated accounts, then stores an [`AuthUser`] in the request extensions.
 * [`role_middleware`] layers a role check on top (used for the admin surface).
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;

pub mod password;

pub use password::{hash_password, verify_password};

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,   // user id
    pub email: String,
    pub role: UserRole,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// The caller, as established by [`auth_middleware`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.to_string() == role
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("No token, authorization denied".into()))
    }
}

/// Registration input, validated by the handler.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: user::Model,
}

/// Issues and checks tokens and owns the account lifecycle (register, login).
#[derive(Clone)]
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: ChronoDuration,
}

impl AuthService {
    pub fn new(db: Arc<DatabaseConnection>, jwt_secret: &str, token_ttl_secs: i64) -> Self {
        Self {
            db,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_ttl: ChronoDuration::seconds(token_ttl_secs),
        }
    }

    pub fn issue_token(&self, user: &user::Model) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("token encoding failed: {e}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    /// Resolves a bearer token to a live, active account.
    pub async fn authenticate(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Token is not valid".into()))?;

        let user = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ServiceError::Unauthorized("Token is not valid".into()))?;

        Ok(AuthUser {
            user_id: user.id,
            email: user.email,
            role: user.role,
        })
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: NewUser) -> Result<AuthSession, ServiceError> {
        let email = input.email.trim().to_lowercase();
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "User already exists with this email".into(),
            ));
        }

        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(email),
            password_hash: Set(hash_password(&input.password)?),
            role: Set(UserRole::User),
            phone: Set(input.phone),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        debug!(user_id = %user.id, "user registered");
        let token = self.issue_token(&user)?;
        Ok(AuthSession { token, user })
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ServiceError> {
        let invalid = || ServiceError::Unauthorized("Invalid credentials".into());

        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(invalid)?;

        if !verify_password(password, &user.password_hash) {
            return Err(invalid());
        }

        let token = self.issue_token(&user)?;
        Ok(AuthSession { token, user })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".into()))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware. Expects an `Arc<AuthService>` request extension.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return ServiceError::InternalError("authentication service not installed".into())
                .into_response()
        }
    };

    let Some(token) = bearer_token(request.headers()) else {
        return ServiceError::Unauthorized("No token, authorization denied".into()).into_response();
    };

    match auth_service.authenticate(token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Rejects callers lacking `required_role` with 403.
pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| ServiceError::Unauthorized("No token, authorization denied".into()))?;

    if !user.has_role(&required_role) {
        return Err(ServiceError::Forbidden(
            "Access denied. Admin privileges required.".into(),
        ));
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Database;

    async fn service() -> AuthService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        AuthService::new(Arc::new(db), "unit-test-secret-with-enough-length-42", 3600)
    }

    fn user(role: UserRole) -> user::Model {
        let now = Utc::now();
        user::Model {
            id: Uuid::new_v4(),
            name: "Meera".into(),
            email: "meera@example.com".into(),
            password_hash: String::new(),
            role,
            phone: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn issued_tokens_validate() {
        let svc = service().await;
        let u = user(UserRole::Admin);
        let token = svc.issue_token(&u).unwrap();
        let claims = svc.validate_token(&token).unwrap();
        assert_eq!(claims.sub, u.id.to_string());
        assert_eq!(claims.role, UserRole::Admin);
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn tokens_from_other_secrets_are_rejected() {
        let svc = service().await;
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let other = AuthService::new(Arc::new(db), "a-completely-different-secret-value", 3600);
        let token = other.issue_token(&user(UserRole::User)).unwrap();
        assert!(matches!(
            svc.validate_token(&token),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[test]
    fn admin_role_check() {
        let admin = AuthUser {
            user_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            role: UserRole::Admin,
        };
        assert!(admin.is_admin());
        assert!(admin.has_role(ADMIN_ROLE));
        let customer = AuthUser {
            role: UserRole::User,
            ..admin
        };
        assert!(!customer.has_role(ADMIN_ROLE));
    }
}
