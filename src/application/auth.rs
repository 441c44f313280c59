//! Account registration, login and bearer tokens.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::error::ServiceError;
use crate::application::repos::{CreateUserParams, UsersRepo};
use crate::domain::entities::UserProfile;
use crate::domain::validation::{normalize_optional, normalize_username, validate_password};

/// Authenticated caller extracted from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token could not be issued: {0}")]
    Issue(#[source] jsonwebtoken::errors::Error),
    #[error("token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Invalid(_) => ServiceError::Unauthorized("invalid token"),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Hash(err.to_string()))
}

/// Unparseable hashes verify as false.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// HS256 token issuer and verifier.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            id: principal.id,
            username: principal.username.clone(),
            is_admin: principal.is_admin,
            iat: now,
            exp: now.saturating_add(self.ttl.as_secs() as i64),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Issue)
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(AuthError::Invalid)?;
        Ok(Principal {
            id: data.claims.id,
            username: data.claims.username,
            is_admin: data.claims.is_admin,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct AuthService {
    pub(crate) users: Arc<dyn UsersRepo>,
    pub(crate) tokens: TokenService,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        description: Option<String>,
    ) -> Result<UserProfile, ServiceError> {
        let username = normalize_username(username)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create_user(CreateUserParams {
                username,
                password_hash,
                description: normalize_optional(description),
                is_admin: false,
            })
            .await
            .map_err(ServiceError::conflict_on_duplicate("username already taken"))?;

        info!(target = "storytell::auth", user_id = %user.id, "user registered");
        Ok(UserProfile::from(&user))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResult, ServiceError> {
        let user = self
            .users
            .find_user_by_username(username.trim())
            .await?
            .ok_or(ServiceError::Unauthorized("invalid credentials"))?;
        if !verify_password(password, &user.password_hash) {
            return Err(ServiceError::Unauthorized("invalid credentials"));
        }

        let token = self.tokens.issue(&Principal {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        })?;
        Ok(LoginResult {
            token,
            user: UserProfile::from(&user),
        })
    }
}
