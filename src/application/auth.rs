//! Account registration, login, and bearer-token verification.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

use crate::application::repos::{NewUser, RepoError, UsersRepo};
use crate::domain::entities::{UserProfile, UserRecord};

const MIN_PASSWORD_CHARS: usize = 6;

/// Authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("email is already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("token rejected: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token could not be issued: {0}")]
    Issue(#[source] jsonwebtoken::errors::Error),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Claims {
    user_id: i64,
    email: String,
    iat: i64,
    exp: i64,
}

/// Issues and verifies HS256 session tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user: &UserRecord) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Issue)
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id: data.claims.user_id,
            email: data.claims.email,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    tokens: Arc<TokenIssuer>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, tokens: Arc<TokenIssuer>) -> Self {
        Self { users, tokens }
    }

    pub async fn register(&self, input: RegisterInput) -> Result<AuthSession, AuthError> {
        let name = input.name.trim().to_string();
        let email = input.email.trim().to_string();

        if name.is_empty() {
            return Err(AuthError::InvalidInput("name is required".to_string()));
        }
        if !is_plausible_email(&email) {
            return Err(AuthError::InvalidInput(
                "email must be a valid address".to_string(),
            ));
        }
        if input.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_CHARS} characters"
            )));
        }

        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(input.password).await?;
        let user = match self
            .users
            .insert_user(NewUser {
                name,
                email,
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(RepoError::Duplicate { .. }) => return Err(AuthError::EmailTaken),
            Err(err) => return Err(err.into()),
        };

        info!(
            target = "smartfile::application::auth",
            user_id = user.id,
            "User registered"
        );

        self.session(&user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let Some(user) = self.users.find_user_by_email(email.trim()).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password.to_string(), user.password_hash.clone()).await {
            warn!(
                target = "smartfile::application::auth",
                user_id = user.id,
                "Rejected login with wrong password"
            );
            return Err(AuthError::InvalidCredentials);
        }

        self.session(&user)
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        self.tokens.verify(token)
    }

    fn session(&self, user: &UserRecord) -> Result<AuthSession, AuthError> {
        Ok(AuthSession {
            user: UserProfile::from(user),
            token: self.tokens.issue(user)?,
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hashing(err.to_string()))
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

async fn verify_password(password: String, stored: String) -> bool {
    let outcome = tokio::task::spawn_blocking(move || {
        PasswordHash::new(&stored)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await;
    outcome.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> UserRecord {
        let now = OffsetDateTime::now_utc();
        UserRecord {
            id,
            name: "Ada".to_string(),
            email: format!("ada{id}@example.com"),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn issued_tokens_verify() {
        let issuer = TokenIssuer::new("secret", Duration::hours(24));
        let token = issuer.issue(&user(42)).unwrap();

        let caller = issuer.verify(&token).unwrap();
        assert_eq!(caller.user_id, 42);
        assert_eq!(caller.email, "ada42@example.com");
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let issuer = TokenIssuer::new("secret", Duration::hours(24));
        let other = TokenIssuer::new("different", Duration::hours(24));
        let token = other.issue(&user(1)).unwrap();

        assert!(matches!(
            issuer.verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(issuer.verify("not-a-jwt").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issuer = TokenIssuer::new("secret", Duration::hours(-2));
        let token = issuer.issue(&user(1)).unwrap();
        assert!(matches!(
            issuer.verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn password_hashes_verify_only_the_original() {
        let hash = hash_password("hunter22".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22".to_string(), hash.clone()).await);
        assert!(!verify_password("hunter23".to_string(), hash).await);
        assert!(!verify_password("x".to_string(), "garbage".to_string()).await);
    }

    #[tokio::test]
    async fn each_hash_gets_a_fresh_salt() {
        let first = hash_password("hunter22".to_string()).await.unwrap();
        let second = hash_password("hunter22".to_string()).await.unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn email_shape() {
        assert!(is_plausible_email("a@b.io"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.io"));
        assert!(!is_plausible_email("a b@c.io"));
        assert!(!is_plausible_email("a@@c.io"));
    }
}
