use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, error, info, warn};

use atlas_db::Database;
use atlas_gateway::Dispatcher;
use atlas_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};
use atlas_types::models::{Identity, PublicUser, Role};

use crate::error::{ApiError, AuthError};

const MAX_USERNAME_CHARS: usize = 32;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub argon2: Argon2<'static>,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: impl Into<String>) -> Self {
        Self {
            db,
            jwt_secret: jwt_secret.into(),
            token_ttl: chrono::Duration::hours(24),
            argon2: Argon2::default(),
            dispatcher: Dispatcher::new(),
        }
    }

    pub fn with_token_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Hashing cost for new passwords. Existing hashes carry their own
    /// parameters, so changing this never locks anyone out.
    pub fn with_argon2(mut self, argon2: Argon2<'static>) -> Self {
        self.argon2 = argon2;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn into_state(self) -> AppState {
        Arc::new(self)
    }

    pub fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    pub fn issue_token(&self, user: &PublicUser) -> Result<String, ApiError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp() as usize,
            exp: (now + self.token_ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Checks signature and expiry only. The role is taken from the token as
    /// issued; the credential store is not consulted, so a role change is
    /// only seen after the next login.
    pub fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!("Token rejected: {}", e);
            AuthError::InvalidToken
        })?;

        Ok(token_data.claims.into())
    }
}

/// Runs blocking work (database calls, password hashing) off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let username = req.username.trim().to_string();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApiError::Validation(format!(
            "Username must be 1 to {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    if req.password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }

    let (user, token) = blocking(&state, move |s| {
        let password_hash = s.hash_password(&req.password)?;
        let user = s.db.create_user(&username, &password_hash, Role::Researcher)?.public();
        let token = s.issue_token(&user)?;
        Ok((user, token))
    })
    .await?;

    info!("Registered {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let response = blocking(&state, move |s| {
        let user = s
            .db
            .get_user_by_username(req.username.trim())?
            .ok_or(ApiError::UnknownUser)?;

        let parsed_hash = PasswordHash::new(&user.password_hash)?;
        if s
            .argon2
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            warn!("Wrong password for {}", user.username);
            return Err(ApiError::InvalidCredentials);
        }

        // Always signed with the role as stored right now
        let user = user.public();
        let token = s.issue_token(&user)?;
        Ok(AuthResponse { token, user })
    })
    .await?;

    info!("{} ({}) logged in as {}", response.user.username, response.user.id, response.user.role);

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::{Algorithm, Params, Version};

    fn state() -> AppStateInner {
        let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, Params::MIN_P_COST, None)
            .unwrap();
        AppStateInner::new(Database::open_in_memory().unwrap(), "test-secret")
            .with_argon2(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn alice() -> PublicUser {
        PublicUser {
            id: 7,
            username: "alice".into(),
            role: Role::Researcher,
        }
    }

    #[test]
    fn token_round_trips_identity() {
        let s = state();
        let token = s.issue_token(&alice()).unwrap();
        let identity = s.verify_token(&token).unwrap();
        assert_eq!(identity.id, 7);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role, Role::Researcher);
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = state().issue_token(&alice()).unwrap();
        let other = AppStateInner::new(Database::open_in_memory().unwrap(), "other-secret");
        assert_eq!(other.verify_token(&token), Err(AuthError::InvalidToken));
        assert_eq!(other.verify_token("not.a.jwt"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn expired_token_is_invalid() {
        let s = state().with_token_ttl(chrono::Duration::hours(-2));
        let token = s.issue_token(&alice()).unwrap();
        assert_eq!(s.verify_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn password_hash_is_salted_and_verifiable() {
        let s = state();
        let a = s.hash_password("pw1").unwrap();
        let b = s.hash_password("pw1").unwrap();
        assert_ne!(a, b);
        assert!(!a.contains("pw1"));

        let parsed = PasswordHash::new(&a).unwrap();
        assert!(Argon2::default().verify_password(b"pw1", &parsed).is_ok());
        assert!(Argon2::default().verify_password(b"pw2", &parsed).is_err());
    }
}
