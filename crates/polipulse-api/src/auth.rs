use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use polipulse_db::Database;
use polipulse_db::directory::NewProfile;
use polipulse_gateway::Dispatcher;
use polipulse_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::context::run_blocking;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub token_ttl_days: i64,
}

const MIN_PASSWORD_LEN: usize = 8;
const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 254;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let display_name = req.display_name.trim().to_string();

    // Validate input
    if email.len() > MAX_EMAIL_LEN || !email.contains('@') {
        return Err(ApiError::validation("a valid email address is required"));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ApiError::validation(format!(
            "display name must be 1-{} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }

    let user_id = Uuid::new_v4();
    let role = req.role;
    let registered_email = email.clone();
    run_blocking(&state, None, move |ctx| {
        if ctx.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::validation("email is already registered"));
        }

        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        ctx.db.create_user(
            &user_id.to_string(),
            &email,
            &password_hash,
            &NewProfile {
                display_name: &display_name,
                avatar_url: req.avatar_url.as_deref(),
                role,
            },
        )?;
        Ok(())
    })
    .await?;

    info!("Registered {} as {}", registered_email, role.as_str());
    let token = create_token(&state, user_id, &registered_email)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();

    let user = run_blocking(&state, None, move |ctx| {
        let user = ctx.db.get_user_by_email(&email)?.ok_or(ApiError::NotAuthenticated)?;

        // Verify password
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| anyhow::anyhow!("stored password hash is unreadable: {}", e))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::NotAuthenticated)?;
        Ok(user)
    })
    .await?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;
    let token = create_token(&state, user_id, &user.email)?;

    Ok(Json(LoginResponse {
        user_id,
        email: user.email,
        token,
    }))
}

fn create_token(state: &AppStateInner, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(state.token_ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )?;

    Ok(token)
}
