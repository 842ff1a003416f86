use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use polipulse_gateway::connection::verify_token;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate JWT from Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::NotAuthenticated)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::NotAuthenticated)?;

    let claims = verify_token(&state.jwt_secret, token).ok_or(ApiError::NotAuthenticated)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
