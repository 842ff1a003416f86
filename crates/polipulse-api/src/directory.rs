//! PACs, campaigns and creator records: the ownership chain the review
//! and messaging operations check against.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use polipulse_types::api::{Claims, CreateCampaignRequest, CreatePacRequest};
use polipulse_types::models::{Campaign, Influencer, Pac, Role};

use crate::auth::AppState;
use crate::context::{RequestContext, run_blocking};
use crate::error::ApiError;

const MAX_NAME_LEN: usize = 120;

fn validate_name(name: &str, what: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ApiError::validation(format!("{} must be 1-{} characters", what, MAX_NAME_LEN)));
    }
    Ok(())
}

pub fn create_pac(ctx: &RequestContext<'_>, req: &CreatePacRequest) -> Result<Pac, ApiError> {
    let user = ctx.require_user()?;
    let name = req.name.trim();
    validate_name(name, "PAC name")?;

    if ctx.db.get_role(user.user_id)? != Some(Role::Pac) {
        return Err(ApiError::Forbidden("only PAC accounts can create a PAC"));
    }
    let fec_id = req.fec_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let pac = ctx.db.create_pac(name, fec_id, user.user_id)?;
    info!("PAC {} created by {}", pac.id, user.email);
    Ok(pac)
}

pub fn create_campaign(
    ctx: &RequestContext<'_>,
    pac_id: Uuid,
    req: &CreateCampaignRequest,
) -> Result<Campaign, ApiError> {
    let user = ctx.require_user()?;
    let name = req.name.trim();
    validate_name(name, "campaign name")?;

    let pac = ctx.db.get_pac(pac_id)?.ok_or(ApiError::NotFound("PAC"))?;
    if pac.admin_user_id != user.user_id {
        return Err(ApiError::Forbidden("only the PAC admin can create campaigns"));
    }
    Ok(ctx.db.create_campaign(pac.id, name)?)
}

/// Idempotent: returns the caller's existing creator record if present.
pub fn register_influencer(ctx: &RequestContext<'_>) -> Result<Influencer, ApiError> {
    let user = ctx.require_user()?;
    if ctx.db.get_role(user.user_id)? != Some(Role::Influencer) {
        return Err(ApiError::Forbidden("only influencer accounts can register as creators"));
    }
    Ok(ctx.db.ensure_influencer(user.user_id)?)
}

// -- Handlers --

pub async fn create_pac_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePacRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pac = run_blocking(&state, Some(claims.into()), move |ctx| create_pac(ctx, &req)).await?;
    Ok((StatusCode::CREATED, Json(pac)))
}

pub async fn create_campaign_handler(
    State(state): State<AppState>,
    Path(pac_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = run_blocking(&state, Some(claims.into()), move |ctx| {
        create_campaign(ctx, pac_id, &req)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn register_influencer_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let influencer = run_blocking(&state, Some(claims.into()), register_influencer).await?;
    Ok(Json(influencer))
}
