use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use polipulse_db::Database;
use polipulse_types::api::{
    Claims, MarkConversationReadResponse, ResolveConversationRequest, ResolveConversationResponse,
};
use polipulse_types::events::RealtimeEvent;
use polipulse_types::models::{Conversation, ConversationView, MessageView, Role};

use crate::auth::AppState;
use crate::context::{RequestContext, Session, run_blocking};
use crate::error::ApiError;

pub struct ThreadRead {
    pub conversation: Conversation,
    pub read_at: DateTime<Utc>,
    pub message_ids: Vec<Uuid>,
}

/// Every conversation the caller takes part in, most recently active first.
pub fn list_conversations(ctx: &RequestContext<'_>) -> Result<Vec<ConversationView>, ApiError> {
    let user = ctx.require_user()?;
    Ok(ctx.db.list_conversations(user.user_id)?)
}

/// Find or create the one conversation between the caller and
/// `counterpart_id` in a campaign.
pub fn resolve_conversation(
    ctx: &RequestContext<'_>,
    campaign_id: Uuid,
    counterpart_id: Uuid,
) -> Result<Conversation, ApiError> {
    let user = ctx.require_user()?;
    if counterpart_id == user.user_id {
        return Err(ApiError::validation("cannot start a conversation with yourself"));
    }

    match conversation_sides(ctx, campaign_id, user.user_id, counterpart_id)? {
        Sides::Existing(existing) => Ok(existing),
        Sides::New(pac_side, creator_side) => Ok(ctx.db.upsert_conversation(campaign_id, pac_side, creator_side)?),
    }
}

pub(crate) enum Sides {
    Existing(Conversation),
    /// (organization side, creator side) for a conversation not yet stored.
    New(Uuid, Uuid),
}

pub(crate) fn conversation_sides(
    ctx: &RequestContext<'_>,
    campaign_id: Uuid,
    current: Uuid,
    counterpart: Uuid,
) -> Result<Sides, ApiError> {
    if ctx.db.get_campaign(campaign_id)?.is_none() {
        return Err(ApiError::NotFound("campaign"));
    }
    if let Some(existing) = ctx.db.find_conversation(campaign_id, current, counterpart)? {
        return Ok(Sides::Existing(existing));
    }
    let (pac_side, creator_side) = assign_sides(ctx.db, current, counterpart)?;
    Ok(Sides::New(pac_side, creator_side))
}

/// (organization side, creator side). An influencer caller talking to a
/// non-influencer goes on the creator side; otherwise the caller is the
/// organization side.
fn assign_sides(db: &Database, current: Uuid, counterpart: Uuid) -> Result<(Uuid, Uuid), ApiError> {
    let counterpart_role = db.get_role(counterpart)?.ok_or(ApiError::NotFound("user"))?;
    let current_role = db.get_role(current)?;

    if current_role == Some(Role::Influencer) && counterpart_role != Role::Influencer {
        Ok((counterpart, current))
    } else {
        Ok((current, counterpart))
    }
}

pub(crate) fn participant_conversation(
    ctx: &RequestContext<'_>,
    conversation_id: Uuid,
) -> Result<(Session, Conversation), ApiError> {
    let user = ctx.require_user()?.clone();
    let conversation = ctx
        .db
        .get_conversation(conversation_id)?
        .ok_or(ApiError::NotFound("conversation"))?;
    if !conversation.involves(user.user_id) {
        return Err(ApiError::Forbidden("not a participant in this conversation"));
    }
    Ok((user, conversation))
}

/// The conversation's messages, oldest first.
pub fn fetch_messages(ctx: &RequestContext<'_>, conversation_id: Uuid) -> Result<Vec<MessageView>, ApiError> {
    let (_, conversation) = participant_conversation(ctx, conversation_id)?;
    Ok(ctx.db.list_thread(&conversation)?)
}

pub fn mark_conversation_read(ctx: &RequestContext<'_>, conversation_id: Uuid) -> Result<ThreadRead, ApiError> {
    let (user, conversation) = participant_conversation(ctx, conversation_id)?;
    let (read_at, message_ids) = ctx.db.mark_thread_read(&conversation, user.user_id)?;
    Ok(ThreadRead {
        conversation,
        read_at,
        message_ids,
    })
}

// -- Handlers --

pub async fn list_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = run_blocking(&state, Some(claims.into()), list_conversations).await?;
    Ok(Json(conversations))
}

pub async fn resolve_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResolveConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let conversation = run_blocking(&state, Some(claims.into()), move |ctx| {
        resolve_conversation(ctx, req.campaign_id, req.counterpart_id)
    })
    .await?;

    Ok((
        StatusCode::OK,
        Json(ResolveConversationResponse {
            conversation_id: conversation.id,
        }),
    ))
}

pub async fn messages_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = run_blocking(&state, Some(claims.into()), move |ctx| {
        fetch_messages(ctx, conversation_id)
    })
    .await?;
    Ok(Json(messages))
}

pub async fn read_all_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let reader_id = claims.sub;
    let read = run_blocking(&state, Some(claims.into()), move |ctx| {
        mark_conversation_read(ctx, conversation_id)
    })
    .await?;

    let participants = [read.conversation.pac_user_id, read.conversation.influencer_user_id];
    for message_id in &read.message_ids {
        state
            .dispatcher
            .send_to_users(
                &participants,
                RealtimeEvent::MessageRead {
                    conversation_id,
                    message_id: *message_id,
                    reader_id,
                    read_at: read.read_at,
                },
            )
            .await;
    }

    Ok(Json(MarkConversationReadResponse {
        marked: read.message_ids.len() as u32,
    }))
}
