use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use polipulse_db::messages::{MarkRead, NewMessage};
use polipulse_types::api::{Claims, ReadReceipt, SendMessageRequest};
use polipulse_types::events::RealtimeEvent;
use polipulse_types::models::{Conversation, Message, MessageView};

use crate::auth::AppState;
use crate::context::{RequestContext, run_blocking};
use crate::conversations::{Sides, conversation_sides};
use crate::error::ApiError;

pub const MAX_SUBJECT_LEN: usize = 200;
pub const MAX_CONTENT_LEN: usize = 10_000;

pub struct SentMessage {
    pub conversation: Conversation,
    pub message: MessageView,
}

pub struct ReadOutcome {
    pub receipt: ReadReceipt,
    /// False when an earlier call had already set the timestamp.
    pub newly_read: bool,
    pub message: Message,
    pub conversation_id: Option<Uuid>,
}

fn validate_send(sender_id: Uuid, req: &SendMessageRequest) -> Result<(), ApiError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("message content cannot be empty"));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(ApiError::validation(format!(
            "message content is limited to {} characters",
            MAX_CONTENT_LEN
        )));
    }
    if req.recipient_id == sender_id {
        return Err(ApiError::validation("cannot send a message to yourself"));
    }
    if let Some(subject) = &req.subject {
        if subject.trim().chars().count() > MAX_SUBJECT_LEN {
            return Err(ApiError::validation(format!(
                "subject is limited to {} characters",
                MAX_SUBJECT_LEN
            )));
        }
    }
    Ok(())
}

/// Validate, resolve the conversation, then store the message. Nothing
/// touches the store until validation passes.
pub fn send_message(ctx: &RequestContext<'_>, req: &SendMessageRequest) -> Result<SentMessage, ApiError> {
    let sender_id = ctx.require_user()?.user_id;
    validate_send(sender_id, req)?;

    let (pac_side, creator_side) = match conversation_sides(ctx, req.campaign_id, sender_id, req.recipient_id)? {
        Sides::Existing(c) => (c.pac_user_id, c.influencer_user_id),
        Sides::New(pac_side, creator_side) => (pac_side, creator_side),
    };
    let subject = req.subject.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (conversation, message) = ctx.db.send_message(
        pac_side,
        creator_side,
        &NewMessage {
            campaign_id: req.campaign_id,
            sender_id,
            recipient_id: req.recipient_id,
            subject,
            content: req.content.trim(),
        },
    )?;

    debug!("{} sent message {} in conversation {}", sender_id, message.message.id, conversation.id);
    Ok(SentMessage { conversation, message })
}

/// Set the read timestamp on a message addressed to the caller. The first
/// call wins; later calls report the stored timestamp.
pub fn mark_read(ctx: &RequestContext<'_>, message_id: Uuid) -> Result<ReadOutcome, ApiError> {
    let reader_id = ctx.require_user()?.user_id;

    let (read_at, newly_read) = match ctx.db.mark_read(message_id, reader_id)? {
        MarkRead::Marked(at) => (at, true),
        MarkRead::AlreadyRead(at) => (at, false),
        MarkRead::NotRecipient => {
            return Err(ApiError::Forbidden("only the recipient can mark a message read"));
        }
        MarkRead::NotFound => return Err(ApiError::NotFound("message")),
    };

    let message = ctx.db.get_message(message_id)?.ok_or(ApiError::NotFound("message"))?;
    let conversation_id = ctx
        .db
        .find_conversation(message.campaign_id, message.sender_id, message.recipient_id)?
        .map(|c| c.id);

    Ok(ReadOutcome {
        receipt: ReadReceipt { message_id, read_at },
        newly_read,
        message,
        conversation_id,
    })
}

// -- Handlers --

pub async fn send_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sent = run_blocking(&state, Some(claims.into()), move |ctx| send_message(ctx, &req)).await?;

    // Only the two participants hear about it
    let participants = [sent.conversation.pac_user_id, sent.conversation.influencer_user_id];
    state
        .dispatcher
        .send_to_users(
            &participants,
            RealtimeEvent::MessageCreate {
                conversation_id: sent.conversation.id,
                message: sent.message.clone(),
            },
        )
        .await;

    Ok((StatusCode::CREATED, Json(sent.message)))
}

pub async fn read_handler(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = run_blocking(&state, Some(claims.into()), move |ctx| mark_read(ctx, message_id)).await?;

    if outcome.newly_read {
        if let Some(conversation_id) = outcome.conversation_id {
            state
                .dispatcher
                .send_to_users(
                    &[outcome.message.sender_id, outcome.message.recipient_id],
                    RealtimeEvent::MessageRead {
                        conversation_id,
                        message_id,
                        reader_id: outcome.message.recipient_id,
                        read_at: outcome.receipt.read_at,
                    },
                )
                .await;
        }
    }

    Ok(Json(outcome.receipt))
}
