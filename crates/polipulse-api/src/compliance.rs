//! Compliance review: submissions, the status state machine, and the
//! admin-side derivations (stats, queue, report).

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use uuid::Uuid;

use polipulse_db::submissions::{
    ContentEdits, NewSubmission, NotesChange, Parties, Reviewer, SubmissionFilter, Transition,
    TransitionOutcome,
};
use polipulse_types::api::{
    ApproveRequest, Claims, CreateSubmissionRequest, ReportQuery, ResubmitRequest, RevisionRequest,
};
use polipulse_types::compliance::{PENDING_QUEUE_LIMIT, pending_queue as build_queue};
use polipulse_types::events::RealtimeEvent;
use polipulse_types::models::{
    AuditAction, AuditLogEntry, ComplianceItem, ComplianceStats, ContentSubmission, SubmissionDetail,
    SubmissionStatus,
};

use crate::auth::AppState;
use crate::context::{RequestContext, run_blocking};
use crate::error::ApiError;

pub const DEFAULT_APPROVAL_NOTE: &str = "Submission approved for compliance";

/// A status change together with the audit entry written alongside it.
#[derive(Debug)]
pub struct Reviewed {
    pub submission: ContentSubmission,
    pub entry: AuditLogEntry,
    pub parties: Parties,
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn apply(ctx: &RequestContext<'_>, transition: &Transition<'_>) -> Result<Reviewed, ApiError> {
    match ctx.db.transition_submission(transition)? {
        TransitionOutcome::Applied {
            submission,
            entry,
            parties,
        } => {
            info!(
                "Submission {} moved to {} by {}",
                submission.id, submission.status, transition.actor_id
            );
            Ok(Reviewed {
                submission,
                entry,
                parties,
            })
        }
        TransitionOutcome::NotFound => Err(ApiError::NotFound("submission")),
        TransitionOutcome::Forbidden => Err(ApiError::Forbidden(match transition.reviewer {
            Reviewer::PacAdmin => "only the campaign's PAC admin can review this submission",
            Reviewer::Creator => "only the submitting creator can resubmit",
        })),
        TransitionOutcome::Invalid { from } => Err(ApiError::InvalidTransition {
            from,
            to: transition.to,
        }),
    }
}

pub fn approve_submission(
    ctx: &RequestContext<'_>,
    submission_id: Uuid,
    notes: Option<&str>,
) -> Result<Reviewed, ApiError> {
    let user = ctx.require_user()?;
    let notes = trimmed(notes);

    apply(
        ctx,
        &Transition {
            submission_id,
            actor_id: user.user_id,
            actor_email: Some(user.email.as_str()),
            reviewer: Reviewer::PacAdmin,
            to: SubmissionStatus::Approved,
            // Earlier revision notes stay when the reviewer adds none.
            notes: notes.map_or(NotesChange::Keep, |n| NotesChange::Set(Some(n))),
            edits: ContentEdits::default(),
            action: AuditAction::SubmissionApproved,
            audit_note: notes.unwrap_or(DEFAULT_APPROVAL_NOTE),
        },
    )
}

pub fn request_revision(ctx: &RequestContext<'_>, submission_id: Uuid, notes: &str) -> Result<Reviewed, ApiError> {
    let user = ctx.require_user()?;
    let Some(notes) = trimmed(Some(notes)) else {
        return Err(ApiError::validation("revision notes are required"));
    };

    apply(
        ctx,
        &Transition {
            submission_id,
            actor_id: user.user_id,
            actor_email: Some(user.email.as_str()),
            reviewer: Reviewer::PacAdmin,
            to: SubmissionStatus::RevisionRequested,
            notes: NotesChange::Set(Some(notes)),
            edits: ContentEdits::default(),
            action: AuditAction::RevisionRequested,
            audit_note: notes,
        },
    )
}

pub fn create_submission(
    ctx: &RequestContext<'_>,
    campaign_id: Uuid,
    req: &CreateSubmissionRequest,
) -> Result<ContentSubmission, ApiError> {
    let user = ctx.require_user()?;
    let platform = req.platform.trim();
    let content_type = req.content_type.trim();
    if platform.is_empty() || content_type.is_empty() {
        return Err(ApiError::validation("platform and content type are required"));
    }

    if ctx.db.get_campaign(campaign_id)?.is_none() {
        return Err(ApiError::NotFound("campaign"));
    }
    let influencer = ctx
        .db
        .get_influencer_by_user(user.user_id)?
        .ok_or(ApiError::Forbidden("only registered creators can submit content"))?;

    let submission = ctx.db.create_submission(
        campaign_id,
        influencer.id,
        &NewSubmission {
            platform,
            content_type,
            content_url: trimmed(req.content_url.as_deref()),
            caption: trimmed(req.caption.as_deref()),
            fec_disclosure: trimmed(req.fec_disclosure.as_deref()),
        },
    )?;
    info!("Submission {} created for campaign {}", submission.id, campaign_id);
    Ok(submission)
}

/// Creator answers a revision request: optional content edits, back to pending.
pub fn resubmit_submission(
    ctx: &RequestContext<'_>,
    submission_id: Uuid,
    req: &ResubmitRequest,
) -> Result<Reviewed, ApiError> {
    let user = ctx.require_user()?;

    apply(
        ctx,
        &Transition {
            submission_id,
            actor_id: user.user_id,
            actor_email: Some(user.email.as_str()),
            reviewer: Reviewer::Creator,
            to: SubmissionStatus::Pending,
            notes: NotesChange::Keep,
            edits: ContentEdits {
                content_url: trimmed(req.content_url.as_deref()),
                caption: trimmed(req.caption.as_deref()),
                fec_disclosure: trimmed(req.fec_disclosure.as_deref()),
            },
            action: AuditAction::SubmissionPending,
            audit_note: "Submission resubmitted for review",
        },
    )
}

pub fn compliance_stats(ctx: &RequestContext<'_>) -> Result<ComplianceStats, ApiError> {
    let user = ctx.require_user()?;
    let details = ctx.db.list_submission_details(user.user_id, &SubmissionFilter::default())?;
    Ok(ComplianceStats::from_submissions(details.iter().map(|d| &d.submission)))
}

pub fn pending_queue(ctx: &RequestContext<'_>) -> Result<Vec<ComplianceItem>, ApiError> {
    let user = ctx.require_user()?;
    let details = ctx.db.list_submission_details(
        user.user_id,
        &SubmissionFilter {
            statuses: vec![SubmissionStatus::Pending, SubmissionStatus::RevisionRequested],
            limit: Some(PENDING_QUEUE_LIMIT),
            ..Default::default()
        },
    )?;
    Ok(build_queue(&details))
}

/// Every submission under the caller's campaigns, newest first, optionally
/// narrowed to one campaign and an inclusive date range.
pub fn generate_report(ctx: &RequestContext<'_>, query: &ReportQuery) -> Result<Vec<SubmissionDetail>, ApiError> {
    let user = ctx.require_user()?;
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err(ApiError::validation("report start must not be after its end"));
        }
    }

    Ok(ctx.db.list_submission_details(
        user.user_id,
        &SubmissionFilter {
            campaign_id: query.campaign_id,
            start: query.start,
            end: query.end,
            ..Default::default()
        },
    )?)
}

// -- Handlers --

/// Bodies that may be omitted entirely; an empty body means all defaults.
fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation(format!("invalid request body: {}", e)))
}

async fn notify_parties(state: &AppState, submission: &ContentSubmission, parties: Parties) {
    state
        .dispatcher
        .send_to_users(
            &[parties.pac_admin, parties.creator],
            RealtimeEvent::SubmissionUpdated {
                submission_id: submission.id,
                campaign_id: submission.campaign_id,
                status: submission.status,
            },
        )
        .await;
}

pub async fn approve_handler(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: ApproveRequest = optional_json(&body)?;
    let reviewed = run_blocking(&state, Some(claims.into()), move |ctx| {
        approve_submission(ctx, submission_id, req.notes.as_deref())
    })
    .await?;

    notify_parties(&state, &reviewed.submission, reviewed.parties).await;
    Ok(Json(reviewed.submission))
}

pub async fn revision_handler(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RevisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reviewed = run_blocking(&state, Some(claims.into()), move |ctx| {
        request_revision(ctx, submission_id, &req.notes)
    })
    .await?;

    notify_parties(&state, &reviewed.submission, reviewed.parties).await;
    Ok(Json(reviewed.submission))
}

pub async fn create_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSubmissionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (submission, parties) = run_blocking(&state, Some(claims.into()), move |ctx| {
        let submission = create_submission(ctx, campaign_id, &req)?;
        let parties = match ctx.db.submission_parties(submission.id) {
            Ok(parties) => parties,
            Err(e) => {
                warn!("Could not load parties of submission {}: {:#}", submission.id, e);
                None
            }
        };
        Ok((submission, parties))
    })
    .await?;

    if let Some(parties) = parties {
        notify_parties(&state, &submission, parties).await;
    }
    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn resubmit_handler(
    State(state): State<AppState>,
    Path(submission_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: ResubmitRequest = optional_json(&body)?;
    let reviewed = run_blocking(&state, Some(claims.into()), move |ctx| {
        resubmit_submission(ctx, submission_id, &req)
    })
    .await?;

    notify_parties(&state, &reviewed.submission, reviewed.parties).await;
    Ok(Json(reviewed.submission))
}

pub async fn stats_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(run_blocking(&state, Some(claims.into()), compliance_stats).await?))
}

pub async fn queue_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(run_blocking(&state, Some(claims.into()), pending_queue).await?))
}

pub async fn report_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let report = run_blocking(&state, Some(claims.into()), move |ctx| generate_report(ctx, &query)).await?;
    Ok(Json(report))
}
