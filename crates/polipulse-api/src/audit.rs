use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Serialize;

use polipulse_types::api::Claims;
use polipulse_types::compliance::{AUDIT_LOG_LIMIT, AuditDisplay};
use polipulse_types::models::AuditLogEntry;

use crate::auth::AppState;
use crate::context::{RequestContext, run_blocking};
use crate::error::ApiError;

/// An audit entry with its label, icon and tone for the trail view.
#[derive(Debug, Serialize)]
pub struct AuditLogView {
    #[serde(flatten)]
    pub entry: AuditLogEntry,
    pub display: AuditDisplay,
}

/// The newest audit entries for submissions under the caller's campaigns.
pub fn audit_log(ctx: &RequestContext<'_>) -> Result<Vec<AuditLogEntry>, ApiError> {
    let user = ctx.require_user()?;
    Ok(ctx.db.list_audit_entries(user.user_id, AUDIT_LOG_LIMIT)?)
}

pub async fn audit_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = run_blocking(&state, Some(claims.into()), audit_log).await?;
    let views: Vec<AuditLogView> = entries
        .into_iter()
        .map(|entry| AuditLogView {
            display: entry.action.display(),
            entry,
        })
        .collect();
    Ok(Json(views))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{approve_submission, request_revision};
    use crate::testing::Harness;
    use polipulse_types::compliance::{AuditIcon, AuditTone};
    use polipulse_types::models::{AuditAction, Role};

    #[test]
    fn trail_is_newest_first_and_scoped_to_the_admin() {
        let h = Harness::new();
        let first = h.submission();
        let second = h.submission();
        request_revision(&h.ctx(h.admin), first.id, "Missing #ad").unwrap();
        approve_submission(&h.ctx(h.admin), second.id, None).unwrap();

        let log = audit_log(&h.ctx(h.admin)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].action, AuditAction::SubmissionApproved);
        assert_eq!(log[1].action, AuditAction::RevisionRequested);
        assert_eq!(log[0].actor_name.as_deref(), Some("Civic Admin"));

        let display = log[1].action.display();
        assert_eq!(display.label, "Revision Requested");
        assert_eq!(display.icon, AuditIcon::AlertCircle);
        assert_eq!(display.tone, AuditTone::Yellow);

        let stranger = h.user("other@pac.org", "Other Admin", Role::Pac);
        assert!(audit_log(&h.ctx(stranger)).unwrap().is_empty());
    }

    #[test]
    fn trail_is_capped() {
        let h = Harness::new();
        let sub = h.submission();
        for round in 0..(AUDIT_LOG_LIMIT + 5) {
            request_revision(&h.ctx(h.admin), sub.id, &format!("round {}", round)).unwrap();
        }
        let log = audit_log(&h.ctx(h.admin)).unwrap();
        assert_eq!(log.len(), AUDIT_LOG_LIMIT);
        assert_eq!(log[0].details["notes"], format!("round {}", AUDIT_LOG_LIMIT + 4));
    }
}
