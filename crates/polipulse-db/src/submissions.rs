use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use polipulse_types::models::{
    AuditAction, AuditLogEntry, ContentSubmission, SubmissionDetail, SubmissionStatus, TargetType,
};

use crate::audit::{NewAuditEntry, insert_audit_entry};
use crate::models::{enum_at, now, opt_ts_at, stamp, ts_at, uuid_at};
use crate::{Database, OptionalExt};

const SUBMISSION_COLUMNS: &str = "s.id, s.campaign_id, s.influencer_id, s.platform, s.content_type, \
     s.content_url, s.caption, s.fec_disclosure, s.status, s.compliance_checked, s.review_notes, \
     s.submission_date, s.created_at, s.updated_at";

pub struct NewSubmission<'a> {
    pub platform: &'a str,
    pub content_type: &'a str,
    pub content_url: Option<&'a str>,
    pub caption: Option<&'a str>,
    pub fec_disclosure: Option<&'a str>,
}

/// Which ownership link authorizes a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reviewer {
    /// The admin of the PAC that owns the submission's campaign.
    PacAdmin,
    /// The creator who made the submission.
    Creator,
}

#[derive(Debug, Clone, Copy)]
pub enum NotesChange<'a> {
    Set(Option<&'a str>),
    Keep,
}

/// Content fields a creator may replace on resubmission. `None` keeps the
/// stored value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentEdits<'a> {
    pub content_url: Option<&'a str>,
    pub caption: Option<&'a str>,
    pub fec_disclosure: Option<&'a str>,
}

pub struct Transition<'a> {
    pub submission_id: Uuid,
    pub actor_id: Uuid,
    pub actor_email: Option<&'a str>,
    pub reviewer: Reviewer,
    pub to: SubmissionStatus,
    pub notes: NotesChange<'a>,
    pub edits: ContentEdits<'a>,
    pub action: AuditAction,
    /// Human-readable note stored in the audit entry's details.
    pub audit_note: &'a str,
}

/// The two users a submission concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parties {
    pub pac_admin: Uuid,
    pub creator: Uuid,
}

#[derive(Debug)]
pub enum TransitionOutcome {
    Applied {
        submission: ContentSubmission,
        entry: AuditLogEntry,
        parties: Parties,
    },
    NotFound,
    Forbidden,
    Invalid {
        from: SubmissionStatus,
    },
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFilter {
    pub campaign_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Empty means any status.
    pub statuses: Vec<SubmissionStatus>,
    pub limit: Option<usize>,
}

struct Ownership {
    status: SubmissionStatus,
    platform: String,
    campaign_id: Uuid,
    admin_user_id: Uuid,
    creator_user_id: Uuid,
}

impl Ownership {
    fn parties(&self) -> Parties {
        Parties {
            pac_admin: self.admin_user_id,
            creator: self.creator_user_id,
        }
    }
}

impl Database {
    pub fn create_submission(
        &self,
        campaign_id: Uuid,
        influencer_id: Uuid,
        new: &NewSubmission<'_>,
    ) -> Result<ContentSubmission> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            let at = stamp(now());
            conn.execute(
                "INSERT INTO content_submissions
                    (id, campaign_id, influencer_id, platform, content_type, content_url, caption,
                     fec_disclosure, status, compliance_checked, submission_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', 0, ?9, ?9, ?9)",
                rusqlite::params![
                    id.to_string(),
                    campaign_id.to_string(),
                    influencer_id.to_string(),
                    new.platform,
                    new.content_type,
                    new.content_url,
                    new.caption,
                    new.fec_disclosure,
                    at
                ],
            )?;
            query_submission(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("submission {} missing after insert", id))
        })
    }

    pub fn get_submission(&self, id: Uuid) -> Result<Option<ContentSubmission>> {
        self.with_conn(|conn| query_submission(conn, id))
    }

    pub fn submission_parties(&self, id: Uuid) -> Result<Option<Parties>> {
        self.with_conn(|conn| Ok(query_ownership(conn, id)?.map(|o| o.parties())))
    }

    /// Move a submission to a new status and append the matching audit
    /// entry in one transaction. Nothing is written unless the actor owns
    /// the submission and the state machine allows the move.
    pub fn transition_submission(&self, t: &Transition<'_>) -> Result<TransitionOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(owner) = query_ownership(&tx, t.submission_id)? else {
                return Ok(TransitionOutcome::NotFound);
            };

            let authorized = match t.reviewer {
                Reviewer::PacAdmin => owner.admin_user_id == t.actor_id,
                Reviewer::Creator => owner.creator_user_id == t.actor_id,
            };
            if !authorized {
                return Ok(TransitionOutcome::Forbidden);
            }
            if !owner.status.can_transition_to(t.to) {
                return Ok(TransitionOutcome::Invalid { from: owner.status });
            }

            let at = now();
            let (keep_notes, notes) = match t.notes {
                NotesChange::Set(notes) => (false, notes),
                NotesChange::Keep => (true, None),
            };
            tx.execute(
                "UPDATE content_submissions
                    SET status = ?1,
                        compliance_checked = ?2,
                        review_notes = CASE WHEN ?3 THEN review_notes ELSE ?4 END,
                        content_url = COALESCE(?5, content_url),
                        caption = COALESCE(?6, caption),
                        fec_disclosure = COALESCE(?7, fec_disclosure),
                        submission_date = CASE WHEN ?1 = 'pending' THEN ?8 ELSE submission_date END,
                        updated_at = ?8
                  WHERE id = ?9",
                rusqlite::params![
                    t.to.as_str(),
                    t.to == SubmissionStatus::Approved,
                    keep_notes,
                    notes,
                    t.edits.content_url,
                    t.edits.caption,
                    t.edits.fec_disclosure,
                    stamp(at),
                    t.submission_id.to_string()
                ],
            )?;

            let entry = insert_audit_entry(
                &tx,
                &NewAuditEntry {
                    action: &t.action,
                    actor_id: t.actor_id,
                    actor_email: t.actor_email,
                    target_type: TargetType::Submission,
                    target_id: t.submission_id,
                    details: serde_json::json!({
                        "notes": t.audit_note,
                        "platform": owner.platform,
                        "campaign_id": owner.campaign_id,
                        "from_status": owner.status,
                        "to_status": t.to,
                    }),
                },
                at,
            )?;

            let submission = query_submission(&tx, t.submission_id)?
                .ok_or_else(|| anyhow::anyhow!("submission {} vanished mid-transaction", t.submission_id))?;

            tx.commit()?;
            Ok(TransitionOutcome::Applied {
                submission,
                entry,
                parties: owner.parties(),
            })
        })
    }

    /// Submissions under campaigns owned by `admin_user_id`, joined with
    /// campaign, PAC and creator names, newest first.
    pub fn list_submission_details(
        &self,
        admin_user_id: Uuid,
        filter: &SubmissionFilter,
    ) -> Result<Vec<SubmissionDetail>> {
        let mut sql = format!(
            "SELECT {cols}, c.name, p.name, ip.display_name
             FROM content_submissions s
             JOIN campaigns c ON c.id = s.campaign_id
             JOIN pacs p ON p.id = c.pac_id
             LEFT JOIN influencers i ON i.id = s.influencer_id
             LEFT JOIN profiles ip ON ip.user_id = i.user_id
             WHERE p.admin_user_id = ?1",
            cols = SUBMISSION_COLUMNS
        );
        let mut params: Vec<String> = vec![admin_user_id.to_string()];

        if let Some(campaign_id) = filter.campaign_id {
            params.push(campaign_id.to_string());
            sql.push_str(&format!(" AND s.campaign_id = ?{}", params.len()));
        }
        if let Some(start) = filter.start {
            params.push(stamp(start));
            sql.push_str(&format!(" AND s.created_at >= ?{}", params.len()));
        }
        if let Some(end) = filter.end {
            params.push(stamp(end));
            sql.push_str(&format!(" AND s.created_at <= ?{}", params.len()));
        }
        if !filter.statuses.is_empty() {
            let placeholders: Vec<String> = filter
                .statuses
                .iter()
                .map(|status| {
                    params.push(status.as_str().to_string());
                    format!("?{}", params.len())
                })
                .collect();
            sql.push_str(&format!(" AND s.status IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY s.created_at DESC, s.rowid DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok(SubmissionDetail {
                        submission: submission_from_row(row)?,
                        campaign_name: row.get(14)?,
                        pac_name: row.get(15)?,
                        influencer_name: row.get(16)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_submission(conn: &Connection, id: Uuid) -> Result<Option<ContentSubmission>> {
    let sql = format!("SELECT {} FROM content_submissions s WHERE s.id = ?1", SUBMISSION_COLUMNS);
    conn.query_row(&sql, [id.to_string()], submission_from_row).optional()
}

fn query_ownership(conn: &Connection, id: Uuid) -> Result<Option<Ownership>> {
    conn.query_row(
        "SELECT s.status, s.platform, s.campaign_id, p.admin_user_id, i.user_id
         FROM content_submissions s
         JOIN campaigns c ON c.id = s.campaign_id
         JOIN pacs p ON p.id = c.pac_id
         JOIN influencers i ON i.id = s.influencer_id
         WHERE s.id = ?1",
        [id.to_string()],
        |row| {
            Ok(Ownership {
                status: enum_at(row, 0)?,
                platform: row.get(1)?,
                campaign_id: uuid_at(row, 2)?,
                admin_user_id: uuid_at(row, 3)?,
                creator_user_id: uuid_at(row, 4)?,
            })
        },
    )
    .optional()
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<ContentSubmission> {
    Ok(ContentSubmission {
        id: uuid_at(row, 0)?,
        campaign_id: uuid_at(row, 1)?,
        influencer_id: uuid_at(row, 2)?,
        platform: row.get(3)?,
        content_type: row.get(4)?,
        content_url: row.get(5)?,
        caption: row.get(6)?,
        fec_disclosure: row.get(7)?,
        status: enum_at(row, 8)?,
        compliance_checked: row.get(9)?,
        review_notes: row.get(10)?,
        submission_date: opt_ts_at(row, 11)?,
        created_at: ts_at(row, 12)?,
        updated_at: ts_at(row, 13)?,
    })
}
