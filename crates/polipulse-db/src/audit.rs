use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use polipulse_types::models::{AuditAction, AuditLogEntry, TargetType};

use crate::{Database, OptionalExt};
use crate::models::{conversion_error, enum_at, stamp, ts_at, uuid_at};

pub struct NewAuditEntry<'a> {
    pub action: &'a AuditAction,
    pub actor_id: Uuid,
    pub actor_email: Option<&'a str>,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub details: serde_json::Value,
}

impl Database {
    /// Newest-first audit entries for submissions under campaigns owned by
    /// `admin_user_id`.
    pub fn list_audit_entries(&self, admin_user_id: Uuid, limit: usize) -> Result<Vec<AuditLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.action, a.actor_id, a.actor_email, pr.display_name,
                        a.target_type, a.target_id, a.details, a.created_at
                 FROM audit_log a
                 JOIN content_submissions s ON s.id = a.target_id
                 JOIN campaigns c ON c.id = s.campaign_id
                 JOIN pacs p ON p.id = c.pac_id
                 LEFT JOIN profiles pr ON pr.user_id = a.actor_id
                 WHERE a.target_type = 'submission' AND p.admin_user_id = ?1
                 ORDER BY a.created_at DESC, a.rowid DESC
                 LIMIT ?2",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![admin_user_id.to_string(), limit as i64], |row| {
                    let raw_details: String = row.get(7)?;
                    let details =
                        serde_json::from_str(&raw_details).map_err(|e| conversion_error(7, e))?;
                    Ok(AuditLogEntry {
                        id: uuid_at(row, 0)?,
                        action: AuditAction::from(row.get::<_, String>(1)?),
                        actor_id: uuid_at(row, 2)?,
                        actor_email: row.get(3)?,
                        actor_name: row.get(4)?,
                        target_type: enum_at::<TargetType>(row, 5)?,
                        target_id: uuid_at(row, 6)?,
                        details,
                        created_at: ts_at(row, 8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

/// Append an entry on an existing connection so callers can include it in
/// their own transaction.
pub(crate) fn insert_audit_entry(
    conn: &Connection,
    entry: &NewAuditEntry<'_>,
    at: DateTime<Utc>,
) -> Result<AuditLogEntry> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO audit_log (id, action, actor_id, actor_email, target_type, target_id, details, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            id.to_string(),
            entry.action.as_str(),
            entry.actor_id.to_string(),
            entry.actor_email,
            entry.target_type.as_str(),
            entry.target_id.to_string(),
            entry.details.to_string(),
            stamp(at)
        ],
    )?;

    let actor_name = conn
        .query_row(
            "SELECT display_name FROM profiles WHERE user_id = ?1",
            [entry.actor_id.to_string()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();

    Ok(AuditLogEntry {
        id,
        action: entry.action.clone(),
        actor_id: entry.actor_id,
        actor_email: entry.actor_email.map(str::to_string),
        actor_name,
        target_type: entry.target_type,
        target_id: entry.target_id,
        details: entry.details.clone(),
        created_at: at,
    })
}
