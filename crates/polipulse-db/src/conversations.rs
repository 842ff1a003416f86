use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use polipulse_types::models::{Conversation, ConversationView, ProfileSummary};

use crate::models::{now, opt_ts_at, stamp, ts_at, uuid_at};
use crate::{Database, OptionalExt};

const CONVERSATION_COLUMNS: &str =
    "c.id, c.campaign_id, c.pac_user_id, c.influencer_user_id, c.last_message_at, c.created_at, c.updated_at";

/// The pair in the order stored in `participant_low` / `participant_high`.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (String, String) {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b { (a, b) } else { (b, a) }
}

impl Database {
    /// Look up the conversation for a campaign and participant pair, in either order.
    pub fn find_conversation(&self, campaign_id: Uuid, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_by_pair(conn, campaign_id, a, b))
    }

    /// Insert the conversation unless one already exists for the pair, then
    /// return whichever row won.
    pub fn upsert_conversation(
        &self,
        campaign_id: Uuid,
        pac_user_id: Uuid,
        influencer_user_id: Uuid,
    ) -> Result<Conversation> {
        self.with_conn(|conn| upsert_in(conn, campaign_id, pac_user_id, influencer_user_id))
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM conversations c WHERE c.id = ?1", CONVERSATION_COLUMNS);
            conn.query_row(&sql, [id.to_string()], |row| conversation_from_row(row, 0))
                .optional()
        })
    }

    /// Every conversation the user takes part in, enriched for display and
    /// ordered by latest activity. One query regardless of result size.
    pub fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationView>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {cols},
                        cp.name,
                        pp.display_name, pp.avatar_url,
                        ip.display_name, ip.avatar_url,
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.campaign_id = c.campaign_id
                            AND m.recipient_id = ?1
                            AND m.sender_id = CASE WHEN c.pac_user_id = ?1
                                                   THEN c.influencer_user_id
                                                   ELSE c.pac_user_id END
                            AND m.read_at IS NULL)
                 FROM conversations c
                 LEFT JOIN campaigns cp ON cp.id = c.campaign_id
                 LEFT JOIN profiles pp ON pp.user_id = c.pac_user_id
                 LEFT JOIN profiles ip ON ip.user_id = c.influencer_user_id
                 WHERE c.pac_user_id = ?1 OR c.influencer_user_id = ?1
                 ORDER BY c.last_message_at IS NULL, c.last_message_at DESC, c.created_at DESC",
                cols = CONVERSATION_COLUMNS
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(ConversationView {
                        conversation: conversation_from_row(row, 0)?,
                        campaign_name: row.get(7)?,
                        pac_profile: ProfileSummary {
                            display_name: row.get(8)?,
                            avatar_url: row.get(9)?,
                        },
                        influencer_profile: ProfileSummary {
                            display_name: row.get(10)?,
                            avatar_url: row.get(11)?,
                        },
                        unread_count: row.get(12)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

pub(crate) fn upsert_in(
    conn: &Connection,
    campaign_id: Uuid,
    pac_user_id: Uuid,
    influencer_user_id: Uuid,
) -> Result<Conversation> {
    let (low, high) = canonical_pair(pac_user_id, influencer_user_id);
    conn.execute(
        "INSERT INTO conversations
            (id, campaign_id, pac_user_id, influencer_user_id, participant_low, participant_high, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(campaign_id, participant_low, participant_high) DO NOTHING",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            campaign_id.to_string(),
            pac_user_id.to_string(),
            influencer_user_id.to_string(),
            low,
            high,
            stamp(now())
        ],
    )?;

    query_by_pair(conn, campaign_id, pac_user_id, influencer_user_id)?
        .ok_or_else(|| anyhow::anyhow!("conversation missing after upsert in campaign {}", campaign_id))
}

pub(crate) fn query_by_pair(conn: &Connection, campaign_id: Uuid, a: Uuid, b: Uuid) -> Result<Option<Conversation>> {
    let (low, high) = canonical_pair(a, b);
    let sql = format!(
        "SELECT {} FROM conversations c
         WHERE c.campaign_id = ?1 AND c.participant_low = ?2 AND c.participant_high = ?3",
        CONVERSATION_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![campaign_id.to_string(), low, high], |row| {
        conversation_from_row(row, 0)
    })
    .optional()
}

pub(crate) fn conversation_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: uuid_at(row, offset)?,
        campaign_id: uuid_at(row, offset + 1)?,
        pac_user_id: uuid_at(row, offset + 2)?,
        influencer_user_id: uuid_at(row, offset + 3)?,
        last_message_at: opt_ts_at(row, offset + 4)?,
        created_at: ts_at(row, offset + 5)?,
        updated_at: ts_at(row, offset + 6)?,
    })
}
