use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use polipulse_types::models::{Conversation, Message, MessageView, ProfileSummary};

use crate::conversations::{query_by_pair, upsert_in};
use crate::models::{now, opt_ts_at, stamp, ts_at, uuid_at};
use crate::{Database, OptionalExt};

const MESSAGE_VIEW_SELECT: &str = "
    SELECT m.id, m.campaign_id, m.sender_id, m.recipient_id, m.subject, m.content,
           m.read_at, m.created_at, m.updated_at,
           sp.display_name, sp.avatar_url,
           rp.display_name, rp.avatar_url
    FROM messages m
    LEFT JOIN profiles sp ON sp.user_id = m.sender_id
    LEFT JOIN profiles rp ON rp.user_id = m.recipient_id";

pub struct NewMessage<'a> {
    pub campaign_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: Option<&'a str>,
    pub content: &'a str,
}

/// Result of a mark-as-read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkRead {
    /// This call set the timestamp.
    Marked(DateTime<Utc>),
    /// An earlier call already set it; the stored value is returned unchanged.
    AlreadyRead(DateTime<Utc>),
    NotRecipient,
    NotFound,
}

impl Database {
    /// Insert a message. The conversation's `last_message_at` is advanced by
    /// the insert trigger.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageView> {
        self.with_conn(|conn| insert_in(conn, msg))
    }

    /// Resolve the conversation for the pair and store the message in one
    /// transaction. A failed insert leaves no new conversation behind.
    pub fn send_message(
        &self,
        pac_user_id: Uuid,
        influencer_user_id: Uuid,
        msg: &NewMessage<'_>,
    ) -> Result<(Conversation, MessageView)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let conversation = upsert_in(&tx, msg.campaign_id, pac_user_id, influencer_user_id)?;
            let message = insert_in(&tx, msg)?;
            let conversation = query_by_pair(&tx, msg.campaign_id, pac_user_id, influencer_user_id)?
                .ok_or_else(|| anyhow::anyhow!("conversation {} vanished mid-transaction", conversation.id))?;
            tx.commit()?;
            Ok((conversation, message))
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| Ok(query_message_view(conn, id)?.map(|v| v.message)))
    }

    /// All messages between the conversation's participants in its campaign,
    /// oldest first, with both profiles joined in.
    pub fn list_thread(&self, conversation: &Conversation) -> Result<Vec<MessageView>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{}
                 WHERE m.campaign_id = ?1
                   AND ((m.sender_id = ?2 AND m.recipient_id = ?3)
                     OR (m.sender_id = ?3 AND m.recipient_id = ?2))
                 ORDER BY m.created_at ASC, m.rowid ASC",
                MESSAGE_VIEW_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        conversation.campaign_id.to_string(),
                        conversation.pac_user_id.to_string(),
                        conversation.influencer_user_id.to_string()
                    ],
                    message_view_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Set `read_at` if `reader_id` is the recipient and it is still unset.
    pub fn mark_read(&self, message_id: Uuid, reader_id: Uuid) -> Result<MarkRead> {
        self.with_conn(|conn| {
            let at = now();
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND recipient_id = ?3 AND read_at IS NULL",
                rusqlite::params![stamp(at), message_id.to_string(), reader_id.to_string()],
            )?;
            if changed == 1 {
                return Ok(MarkRead::Marked(at));
            }

            let existing = conn
                .query_row(
                    "SELECT recipient_id, read_at FROM messages WHERE id = ?1",
                    [message_id.to_string()],
                    |row| Ok((uuid_at(row, 0)?, opt_ts_at(row, 1)?)),
                )
                .optional()?;

            Ok(match existing {
                None => MarkRead::NotFound,
                Some((recipient, _)) if recipient != reader_id => MarkRead::NotRecipient,
                Some((_, Some(read_at))) => MarkRead::AlreadyRead(read_at),
                // Unreachable while the lock is held; report as not found.
                Some((_, None)) => MarkRead::NotFound,
            })
        })
    }

    /// Mark every unread message addressed to `reader_id` in the conversation.
    /// Returns the timestamp used and the ids that changed.
    pub fn mark_thread_read(
        &self,
        conversation: &Conversation,
        reader_id: Uuid,
    ) -> Result<(DateTime<Utc>, Vec<Uuid>)> {
        let Some(sender_id) = conversation.counterpart_of(reader_id) else {
            return Ok((now(), Vec::new()));
        };
        self.with_conn(|conn| {
            let at = now();
            let mut stmt = conn.prepare(
                "UPDATE messages SET read_at = ?1, updated_at = ?1
                 WHERE campaign_id = ?2 AND sender_id = ?3 AND recipient_id = ?4 AND read_at IS NULL
                 RETURNING id",
            )?;
            let ids = stmt
                .query_map(
                    rusqlite::params![
                        stamp(at),
                        conversation.campaign_id.to_string(),
                        sender_id.to_string(),
                        reader_id.to_string()
                    ],
                    |row| uuid_at(row, 0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((at, ids))
        })
    }
}

fn insert_in(conn: &Connection, msg: &NewMessage<'_>) -> Result<MessageView> {
    let id = Uuid::new_v4();
    let at = stamp(now());
    conn.execute(
        "INSERT INTO messages (id, campaign_id, sender_id, recipient_id, subject, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![
            id.to_string(),
            msg.campaign_id.to_string(),
            msg.sender_id.to_string(),
            msg.recipient_id.to_string(),
            msg.subject,
            msg.content,
            at
        ],
    )?;

    query_message_view(conn, id)?.ok_or_else(|| anyhow::anyhow!("message {} missing after insert", id))
}

fn query_message_view(conn: &Connection, id: Uuid) -> Result<Option<MessageView>> {
    let sql = format!("{} WHERE m.id = ?1", MESSAGE_VIEW_SELECT);
    conn.query_row(&sql, [id.to_string()], message_view_from_row)
        .optional()
}

fn message_view_from_row(row: &Row<'_>) -> rusqlite::Result<MessageView> {
    Ok(MessageView {
        message: Message {
            id: uuid_at(row, 0)?,
            campaign_id: uuid_at(row, 1)?,
            sender_id: uuid_at(row, 2)?,
            recipient_id: uuid_at(row, 3)?,
            subject: row.get(4)?,
            content: row.get(5)?,
            read_at: opt_ts_at(row, 6)?,
            created_at: ts_at(row, 7)?,
            updated_at: ts_at(row, 8)?,
        },
        sender_profile: ProfileSummary {
            display_name: row.get(9)?,
            avatar_url: row.get(10)?,
        },
        recipient_profile: ProfileSummary {
            display_name: row.get(11)?,
            avatar_url: row.get(12)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn insert_advances_conversation_activity() {
        let fx = Fixture::new();
        let conv = fx.db.upsert_conversation(fx.campaign.id, fx.admin, fx.creator).unwrap();
        assert!(conv.last_message_at.is_none());

        let sent = fx
            .db
            .insert_message(&NewMessage {
                campaign_id: fx.campaign.id,
                sender_id: fx.admin,
                recipient_id: fx.creator,
                subject: Some("Brief"),
                content: "Draft attached",
            })
            .unwrap();
        assert_eq!(sent.sender_profile.display_name.as_deref(), Some("Civic Admin"));

        let conv = fx.db.get_conversation(conv.id).unwrap().unwrap();
        assert_eq!(conv.last_message_at, Some(sent.message.created_at));
    }

    #[test]
    fn send_creates_the_conversation_with_its_first_message() {
        let fx = Fixture::new();
        let (conv, sent) = fx
            .db
            .send_message(
                fx.admin,
                fx.creator,
                &NewMessage {
                    campaign_id: fx.campaign.id,
                    sender_id: fx.creator,
                    recipient_id: fx.admin,
                    subject: None,
                    content: "Question about the brief",
                },
            )
            .unwrap();
        assert_eq!(conv.pac_user_id, fx.admin);
        assert_eq!(conv.influencer_user_id, fx.creator);
        assert_eq!(conv.last_message_at, Some(sent.message.created_at));
    }

    #[test]
    fn failed_send_leaves_no_empty_conversation() {
        let fx = Fixture::new();
        let blank = NewMessage {
            campaign_id: fx.campaign.id,
            sender_id: fx.admin,
            recipient_id: fx.creator,
            subject: None,
            content: " ",
        };
        assert!(fx.db.send_message(fx.admin, fx.creator, &blank).is_err());
        assert!(fx.db.find_conversation(fx.campaign.id, fx.admin, fx.creator).unwrap().is_none());
    }

    #[test]
    fn store_rejects_blank_content_and_self_messages() {
        let fx = Fixture::new();
        let blank = NewMessage {
            campaign_id: fx.campaign.id,
            sender_id: fx.admin,
            recipient_id: fx.creator,
            subject: None,
            content: "   ",
        };
        assert!(fx.db.insert_message(&blank).is_err());

        let to_self = NewMessage {
            recipient_id: fx.admin,
            content: "note to self",
            ..blank
        };
        assert!(fx.db.insert_message(&to_self).is_err());
    }

    #[test]
    fn mark_read_is_first_call_wins() {
        let fx = Fixture::new();
        let sent = fx.send(fx.admin, fx.creator, "hello");

        assert_eq!(fx.db.mark_read(sent.id, fx.admin).unwrap(), MarkRead::NotRecipient);

        let first = match fx.db.mark_read(sent.id, fx.creator).unwrap() {
            MarkRead::Marked(at) => at,
            other => panic!("expected Marked, got {:?}", other),
        };
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(fx.db.mark_read(sent.id, fx.creator).unwrap(), MarkRead::AlreadyRead(first));
        assert_eq!(fx.db.get_message(sent.id).unwrap().unwrap().read_at, Some(first));

        assert_eq!(fx.db.mark_read(Uuid::new_v4(), fx.creator).unwrap(), MarkRead::NotFound);
    }

    #[test]
    fn thread_read_only_touches_incoming_messages() {
        let fx = Fixture::new();
        let conv = fx.db.upsert_conversation(fx.campaign.id, fx.admin, fx.creator).unwrap();
        fx.send(fx.admin, fx.creator, "one");
        fx.send(fx.admin, fx.creator, "two");
        let reply = fx.send(fx.creator, fx.admin, "three");

        let (_, marked) = fx.db.mark_thread_read(&conv, fx.creator).unwrap();
        assert_eq!(marked.len(), 2);
        assert!(fx.db.get_message(reply.id).unwrap().unwrap().read_at.is_none());

        let (_, again) = fx.db.mark_thread_read(&conv, fx.creator).unwrap();
        assert!(again.is_empty());
    }
}
