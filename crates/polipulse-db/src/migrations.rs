use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (directory, messaging, compliance)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                user_id       TEXT PRIMARY KEY REFERENCES users(id),
                display_name  TEXT,
                avatar_url    TEXT,
                email         TEXT,
                role          TEXT NOT NULL CHECK (role IN ('pac', 'influencer')),
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE TABLE pacs (
                id             TEXT PRIMARY KEY,
                name           TEXT NOT NULL,
                fec_id         TEXT,
                admin_user_id  TEXT NOT NULL REFERENCES users(id),
                created_at     TEXT NOT NULL
            );

            CREATE INDEX idx_pacs_admin ON pacs(admin_user_id);

            CREATE TABLE campaigns (
                id          TEXT PRIMARY KEY,
                pac_id      TEXT NOT NULL REFERENCES pacs(id),
                name        TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'draft',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_campaigns_pac ON campaigns(pac_id);

            CREATE TABLE influencers (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL UNIQUE REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            -- participant_low/high hold the pair in sorted order so the
            -- unique index covers the pair regardless of side.
            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                campaign_id         TEXT NOT NULL REFERENCES campaigns(id),
                pac_user_id         TEXT NOT NULL REFERENCES users(id),
                influencer_user_id  TEXT NOT NULL REFERENCES users(id),
                participant_low     TEXT NOT NULL,
                participant_high    TEXT NOT NULL,
                last_message_at     TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                CHECK (participant_low < participant_high),
                UNIQUE (campaign_id, participant_low, participant_high)
            );

            CREATE INDEX idx_conversations_pac ON conversations(pac_user_id);
            CREATE INDEX idx_conversations_influencer ON conversations(influencer_user_id);

            CREATE TABLE messages (
                id            TEXT PRIMARY KEY,
                campaign_id   TEXT NOT NULL REFERENCES campaigns(id),
                sender_id     TEXT NOT NULL REFERENCES users(id),
                recipient_id  TEXT NOT NULL REFERENCES users(id),
                subject       TEXT,
                content       TEXT NOT NULL CHECK (length(trim(content)) > 0),
                read_at       TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL,
                CHECK (sender_id <> recipient_id)
            );

            CREATE INDEX idx_messages_thread
                ON messages(campaign_id, sender_id, recipient_id, created_at);
            CREATE INDEX idx_messages_unread
                ON messages(recipient_id, read_at);

            CREATE TRIGGER trg_messages_touch_conversation
            AFTER INSERT ON messages
            BEGIN
                UPDATE conversations
                   SET last_message_at = NEW.created_at,
                       updated_at = NEW.created_at
                 WHERE campaign_id = NEW.campaign_id
                   AND participant_low = min(NEW.sender_id, NEW.recipient_id)
                   AND participant_high = max(NEW.sender_id, NEW.recipient_id)
                   AND (last_message_at IS NULL OR last_message_at < NEW.created_at);
            END;

            CREATE TABLE content_submissions (
                id                  TEXT PRIMARY KEY,
                campaign_id         TEXT NOT NULL REFERENCES campaigns(id),
                influencer_id       TEXT NOT NULL REFERENCES influencers(id),
                platform            TEXT NOT NULL,
                content_type        TEXT NOT NULL,
                content_url         TEXT,
                caption             TEXT,
                fec_disclosure      TEXT,
                status              TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'approved', 'revision_requested', 'rejected')),
                compliance_checked  INTEGER NOT NULL DEFAULT 0,
                review_notes        TEXT,
                submission_date     TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                CHECK (compliance_checked = 0 OR status = 'approved')
            );

            CREATE INDEX idx_submissions_campaign
                ON content_submissions(campaign_id, created_at);

            CREATE TABLE audit_log (
                id           TEXT PRIMARY KEY,
                action       TEXT NOT NULL,
                actor_id     TEXT NOT NULL REFERENCES users(id),
                actor_email  TEXT,
                target_type  TEXT NOT NULL,
                target_id    TEXT NOT NULL,
                details      TEXT NOT NULL DEFAULT '{}',
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_audit_target ON audit_log(target_id);
            CREATE INDEX idx_audit_created ON audit_log(created_at);

            CREATE TRIGGER trg_audit_log_no_update
            BEFORE UPDATE ON audit_log
            BEGIN
                SELECT RAISE(ABORT, 'audit_log is append-only');
            END;

            CREATE TRIGGER trg_audit_log_no_delete
            BEFORE DELETE ON audit_log
            BEGIN
                SELECT RAISE(ABORT, 'audit_log is append-only');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
