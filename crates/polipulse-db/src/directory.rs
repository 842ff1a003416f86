//! Users, profiles and the PAC → campaign ownership chain.

use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use polipulse_types::models::{Campaign, Influencer, Pac, Role};

use crate::models::{UserRow, enum_at, now, stamp, ts_at, uuid_at};
use crate::{Database, OptionalExt};

pub struct NewProfile<'a> {
    pub display_name: &'a str,
    pub avatar_url: Option<&'a str>,
    pub role: Role,
}

impl Database {
    // -- Users --

    /// Create a user and their profile together.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        profile: &NewProfile<'_>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let at = stamp(now());
            tx.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, &at),
            )?;
            tx.execute(
                "INSERT INTO profiles (user_id, display_name, avatar_url, email, role, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    id,
                    profile.display_name,
                    profile.avatar_url,
                    email,
                    profile.role.as_str(),
                    &at
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_role(&self, user_id: Uuid) -> Result<Option<Role>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT role FROM profiles WHERE user_id = ?1",
                [user_id.to_string()],
                |row| enum_at::<Role>(row, 0),
            )
            .optional()
        })
    }

    // -- PACs & campaigns --

    pub fn create_pac(&self, name: &str, fec_id: Option<&str>, admin_user_id: Uuid) -> Result<Pac> {
        let pac = Pac {
            id: Uuid::new_v4(),
            name: name.to_string(),
            fec_id: fec_id.map(str::to_string),
            admin_user_id,
            created_at: now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pacs (id, name, fec_id, admin_user_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    pac.id.to_string(),
                    &pac.name,
                    &pac.fec_id,
                    pac.admin_user_id.to_string(),
                    stamp(pac.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(pac)
    }

    pub fn get_pac(&self, id: Uuid) -> Result<Option<Pac>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, fec_id, admin_user_id, created_at FROM pacs WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Pac {
                        id: uuid_at(row, 0)?,
                        name: row.get(1)?,
                        fec_id: row.get(2)?,
                        admin_user_id: uuid_at(row, 3)?,
                        created_at: ts_at(row, 4)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn create_campaign(&self, pac_id: Uuid, name: &str) -> Result<Campaign> {
        let campaign = Campaign {
            id: Uuid::new_v4(),
            pac_id,
            name: name.to_string(),
            status: "draft".to_string(),
            created_at: now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO campaigns (id, pac_id, name, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    campaign.id.to_string(),
                    campaign.pac_id.to_string(),
                    &campaign.name,
                    &campaign.status,
                    stamp(campaign.created_at)
                ],
            )?;
            Ok(())
        })?;
        Ok(campaign)
    }

    pub fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, pac_id, name, status, created_at FROM campaigns WHERE id = ?1",
                [id.to_string()],
                |row| {
                    Ok(Campaign {
                        id: uuid_at(row, 0)?,
                        pac_id: uuid_at(row, 1)?,
                        name: row.get(2)?,
                        status: row.get(3)?,
                        created_at: ts_at(row, 4)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Influencers --

    /// Register the creator record for a user. Returns the existing record
    /// if the user already has one.
    pub fn ensure_influencer(&self, user_id: Uuid) -> Result<Influencer> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO influencers (id, user_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO NOTHING",
                rusqlite::params![Uuid::new_v4().to_string(), user_id.to_string(), stamp(now())],
            )?;
            query_influencer_by_user(conn, user_id)?
                .ok_or_else(|| anyhow::anyhow!("influencer row missing after insert for {}", user_id))
        })
    }

    pub fn get_influencer_by_user(&self, user_id: Uuid) -> Result<Option<Influencer>> {
        self.with_conn(|conn| query_influencer_by_user(conn, user_id))
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is one of two literals chosen above, never user input.
    let sql = format!("SELECT id, email, password, created_at FROM users WHERE {} = ?1", column);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_influencer_by_user(conn: &Connection, user_id: Uuid) -> Result<Option<Influencer>> {
    conn.query_row(
        "SELECT id, user_id, created_at FROM influencers WHERE user_id = ?1",
        [user_id.to_string()],
        |row| {
            Ok(Influencer {
                id: uuid_at(row, 0)?,
                user_id: uuid_at(row, 1)?,
                created_at: ts_at(row, 2)?,
            })
        },
    )
    .optional()
}
