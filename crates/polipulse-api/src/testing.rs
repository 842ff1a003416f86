//! Unit-test setup: an in-memory store with one PAC admin, one registered
//! creator and a campaign between them.

use uuid::Uuid;

use polipulse_db::Database;
use polipulse_db::directory::NewProfile;
use polipulse_types::api::CreateSubmissionRequest;
use polipulse_types::models::{ContentSubmission, Role};

use crate::compliance::create_submission;
use crate::context::{RequestContext, Session};

pub(crate) struct Harness {
    pub db: Database,
    pub admin: Uuid,
    pub creator: Uuid,
    pub campaign: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let admin = add_user(&db, "admin@civic.org", "Civic Admin", Role::Pac);
        let creator = add_user(&db, "dana@creators.io", "Dana", Role::Influencer);
        let pac = db.create_pac("Civic PAC", None, admin).unwrap();
        let campaign = db.create_campaign(pac.id, "Get Out The Vote").unwrap().id;
        db.ensure_influencer(creator).unwrap();
        Self {
            db,
            admin,
            creator,
            campaign,
        }
    }

    pub fn ctx(&self, user_id: Uuid) -> RequestContext<'_> {
        let email: String = self
            .db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT email FROM users WHERE id = ?1", [user_id.to_string()], |r| r.get(0))?)
            })
            .unwrap();
        RequestContext::authenticated(&self.db, Session { user_id, email })
    }

    pub fn user(&self, email: &str, name: &str, role: Role) -> Uuid {
        add_user(&self.db, email, name, role)
    }

    pub fn submission(&self) -> ContentSubmission {
        create_submission(
            &self.ctx(self.creator),
            self.campaign,
            &CreateSubmissionRequest {
                platform: "instagram".into(),
                content_type: "story".into(),
                content_url: None,
                caption: Some("Polls open at 7".into()),
                fec_disclosure: None,
            },
        )
        .unwrap()
    }
}

fn add_user(db: &Database, email: &str, name: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    db.create_user(
        &id.to_string(),
        email,
        "hash",
        &NewProfile {
            display_name: name,
            avatar_url: None,
            role,
        },
    )
    .unwrap();
    id
}
