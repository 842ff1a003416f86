//! Shared setup for the store's unit tests: one PAC admin who owns a
//! campaign, and one creator with an influencer record.

use uuid::Uuid;

use polipulse_types::models::{Campaign, Influencer, Message, Role};

use crate::Database;
use crate::directory::NewProfile;
use crate::messages::NewMessage;

pub(crate) struct Fixture {
    pub db: Database,
    pub admin: Uuid,
    pub creator: Uuid,
    pub campaign: Campaign,
    pub influencer: Influencer,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let admin = add_user(&db, "admin@civic.org", "Civic Admin", Role::Pac);
        let creator = add_user(&db, "dana@creators.io", "Dana", Role::Influencer);
        let pac = db.create_pac("Civic PAC", None, admin).unwrap();
        let campaign = db.create_campaign(pac.id, "Get Out The Vote").unwrap();
        let influencer = db.ensure_influencer(creator).unwrap();
        Self {
            db,
            admin,
            creator,
            campaign,
            influencer,
        }
    }

    pub fn send(&self, from: Uuid, to: Uuid, content: &str) -> Message {
        self.db
            .insert_message(&NewMessage {
                campaign_id: self.campaign.id,
                sender_id: from,
                recipient_id: to,
                subject: None,
                content,
            })
            .unwrap()
            .message
    }
}

pub(crate) fn add_user(db: &Database, email: &str, name: &str, role: Role) -> Uuid {
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
