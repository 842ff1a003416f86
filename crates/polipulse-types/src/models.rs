use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Directory --

/// Which side of the marketplace a user sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Pac,
    Influencer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pac => "pac",
            Self::Influencer => "influencer",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pac" => Ok(Self::Pac),
            "influencer" => Ok(Self::Influencer),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Display identity joined onto conversations and messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pac {
    pub id: Uuid,
    pub name: String,
    pub fec_id: Option<String>,
    pub admin_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub pac_id: Uuid,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Influencer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// -- Messaging --

/// The single thread between one organization-side user and one
/// creator-side user within a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub pac_user_id: Uuid,
    pub influencer_user_id: Uuid,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.pac_user_id == user_id || self.influencer_user_id == user_id
    }

    /// The other participant, or `None` if `user_id` is not in the conversation.
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.pac_user_id == user_id {
            Some(self.influencer_user_id)
        } else if self.influencer_user_id == user_id {
            Some(self.pac_user_id)
        } else {
            None
        }
    }
}

/// Conversation enriched for a conversation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub campaign_name: Option<String>,
    pub pac_profile: ProfileSummary,
    pub influencer_profile: ProfileSummary,
    /// Messages addressed to the viewing user that are still unread.
    pub unread_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub subject: Option<String>,
    pub content: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub sender_profile: ProfileSummary,
    pub recipient_profile: ProfileSummary,
}

// -- Compliance --

/// Review state of a content submission.
///
/// `Rejected` is stored and reported but nothing transitions into it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    RevisionRequested,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::RevisionRequested => "revision_requested",
            Self::Rejected => "rejected",
        }
    }

    /// Whether the review workflow allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (RevisionRequested, Approved)
                | (Pending, RevisionRequested)
                | (RevisionRequested, RevisionRequested)
                | (RevisionRequested, Pending)
        )
    }

    /// Statuses that still need a reviewer's attention.
    pub fn awaits_review(&self) -> bool {
        matches!(self, Self::Pending | Self::RevisionRequested)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "revision_requested" => Ok(Self::RevisionRequested),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSubmission {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub influencer_id: Uuid,
    pub platform: String,
    pub content_type: String,
    pub content_url: Option<String>,
    pub caption: Option<String>,
    pub fec_disclosure: Option<String>,
    pub status: SubmissionStatus,
    pub compliance_checked: bool,
    pub review_notes: Option<String>,
    pub submission_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submission joined with the names a reviewer needs to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionDetail {
    #[serde(flatten)]
    pub submission: ContentSubmission,
    pub campaign_name: Option<String>,
    pub pac_name: Option<String>,
    pub influencer_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceItemKind {
    Submission,
    Campaign,
    Disclosure,
}

/// Queue entry derived from a submission awaiting review. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ComplianceItemKind,
    pub title: String,
    pub status: SubmissionStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub campaign_name: Option<String>,
    pub influencer_name: Option<String>,
    pub platform: Option<String>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub total_submissions: u32,
    pub compliant: u32,
    pub pending_review: u32,
    pub flagged: u32,
    /// Whole percent, 0 when there are no submissions.
    pub compliance_rate: u32,
}

// -- Audit --

/// Kind of compliance action recorded in the audit trail. Kinds written by
/// other tools survive as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuditAction {
    SubmissionApproved,
    RevisionRequested,
    SubmissionPending,
    Other(String),
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubmissionApproved => "submission_approved",
            Self::RevisionRequested => "revision_requested",
            Self::SubmissionPending => "submission_pending",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for AuditAction {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "submission_approved" => Self::SubmissionApproved,
            "revision_requested" => Self::RevisionRequested,
            "submission_pending" => Self::SubmissionPending,
            _ => Self::Other(raw),
        }
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        match action {
            AuditAction::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Submission,
    Campaign,
    Disclosure,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Campaign => "campaign",
            Self::Disclosure => "disclosure",
        }
    }
}

impl FromStr for TargetType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submission" => Ok(Self::Submission),
            "campaign" => Ok(Self::Campaign),
            "disclosure" => Ok(Self::Disclosure),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor_id: Uuid,
    pub actor_email: Option<String>,
    pub actor_name: Option<String>,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A stored enum column held a value this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);
