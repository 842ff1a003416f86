//! Pure derivations over submissions and audit entries. Shared by the API
//! (which serves them) and clients (which may recompute after a local patch).

use serde::Serialize;

use crate::models::{
    AuditAction, ComplianceItem, ComplianceItemKind, ComplianceStats, ContentSubmission, Priority,
    SubmissionDetail, SubmissionStatus,
};

/// Most recent submissions shown in the review queue.
pub const PENDING_QUEUE_LIMIT: usize = 20;

/// Most recent audit entries shown in the trail.
pub const AUDIT_LOG_LIMIT: usize = 50;

/// `compliant / total` as a whole percent, rounded half up. Zero when `total` is zero.
pub fn compliance_rate(compliant: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let scaled = u64::from(compliant) * 100;
    let total = u64::from(total);
    ((scaled * 2 + total) / (total * 2)) as u32
}

impl ComplianceStats {
    pub fn from_submissions<'a, I>(submissions: I) -> Self
    where
        I: IntoIterator<Item = &'a ContentSubmission>,
    {
        let mut stats = ComplianceStats::default();
        for sub in submissions {
            stats.total_submissions += 1;
            match sub.status {
                SubmissionStatus::Approved if sub.compliance_checked => stats.compliant += 1,
                SubmissionStatus::Pending => stats.pending_review += 1,
                SubmissionStatus::RevisionRequested => stats.flagged += 1,
                _ => {}
            }
        }
        stats.compliance_rate = compliance_rate(stats.compliant, stats.total_submissions);
        stats
    }
}

impl Priority {
    pub fn for_status(status: SubmissionStatus) -> Self {
        match status {
            SubmissionStatus::RevisionRequested => Priority::High,
            _ => Priority::Medium,
        }
    }
}

impl ComplianceItem {
    /// Project a submission into the review queue. Returns `None` for
    /// submissions that no longer await review.
    pub fn from_detail(detail: &SubmissionDetail) -> Option<Self> {
        let sub = &detail.submission;
        if !sub.status.awaits_review() {
            return None;
        }

        Some(ComplianceItem {
            id: sub.id,
            kind: ComplianceItemKind::Submission,
            title: format!("{} - {}", sub.content_type, sub.platform),
            status: sub.status,
            priority: Priority::for_status(sub.status),
            created_at: sub.created_at,
            campaign_name: detail.campaign_name.clone(),
            influencer_name: detail.influencer_name.clone(),
            platform: Some(sub.platform.clone()),
            issues: sub.review_notes.iter().cloned().collect(),
        })
    }
}

/// Build the review queue: awaiting-review submissions, newest first, capped.
pub fn pending_queue<'a, I>(details: I) -> Vec<ComplianceItem>
where
    I: IntoIterator<Item = &'a SubmissionDetail>,
{
    let mut items: Vec<ComplianceItem> = details
        .into_iter()
        .filter_map(ComplianceItem::from_detail)
        .collect();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    items.truncate(PENDING_QUEUE_LIMIT);
    items
}

// -- Audit display --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditIcon {
    CheckCircle,
    AlertCircle,
    Clock,
    FileText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTone {
    Green,
    Yellow,
    Blue,
    Gray,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditDisplay {
    pub label: String,
    pub icon: AuditIcon,
    pub tone: AuditTone,
}

impl AuditAction {
    pub fn display(&self) -> AuditDisplay {
        let (label, icon, tone) = match self {
            Self::SubmissionApproved => ("Approved".to_string(), AuditIcon::CheckCircle, AuditTone::Green),
            Self::RevisionRequested => (
                "Revision Requested".to_string(),
                AuditIcon::AlertCircle,
                AuditTone::Yellow,
            ),
            Self::SubmissionPending => ("Pending Review".to_string(), AuditIcon::Clock, AuditTone::Blue),
            Self::Other(raw) => (humanize(raw), AuditIcon::FileText, AuditTone::Gray),
        };
        AuditDisplay { label, icon, tone }
    }
}

/// `campaign_paused` -> `Campaign Paused`.
pub fn humanize(raw: &str) -> String {
    raw.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
