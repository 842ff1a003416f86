use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MessageView, SubmissionStatus};

/// Events pushed over the realtime gateway. Every event is addressed to
/// specific users; nothing is broadcast to all connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RealtimeEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, email: String },

    /// A message was posted in a conversation the receiver takes part in
    MessageCreate {
        conversation_id: Uuid,
        message: MessageView,
    },

    /// The recipient of a message read it
    MessageRead {
        conversation_id: Uuid,
        message_id: Uuid,
        reader_id: Uuid,
        read_at: DateTime<Utc>,
    },

    /// A submission the receiver created or reviews changed status
    SubmissionUpdated {
        submission_id: Uuid,
        campaign_id: Uuid,
        status: SubmissionStatus,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}
