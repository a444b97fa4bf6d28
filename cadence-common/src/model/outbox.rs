use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{OutboxId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Accepted by a dry-run adapter; nothing left the process
    Scheduled,
    /// Rendered and about to be handed to a transport
    Pending,
    Sent,
    Failed,
}

/// A fully rendered message, the unit handed to a send adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxId,
    pub run_id: RunId,
    pub from: Option<String>,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub tracking_id: Option<String>,
    pub status: OutboxStatus,
    pub provider_id: Option<String>,
    pub thread_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
