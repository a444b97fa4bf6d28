//! Records the engine reads and writes
//!
//! Everything here is plain data. Behaviour that decides *what happens next*
//! lives in `cadence-delivery`; storage lives in `cadence-store`.

pub mod account;
pub mod campaign;
pub mod contact;
pub mod outbox;
pub mod run;
pub mod send_log;
pub mod sequence;
pub mod suppression;

pub use account::Account;
pub use campaign::{Campaign, CampaignMetrics, CampaignPolicy, CampaignStatus, QuietHours};
pub use contact::Contact;
pub use outbox::{OutboxMessage, OutboxStatus};
pub use run::{
    AttemptOutcome, FailureKind, HoldReason, RunStatus, SequenceRun, StepAttempt, StopReason,
};
pub use send_log::{SendLog, SendStatus, SkipReason};
pub use sequence::{Sequence, Step, StepKind, Template};
pub use suppression::{SuppressionEntry, SuppressionReason, normalize_email};
