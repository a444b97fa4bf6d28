//! Shared building blocks for the cadence sequencer
//!
//! - [`model`]: contacts, sequences, runs, campaigns, send logs and the outbox
//! - [`clock`]: the time source used by everything that schedules
//! - [`logging`]: subscriber initialisation and the logging macros
//! - [`audit`]: structured audit events for sends and suppressions

pub mod audit;
pub mod clock;
pub mod id;
pub mod logging;
pub mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use id::{
    AccountId, CampaignId, ContactId, ListId, OutboxId, RunId, SendLogId, SequenceId, StepId,
    TemplateId,
};
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
