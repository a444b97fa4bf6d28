//! The cadence delivery engine
//!
//! - [`scheduler`]: the tick that decides what to send to whom, and the
//!   interval driver around it
//! - [`run_state`]: the pure state machine a run moves through
//! - [`policy`]: retry/backoff and campaign gating (throttle, quiet hours)
//! - [`adapter`]: the send boundary
//! - [`campaign`]: operator-facing campaign and run operations
//! - [`engagement`]: opens, clicks, replies, bounces and unsubscribes

pub mod adapter;
pub mod campaign;
pub mod engagement;
pub mod error;
pub mod policy;
pub mod run_state;
pub mod scheduler;

pub use adapter::{AdapterRegistry, DryRunAdapter, LogAdapter, SendAdapter, SendReceipt};
pub use campaign::CampaignManager;
pub use engagement::{EngagementEvent, EngagementRecorder};
pub use error::{DeliveryError, PolicyError, SendError, StepFailure};
pub use policy::{RetryPolicy, eligible_step};
pub use run_state::{Outcome, schedule, transition};
pub use scheduler::{Scheduler, SchedulerConfig, TickReport};
