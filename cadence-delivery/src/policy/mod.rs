//! Policies consulted by the scheduler
//!
//! - `retry`: backoff and review thresholds for failed steps
//! - `campaign`: activation checks, step eligibility, quiet hours and throttle

pub mod campaign;
pub mod retry;

pub use campaign::{Gate, MAX_DAY_OFFSET, eligible_step, validate};
pub use retry::RetryPolicy;
