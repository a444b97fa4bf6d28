//! Typed error handling for delivery operations.
//!
//! This module distinguishes between:
//! - Failures of a single step (`StepFailure`), which are recorded against the
//!   run and never abort a tick
//! - Errors of the engine itself (`DeliveryError`), returned to the caller of
//!   an operation
//! - Campaign configuration errors (`PolicyError`), raised at activation

use std::time::Duration;

use cadence_common::{SequenceId, StepId, TemplateId, model::FailureKind};
use cadence_store::StoreError;
use thiserror::Error;

/// Why a send adapter did not deliver a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport could not be reached or failed mid-send.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider refused the message.
    #[error("Rejected by provider: {0}")]
    Rejected(String),

    /// The adapter did not answer within the send timeout.
    #[error("Send timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The run's account cannot send (unknown account, missing sender).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SendError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Rejected(_) => FailureKind::Rejected,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Configuration(_) => FailureKind::Configuration,
        }
    }

    /// Check if this error is worth retrying unattended.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Why a step could not be performed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("Template not found: {0}")]
    TemplateMissing(TemplateId),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl StepFailure {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::TemplateMissing(_) => FailureKind::TemplateMissing,
            Self::Send(e) => e.kind(),
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Invalid campaign configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Quiet hours {0} out of range, hours must be below 24")]
    HourOutOfRange(u8),

    #[error("Quiet hours window starts and ends at {0}, allowing no hours")]
    EmptyWindow(u8),

    #[error("Campaign throttle must be greater than zero")]
    ZeroThrottle,

    #[error("Throttle override for step {0} must be greater than zero")]
    ZeroStepThrottle(StepId),

    #[error("Step {0} waits {1} days, the most allowed is {max}", max = crate::policy::MAX_DAY_OFFSET)]
    DayOffsetTooLarge(StepId, u32),
}

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid campaign policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sequence {0} has no steps")]
    EmptySequence(SequenceId),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl DeliveryError {
    /// Map a store lookup miss to [`DeliveryError::NotFound`]
    pub(crate) fn from_lookup(error: StoreError) -> Self {
        if error.is_not_found() {
            Self::NotFound(error.to_string())
        } else {
            Self::Store(error)
        }
    }
}
