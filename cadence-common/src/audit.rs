//! Audit logging for send lifecycle events
//!
//! Every decision that touches a recipient is logged as a structured event so
//! compliance questions ("why did this person get this email?") can be
//! answered from the logs alone.
//!
//! ## Audit Events
//!
//! - `SendAttempt`: a rendered message is about to be handed to a transport
//! - `SendSuccess`: the transport accepted the message (or a dry run simulated it)
//! - `SendFailure`: the transport rejected the message or timed out
//! - `SendSkipped`: a step was recorded as skipped
//! - `Suppressed`: an address was added to the suppression registry
//!
//! Recipient addresses can be redacted through [`AuditConfig`].

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Audit configuration, the `audit` section of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Replace the local part of recipient addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            redact_recipients: false,
        }
    }
}

const fn default_enabled() -> bool {
    true
}

static AUDIT_CONFIG: OnceLock<Arc<AuditConfig>> = OnceLock::new();

/// Install the audit configuration. Only the first call has any effect.
pub fn init(config: AuditConfig) {
    AUDIT_CONFIG.get_or_init(|| Arc::new(config));
}

#[must_use]
pub fn config() -> Arc<AuditConfig> {
    AUDIT_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(AuditConfig::default()))
}

/// The address as it should appear in an audit event
#[must_use]
pub fn redact_recipient(email: &str, redact: bool) -> String {
    if !redact {
        return email.to_string();
    }

    email
        .rsplit_once('@')
        .map_or_else(|| "[REDACTED]".to_string(), |(_, domain)| format!("[REDACTED]@{domain}"))
}

fn recipient(email: &str) -> String {
    redact_recipient(email, config().redact_recipients)
}

/// Log a send attempt
///
/// # Fields
/// - `run_id`: the run being advanced
/// - `recipient`: recipient address (redacted if configured)
/// - `step_index`: position of the step in the run's sequence
/// - `attempt`: 1-based attempt number for this step
pub fn log_send_attempt(run_id: &str, recipient_email: &str, step_index: usize, attempt: u32) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        target: "cadence::audit",
        tracing::Level::INFO,
        event = "SendAttempt",
        run_id = %run_id,
        recipient = %recipient(recipient_email),
        step_index = step_index,
        attempt = attempt,
        "Audit: Send attempt"
    );
}

/// Log a successful send
pub fn log_send_success(run_id: &str, recipient_email: &str, provider_id: &str, dry_run: bool) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        target: "cadence::audit",
        tracing::Level::INFO,
        event = "SendSuccess",
        run_id = %run_id,
        recipient = %recipient(recipient_email),
        provider_id = %provider_id,
        dry_run = dry_run,
        "Audit: Send successful"
    );
}

/// Log a failed send
pub fn log_send_failure(run_id: &str, recipient_email: &str, error: &str, attempt: u32) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        target: "cadence::audit",
        tracing::Level::WARN,
        event = "SendFailure",
        run_id = %run_id,
        recipient = %recipient(recipient_email),
        error = %error,
        attempt = attempt,
        "Audit: Send failed"
    );
}

/// Log a skipped step
pub fn log_send_skipped(run_id: &str, step_index: usize, reason: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        target: "cadence::audit",
        tracing::Level::INFO,
        event = "SendSkipped",
        run_id = %run_id,
        step_index = step_index,
        reason = %reason,
        "Audit: Step skipped"
    );
}

/// Log a new suppression
pub fn log_suppression(email: &str, reason: &str) {
    if !config().enabled {
        return;
    }

    tracing::event!(
        target: "cadence::audit",
        tracing::Level::INFO,
        event = "Suppressed",
        recipient = %recipient(email),
        reason = %reason,
        "Audit: Address suppressed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_recipient() {
        assert_eq!(
            redact_recipient("ada@example.com", true),
            "[REDACTED]@example.com"
        );
        assert_eq!(redact_recipient("ada@example.com", false), "ada@example.com");
        assert_eq!(redact_recipient("not-an-address", true), "[REDACTED]");
    }

    #[test]
    fn test_default_config_enables_without_redaction() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert!(!config.redact_recipients);
    }
}
