//! Identifier newtypes
//!
//! Generated identifiers are ULIDs, which sort by creation time. Identifiers
//! supplied through configuration may be any non-empty string.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(Arc<str>);

            impl $name {
                /// Wrap an existing identifier
                #[must_use]
                pub fn new(id: impl Into<Arc<str>>) -> Self {
                    Self(id.into())
                }

                /// Generate a new, time-ordered identifier
                #[must_use]
                pub fn generate() -> Self {
                    Self(Arc::from(ulid::Ulid::new().to_string()))
                }

                #[must_use]
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self::new(value)
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self::new(value)
                }
            }
        )*
    };
}

identifier!(
    /// Identifier of a contact (prospect)
    ContactId,
    /// Identifier of a sequence
    SequenceId,
    /// Identifier of a step within a sequence
    StepId,
    /// Identifier of a template
    TemplateId,
    /// Identifier of a sequence run
    RunId,
    /// Identifier of a campaign
    CampaignId,
    /// Identifier of a contact list
    ListId,
    /// Identifier of a sending account
    AccountId,
    /// Identifier of a send log entry
    SendLogId,
    /// Identifier of an outbox message
    OutboxId,
);
