//! The send boundary
//!
//! The engine never talks to a transport directly. Every message goes through
//! a [`SendAdapter`] chosen per account by the [`AdapterRegistry`].

use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use cadence_common::{
    AccountId,
    model::{Account, OutboxMessage},
    outbound,
};

use crate::error::SendError;

/// What a transport returns for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Stable identifier assigned by the provider
    pub provider_id: String,
    pub thread_id: Option<String>,
    /// Nothing left the process
    pub simulated: bool,
}

/// A transport capable of delivering a rendered message
#[async_trait]
pub trait SendAdapter: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Hand `message` to the transport
    ///
    /// # Errors
    /// If the transport fails or refuses the message
    async fn send(&self, message: &OutboxMessage) -> Result<SendReceipt, SendError>;
}

/// Accepts everything without contacting any transport
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunAdapter;

#[async_trait]
impl SendAdapter for DryRunAdapter {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn send(&self, message: &OutboxMessage) -> Result<SendReceipt, SendError> {
        Ok(SendReceipt {
            provider_id: format!("dry-run-{}", message.id),
            thread_id: None,
            simulated: true,
        })
    }
}

/// Writes each message to the log instead of delivering it.
///
/// Used when no real transport is wired in. Unlike [`DryRunAdapter`] the send
/// counts as delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAdapter;

#[async_trait]
impl SendAdapter for LogAdapter {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, message: &OutboxMessage) -> Result<SendReceipt, SendError> {
        if message.to.is_empty() {
            return Err(SendError::Rejected("message has no recipients".to_string()));
        }

        let provider_id = ulid::Ulid::new().to_string();

        outbound!(
            level = INFO,
            "[{provider_id}] To: {} Subject: {:?} ({} bytes html, {} bytes text)",
            message.to.join(", "),
            message.subject,
            message.html.len(),
            message.text.len()
        );

        Ok(SendReceipt {
            thread_id: Some(provider_id.clone()),
            provider_id,
            simulated: false,
        })
    }
}

/// Resolves the adapter that sends for an account
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    accounts: BTreeMap<AccountId, Account>,
    transport: Arc<dyn SendAdapter>,
    dry_run: Arc<dyn SendAdapter>,
}

impl AdapterRegistry {
    /// A registry sending through `transport` for every non-dry-run account
    #[must_use]
    pub fn new(transport: Arc<dyn SendAdapter>) -> Self {
        Self {
            accounts: BTreeMap::new(),
            transport,
            dry_run: Arc::new(DryRunAdapter),
        }
    }

    #[must_use]
    pub fn with_account(mut self, account: Account) -> Self {
        self.register(account);
        self
    }

    pub fn register(&mut self, account: Account) {
        self.accounts.insert(account.id.clone(), account);
    }

    #[must_use]
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    /// The account and the adapter to send with.
    ///
    /// Dry-run accounts always get the dry-run adapter, whatever transport is
    /// configured.
    ///
    /// # Errors
    /// If the account is unknown
    pub fn resolve(&self, id: &AccountId) -> Result<(&Account, Arc<dyn SendAdapter>), SendError> {
        let account = self
            .accounts
            .get(id)
            .ok_or_else(|| SendError::Configuration(format!("unknown account {id}")))?;

        let adapter = if account.dry_run {
            self.dry_run.clone()
        } else {
            self.transport.clone()
        };

        Ok((account, adapter))
    }
}
