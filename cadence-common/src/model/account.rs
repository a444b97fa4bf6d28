use serde::{Deserialize, Serialize};

use crate::AccountId;

/// A sending account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Address used in the `From` header
    #[serde(default)]
    pub from: Option<String>,

    /// Simulate sends for this account instead of contacting a transport
    #[serde(default)]
    pub dry_run: bool,
}

impl Account {
    #[must_use]
    pub fn new(id: impl Into<AccountId>) -> Self {
        Self {
            id: id.into(),
            from: None,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}
