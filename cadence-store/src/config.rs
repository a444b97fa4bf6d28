use std::path::PathBuf;

use serde::Deserialize;

use crate::{MemoryStore, Result};

/// Which store backs the engine
///
/// File-backed store in RON config:
/// ```ron
/// store: File(
///     path: "/var/lib/cadence/cadence.bin",
/// ),
/// ```
///
/// Memory-only store, lost on restart:
/// ```ron
/// store: Memory,
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub enum StoreConfig {
    #[default]
    Memory,
    File { path: PathBuf },
}

impl StoreConfig {
    /// Open the configured store
    ///
    /// # Errors
    /// If a file-backed store cannot be opened
    pub async fn open(&self) -> Result<MemoryStore> {
        match self {
            Self::Memory => Ok(MemoryStore::new()),
            Self::File { path } => MemoryStore::open(path).await,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File { path } => Some(path.as_path()),
            Self::Memory => None,
        }
    }
}
