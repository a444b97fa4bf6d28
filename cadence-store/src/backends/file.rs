//! File-backed persistence for [`MemoryStore`]
//!
//! The whole state is written as a single bincode snapshot. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! snapshot, so a crash leaves either the previous or the new snapshot and
//! never a partial one.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use cadence_common::internal;
use tokio::{fs, sync::Mutex};

use super::memory::{MemoryStore, State};
use crate::{Result, SerializationError};

#[derive(Debug)]
pub struct Snapshot {
    path: PathBuf,
    /// Generation of the last snapshot written
    written: Mutex<u64>,
}

impl Snapshot {
    pub(crate) fn encode(state: &State) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(state, bincode::config::legacy())
            .map_err(|e| SerializationError::Encode(e).into())
    }

    fn decode(bytes: &[u8]) -> Result<State> {
        bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
            .map(|(state, _)| state)
            .map_err(|e| SerializationError::Decode(e).into())
    }

    /// Write `bytes` unless a newer generation has already been written
    pub(crate) async fn write(&self, generation: u64, bytes: Vec<u8>) -> Result<()> {
        let mut written = self.written.lock().await;
        if generation <= *written {
            return Ok(());
        }

        let temp = self.temp_path();
        fs::write(&temp, &bytes).await?;
        fs::rename(&temp, &self.path).await?;
        *written = generation;

        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map_or_else(|| "store".into(), |name| name.to_string_lossy());

        self.path.with_file_name(format!(".tmp_{name}"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MemoryStore {
    /// Open a store persisted at `path`, restoring any existing snapshot.
    ///
    /// The parent directory is created when missing. A leftover temporary
    /// file from an interrupted write is ignored.
    ///
    /// # Errors
    /// If the directory cannot be created, or an existing snapshot cannot be
    /// read or decoded
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let state = if fs::try_exists(&path).await? {
            let state = Snapshot::decode(&fs::read(&path).await?)?;
            internal!(
                level = INFO,
                "Restored {} runs and {} send log entries from {}",
                state.runs.len(),
                state.send_log.len(),
                path.display()
            );
            state
        } else {
            internal!(level = INFO, "No snapshot at {}, starting empty", path.display());
            State::default()
        };

        let generation = state.generation;

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            snapshot: Some(Arc::new(Snapshot {
                path,
                written: Mutex::new(generation),
            })),
        })
    }
}
