//! Store backends
//!
//! - `memory`: every repository over in-memory tables
//! - `file`: snapshot persistence for the memory store

pub mod file;
pub mod memory;

pub use file::Snapshot;
pub use memory::MemoryStore;
