//! Storage for the cadence sequencer
//!
//! The engine only ever talks to the traits in [`repository`]; [`MemoryStore`]
//! implements all of them, optionally persisting to a snapshot file.

pub mod backends;
pub mod config;
pub mod error;
pub mod repository;

pub use backends::MemoryStore;
pub use config::StoreConfig;
pub use error::{Result, SerializationError, StoreError};
pub use repository::{
    CampaignRepo, ContactRepo, OutboxRepo, Repositories, RunRepo, SendLogRepo, SequenceRepo,
    SuppressionRegistry, TemplateRepo,
};
