pub mod config;
pub mod controller;

pub use config::{Cadence, Seed};
pub use controller::{Engine, SHUTDOWN_BROADCAST};
