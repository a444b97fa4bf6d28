//! Test support for scheduler and campaign scenarios
//!
//! Scenarios run against the in-memory store, a [`ManualClock`] moved by hand
//! between ticks, and a [`ScriptedAdapter`] standing in for the transport.
//!
//! [`ManualClock`]: cadence_common::ManualClock

pub mod adapter;
pub mod harness;
pub mod store;

pub use adapter::{Script, ScriptedAdapter};
pub use harness::{Harness, t0};
pub use store::FaultyLog;
