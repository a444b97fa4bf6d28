//! Message content for the cadence sequencer
//!
//! Everything in this crate is a pure function of its input:
//! - [`render`]: `{{placeholder}}` substitution, HTML body and plain-text alternative
//! - [`sanitize`]: allow-list HTML sanitizer
//! - [`tracking`]: open pixel and click-tracking link rewriting

mod entities;
pub mod render;
pub mod sanitize;
pub mod tracking;

pub use render::{Rendered, render, substitute};
pub use sanitize::sanitize;
pub use tracking::{TrackedHtml, Tracker, TrackingConfig, TrackingId};
