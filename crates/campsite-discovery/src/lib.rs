//! # Campsite Discovery
//!
//! Availability discovery for a hierarchical campsite reservation catalog.
//! A run walks the remote map tree from the configured parks, pruning every
//! subtree the platform reports as unavailable, catalogues newly seen sites,
//! localizes the best contiguous stay window per site and publishes the
//! resulting list for the notification and cart façade.

/// Domain types: catalog rows, windows, search results, settings
mod types;
pub use types::*;

/// Error taxonomy for discovery operations
mod error;
pub use error::*;

/// Process-level configuration and window policies
mod config;
pub use config::*;

/// Per-run context and cooperative cancellation
mod context;
pub use context::*;

/// Decoding of remote availability payloads
mod probe;
pub use probe::*;

/// Rate-limited availability queries against the booking platform
mod probe_client;
pub use probe_client::*;

/// Durable catalog of locations, resources and reference data
mod catalog;
pub use catalog::*;

/// Resolution of defined attributes into display pairs
mod attributes;
pub use attributes::*;

/// Map tree exploration
mod walker;
pub use walker::*;

/// Contiguous stay window localization
mod window;
pub use window::*;

/// Deep links into the booking flow
mod booking;
pub use booking::*;

/// Joins discovered windows with catalog metadata
mod reconciler;
pub use reconciler::*;

/// Published search result and cart, swapped atomically
mod results;
pub use results::*;

/// One complete discovery cycle
mod discovery;
pub use discovery::*;

/// Periodic run scheduling with mutual exclusion
mod scheduler;
pub use scheduler::*;

/// Reference data and attribute refresh passes
mod maintenance;
pub use maintenance::*;

/// Entry points used by the HTTP façade
mod service;
pub use service::*;

/// Scripted in-memory transport for tests
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
