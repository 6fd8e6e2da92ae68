//! # Reservation API
//!
//! Transport layer for the remote booking platform. Every request made through
//! this crate either yields a decoded JSON document or `None`; transport,
//! status and payload failures never escape as errors.

/// The `Transport` seam and its reqwest-backed implementation.
mod transport;
pub use transport::*;
