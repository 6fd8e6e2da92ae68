//! # Web Handlers for the Campsite Tracker Web Application
//!
//! HTTP façade over the discovery engine: published results, the cart,
//! settings, push token registration and scheduler control.

/// Request and response types plus the façade error
mod api_types;
pub use api_types::*;

/// Search result and cart handlers
mod result_handlers;
pub use result_handlers::*;

/// Settings and push token handlers
mod settings_handlers;
pub use settings_handlers::*;

/// Scheduler and maintenance handlers
mod scan_handlers;
pub use scan_handlers::*;

/// Route table
mod routes;
pub use routes::*;
