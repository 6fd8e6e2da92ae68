/// Errors surfaced by discovery operations.
///
/// Transport failures are deliberately absent: they are folded into
/// [`crate::ProbeOutcome::Unknown`] and never abort anything.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    /// Catalog storage error
    #[error("Catalog error: {0}")]
    Catalog(#[from] sqlx::Error),

    /// A stored document or blob could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Required setting missing or invalid; the run aborts before probing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Settings update rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Another discovery run holds the run state
    #[error("A discovery run is already in progress")]
    RunInProgress,

    /// The run was stopped before it could publish
    #[error("Discovery run cancelled")]
    Cancelled,

    /// Requested entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}
