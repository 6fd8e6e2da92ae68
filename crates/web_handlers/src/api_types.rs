use actix_web::{HttpResponse, http::StatusCode};
use campsite_discovery::{DiscoveryError, ResourceId};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request body for adding an entry to the cart
#[derive(Debug, Deserialize)]
pub struct CartRequest {
    /// Resource id of a published entry
    pub id: ResourceId,
}

/// Request body for registering a push token
#[derive(Debug, Deserialize, Validate)]
pub struct TokenRequest {
    /// Application id of the client app
    #[validate(length(min = 1, message = "Application name is required"))]
    pub name: String,

    /// Device registration token
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

/// Response for cart removals
#[derive(Debug, Serialize)]
pub struct CartRemovalResponse {
    /// Entries removed
    pub removed: usize,
}

/// Response for the attribute refresh
#[derive(Debug, Serialize)]
pub struct AttributeRefreshResponse {
    /// Resource rows whose attributes changed
    pub changed: usize,
}

/// Errors returned by the façade handlers
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Error raised by the discovery engine
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Malformed request
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) | ApiError::Discovery(DiscoveryError::Validation(_)) => {
                "validation_error"
            }
            ApiError::Discovery(DiscoveryError::Configuration(_)) => "configuration_error",
            ApiError::Discovery(DiscoveryError::NotFound(_)) => "not_found",
            ApiError::Discovery(DiscoveryError::RunInProgress) => "run_in_progress",
            ApiError::Discovery(_) => "internal_error",
        }
    }
}

impl actix_web::ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::Discovery(DiscoveryError::Validation(_))
            | ApiError::Discovery(DiscoveryError::Configuration(_)) => StatusCode::BAD_REQUEST,
            ApiError::Discovery(DiscoveryError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Discovery(DiscoveryError::RunInProgress) => StatusCode::CONFLICT,
            ApiError::Discovery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("Request failed: {}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status).json(serde_json::json!({
            "error": self.code(),
            "message": message
        }))
    }
}
