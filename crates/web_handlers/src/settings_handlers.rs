use actix_web::{HttpResponse, Result, web};
use campsite_discovery::{Settings, TrackerService};
use validator::Validate;

use crate::api_types::*;

/// Returns the stored settings
pub async fn get_settings(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    let settings = service.get_settings().await?;
    Ok(HttpResponse::Ok().json(settings))
}

/// Replaces the settings; they take effect from the next run
pub async fn update_settings(
    service: web::Data<TrackerService>,
    request: web::Json<Settings>,
) -> Result<HttpResponse, ApiError> {
    let settings = service.on_settings_changed(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(settings))
}

/// Registers the device token used for push notifications
pub async fn register_token(
    service: web::Data<TrackerService>,
    request: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    service.register_push_token(&request.name, &request.token).await?;
    log::info!("Push token registered for {}", request.name);

    Ok(HttpResponse::NoContent().finish())
}
