use actix_web::{HttpResponse, Result, web};
use campsite_discovery::TrackerService;

use crate::api_types::*;

/// Starts, or restarts, the periodic discovery loop
pub async fn start_scan(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    service.start().await;
    Ok(HttpResponse::Accepted().json(service.status().await))
}

/// Stops the loop and asks an in-flight run to wind down
pub async fn stop_scan(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    service.stop().await;
    Ok(HttpResponse::Ok().json(service.status().await))
}

/// Runs one discovery cycle and returns its summary
pub async fn run_scan(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    let summary = service.run_now().await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Scheduler state and last outcome
pub async fn scan_status(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.status().await))
}

/// Refreshes categories, locations and attribute definitions
pub async fn refresh_reference(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    let summary = service.refresh_reference_data().await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// Rewrites the attributes of catalogued resources
pub async fn refresh_attributes(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    let changed = service.refresh_resource_attributes().await?;
    Ok(HttpResponse::Ok().json(AttributeRefreshResponse { changed }))
}
