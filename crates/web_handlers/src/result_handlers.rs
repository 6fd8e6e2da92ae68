use actix_web::{HttpResponse, Result, web};
use campsite_discovery::{CartTarget, TrackerService};

use crate::api_types::*;

/// Returns the published search result, ordered by location then site
pub async fn get_results(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.get_result().await))
}

/// Returns the cart
pub async fn get_cart(service: web::Data<TrackerService>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(service.get_cart().await))
}

/// Adds a published entry to the cart
pub async fn add_to_cart(
    service: web::Data<TrackerService>,
    request: web::Json<CartRequest>,
) -> Result<HttpResponse, ApiError> {
    let entry = service.add_to_cart(request.id).await?;
    Ok(HttpResponse::Ok().json(entry))
}

/// Removes one entry, or all of them with `all`, from the cart
pub async fn remove_from_cart(
    service: web::Data<TrackerService>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let target: CartTarget = path.into_inner().parse().map_err(ApiError::Validation)?;
    let removed = service.remove_from_cart(target).await?;

    Ok(HttpResponse::Ok().json(CartRemovalResponse { removed }))
}
