use actix_web::{HttpResponse, web};

use crate::{result_handlers::*, scan_handlers::*, settings_handlers::*};

/// Registers every façade route; the application must provide
/// `web::Data<TrackerService>`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/results", web::get().to(get_results))
            .route("/cart", web::get().to(get_cart))
            .route("/cart", web::put().to(add_to_cart))
            .route("/cart/{target}", web::delete().to(remove_from_cart))
            .route("/settings", web::get().to(get_settings))
            .route("/settings", web::put().to(update_settings))
            .route("/token", web::put().to(register_token))
            .service(
                web::scope("/scan")
                    .route("/start", web::post().to(start_scan))
                    .route("/stop", web::post().to(stop_scan))
                    .route("/run", web::post().to(run_scan))
                    .route("/status", web::get().to(scan_status)),
            )
            .service(
                web::scope("/maintenance")
                    .route("/reference", web::post().to(refresh_reference))
                    .route("/attributes", web::post().to(refresh_attributes)),
            ),
    )
    .route(
        "/health",
        web::get().to(|| async { HttpResponse::Ok().body("OK") }),
    );
}
