//! Main entry point for the Campsite Tracker backend server.
//! Wires the catalog, the booking platform transport and the discovery
//! scheduler together and serves the REST façade.

use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use campsite_discovery::*;
use catalog_db::database::{DEFAULT_DATABASE_URL, create_connection_pool, test_connection};
use notification_services::{FcmPushSender, LogPushSender, PushConfig, PushSender};
use reservation_api::{HttpTransport, TransportConfig};
use web_handlers::configure_routes;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

fn push_sender() -> Arc<dyn PushSender> {
    let Some(config) = PushConfig::from_env() else {
        log::warn!("🔕 FCM_ENDPOINT or FCM_BEARER_TOKEN not set, notifications will only be logged");
        return Arc::new(LogPushSender::new());
    };

    match FcmPushSender::new(config) {
        Ok(sender) => {
            log::info!("📱 Push notification service initialized successfully");
            Arc::new(sender)
        }
        Err(e) => {
            log::error!("❌ Failed to initialize push notifications: {}", e);
            Arc::new(LogPushSender::new())
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting campsite tracker server...");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let pool = match create_connection_pool(&database_url).await {
        Ok(pool) => {
            log::info!("🗃️ Catalog opened at {}", database_url);

            if let Err(e) = test_connection(&pool).await {
                log::error!("❌ Catalog connection test failed: {}", e);
            }
            pool
        }
        Err(e) => {
            log::error!("❌ Failed to open catalog {}: {}", database_url, e);
            std::process::exit(1);
        }
    };
    let catalog = Catalog::new(pool);

    let config = DiscoveryConfig::from_env();
    let transport = HttpTransport::new(TransportConfig::from_env())
        .context("failed to build the booking platform client")?;
    if !transport.warm_up().await {
        log::warn!("⚠️ Session warm-up failed, continuing without cookies");
    }
    let client = ProbeClient::new(Arc::new(transport), &config);

    let store = Arc::new(
        ResultStore::load(catalog.clone())
            .await
            .context("failed to load the published result")?,
    );
    let discovery = Discovery::new(catalog, client, config, store, Some(push_sender()));

    let service = TrackerService::new(Scheduler::new(Arc::new(discovery)));
    service.start().await;

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    log::info!("🌐 Server will be available at: http://{}", bind_addr);

    let shutdown = service.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run()
    .await?;

    shutdown.stop().await;
    log::info!("👋 Server stopped");
    Ok(())
}
