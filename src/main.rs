//! CGM session server
//!
//! Runs one glucose monitoring session and exposes it over REST and
//! WebSocket for a front-end.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cgm_sim::alerts::TracingNotifier;
use cgm_sim::config::Settings;
use cgm_sim::controller::CgmController;
use cgm_sim::handlers;
use cgm_sim::store::{JsonFileStore, NullStore, Store};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cgm_sim=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);

    info!("Starting CGM session server");
    info!("Binding server to {}", bind_address);

    let store: Arc<dyn Store> = match &settings.store.path {
        Some(path) => {
            info!(path = %path, "Persisting session state to disk");
            Arc::new(JsonFileStore::new(path))
        }
        None => Arc::new(NullStore),
    };

    let controller = CgmController::new(&settings, store, Arc::new(TracingNotifier));
    controller.restore().await;

    if settings.simulation.auto_connect {
        controller.spawn_auto_connect();
    }

    // ---------------------------------------------------------------------
    // HTTP + WebSocket server
    // ---------------------------------------------------------------------
    let app_settings = settings.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(controller.clone()))
            .app_data(web::Data::new(app_settings.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await?;

    Ok(())
}
