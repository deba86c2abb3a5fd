use std::sync::Arc;
use opentelemetry::trace::TracerProvider as _;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use quiz_session_api::{config::Config, create_router, services::AppState, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tracer_provider = telemetry::init_telemetry()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quiz_session_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer(telemetry::SERVICE_NAME)),
        )
        .init();

    tracing::info!("Starting quiz session API");

    let config = Config::load()?;
    tracing::info!(
        "Configuration loaded for environment: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string())
    );

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
    tracing::info!("MongoDB client created");

    let redis_client = redis::Client::open(config.redis_uri.clone())?;

    let app_state = Arc::new(AppState::new(config, mongo_client, redis_client).await?);

    if app_state.config.write_back.run_in_api {
        let state = app_state.clone();
        tokio::spawn(async move {
            state.write_back.run().await;
        });
    }

    let bind_addr = app_state.config.server.bind_addr.clone();
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = telemetry::shutdown_telemetry(&tracer_provider) {
        tracing::error!("{:#}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
