use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_session_api::{config::Config, services::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quiz_session_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri).await?;
    let redis_client = redis::Client::open(config.redis_uri.clone())?;

    let app_state = AppState::new(config, mongo_client, redis_client).await?;

    // Cron-style single run
    if std::env::var("WRITE_BACK_ONCE").is_ok_and(|v| v == "1" || v == "true") {
        let report = app_state.write_back.flush_cycle().await?;
        tracing::info!(?report, "Single write-back cycle finished");
        return Ok(());
    }

    app_state.write_back.run().await;

    Ok(())
}
