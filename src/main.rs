use reelkeeper::{
    app::{self, serve},
    config::AppConfig,
    rate_limit::SWEEP_EVERY,
    state::AppState,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "reelkeeper=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let state = AppState::init(config).await?;
    let shutdown = CancellationToken::new();

    // Evict idle rate-limiter entries until shutdown.
    {
        let limiter = state.rate_limiter.clone();
        let stop = shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_EVERY);
            loop {
                tokio::select! {
                    _ = interval.tick() => limiter.sweep().await,
                    _ = stop.cancelled() => break,
                }
            }
        });
    }

    {
        let stop = shutdown.clone();
        tokio::spawn(async move {
            app::shutdown_signal().await;
            tracing::info!("shutdown signal received");
            stop.cancel();
        });
    }

    serve(state, shutdown).await
}
