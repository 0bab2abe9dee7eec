use multiplex_stats::quilt::{HeroQuilt, PosterClient, QuiltConfig};
use multiplex_stats::{load_data, router, AppConfig, AppState};
use std::net::SocketAddr;
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env();
    if let Some(parent) = config.data_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let data = load_data(&config.data_path).await;
    let quilt = match &config.poster_url {
        Some(url) => HeroQuilt::load(QuiltConfig::default(), &PosterClient::new(url.as_str())).await,
        None => HeroQuilt::new(QuiltConfig::default()),
    };
    let state = AppState::with_quilt(config.data_path.clone(), data, quilt);
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
