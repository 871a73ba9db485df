mod config;
mod frame;
mod routes;
mod services;
mod state;

use config::ServerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid server configuration");
            std::process::exit(2);
        }
    };
    let addr = config.listen_addr();
    if let Some(dir) = &config.gallery_dir {
        tracing::info!(dir = %dir.display(), "serving snapshot gallery");
    }

    let state = state::AppState::new(config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, "voxel room server listening");
    axum::serve(listener, app).await.expect("server failed");
}
