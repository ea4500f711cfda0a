mod config;
mod message;
mod rate_limit;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env().expect("invalid configuration");
    if config.admin_password.is_none() {
        tracing::warn!("ADMIN_PASSWORD not set; admin import disabled");
    }
    let addr = config.bind_addr();

    let state = state::AppState::new(config);
    tracing::info!(
        width = state.grid.width(),
        height = state.grid.height(),
        colors = ?state.grid.palette().colors().collect::<Vec<_>>(),
        rate_limit_ms = state.rate_limiter.min_interval().as_millis(),
        "canvas ready"
    );
    services::persistence::restore_latest(&state).await;

    // Spawn background persistence task.
    let _persistence = services::persistence::spawn_persistence_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    tracing::info!(%addr, "griddy listening");
    axum::serve(listener, app).await.expect("server failed");
}
