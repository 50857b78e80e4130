mod error;
mod metrics;
mod routes;
mod state;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use rmap_core::{Config, Resource};
use state::{AppState, SharedState};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(name = "rmap-service")]
#[command(about = "HTTP service fronting the resource resolution core")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Path to a TOML configuration file; defaults built in if omitted
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// JSON file of resources to seed the in-memory mount with on startup
    #[arg(long)]
    seed: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let resources: Vec<Resource> = match &args.seed {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let state: SharedState = Arc::new(AppState::new(config, resources.clone()));
    state.map_entries.initialize(&resources, Vec::new());

    let query_routes = Router::new()
        .route("/resolve", post(routes::resolve))
        .route("/map", post(routes::map));

    let admin_routes = Router::new().route("/refresh", post(routes::refresh));

    let ops_routes = Router::new()
        .route("/status", get(routes::status))
        .route("/metrics", get(metrics::metrics));

    let app = Router::new()
        .merge(query_routes)
        .merge(admin_routes)
        .merge(ops_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", args.bind, args.port);
    tracing::info!(%addr, "rmap-service listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
