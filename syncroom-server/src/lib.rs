mod context;
mod errors;
mod gateway;
mod rooms;

use std::{
    env,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use log::info;
use syncroom_collab::Collab;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::*;
pub use errors::*;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;
/// The default address the server will listen on, every interface.
pub const DEFAULT_HOST: &str = "0.0.0.0";

pub type Router = axum::Router<ServerContext>;

/// Starts the syncroom server, running until it fails
pub async fn run_server(collab: Collab) -> ServerResult<()> {
    let addr = parse_address(
        env::var("SYNCROOM_SERVER_HOST").ok(),
        env::var("SYNCROOM_SERVER_PORT").ok(),
    )?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let context = ServerContext {
        collab: Arc::new(collab),
    };

    let version_one_router = Router::new()
        .merge(gateway::router())
        .merge(rooms::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    info!("Listening on {}", addr);

    axum::serve(listener, root_router)
        .await
        .map_err(ServerError::Serve)
}

fn parse_address(host: Option<String>, port: Option<String>) -> ServerResult<SocketAddr> {
    let port = match port {
        Some(port) => port
            .parse::<u16>()
            .map_err(|_| ServerError::InvalidPort(port))?,
        None => DEFAULT_PORT,
    };

    let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let ip = host
        .parse::<IpAddr>()
        .map_err(|_| ServerError::InvalidHost(host))?;

    Ok(SocketAddr::new(ip, port))
}
