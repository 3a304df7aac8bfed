//! socket-router demo server.
//!
//! Serves a small application with one plain page and two socket
//! endpoints:
//!
//! ```text
//! GET /             index page listing the socket urls
//! WS  /echo         echoes every text and binary frame
//! WS  /rooms/<id>   greets, then echoes frames tagged with the room id
//! ```

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use socket_router::config::{self, validate_config, AppConfig, ConfigError};
use socket_router::context::url_for;
use socket_router::lifecycle::{shutdown_on_signal, Shutdown};
use socket_router::observability::{logging, metrics};
use socket_router::{
    App, AppService, BuildOptions, HandlerError, HandlerRequest, RouteOptions, RoutingError,
    SocketDispatch, SocketServer, Sockets, Values,
};

#[derive(Debug, Parser)]
#[command(name = "socket-router", version, about = "Websocket routing demo server")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init(&config.observability)?;
    tracing::info!("socket-router v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server_config = config.server.clone();
    let service = build_app(config)?;

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    SocketServer::new(service, &server_config)
        .run(listener, shutdown.subscribe())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn build_app(config: AppConfig) -> Result<SocketDispatch<AppService>, RoutingError> {
    let mut app = App::new(config);
    let mut sockets = Sockets::new();

    app.route("/", index)?;
    sockets.route(&mut app, "/echo", echo)?;
    sockets.add_url_rule(&mut app, "/rooms/<id>", Some("rooms"), room, RouteOptions::new())?;

    Ok(sockets.init_app(app))
}

async fn index(_req: HandlerRequest) -> Result<Html<String>, HandlerError> {
    let options = BuildOptions::default();
    let echo = url_for("echo", &Values::new(), &options)?;
    let lobby = url_for("rooms", &Values::from([("id".to_string(), json!("lobby"))]), &options)?;

    Ok(Html(format!(
        "<h1>socket-router</h1>\n<ul>\n<li>echo: <code>{echo}</code></li>\n<li>lobby: <code>{lobby}</code></li>\n</ul>\n"
    )))
}

fn upgrade_required() -> Response {
    (StatusCode::UPGRADE_REQUIRED, "This endpoint speaks websocket").into_response()
}

async fn echo(mut req: HandlerRequest) -> Result<Response, HandlerError> {
    let Some(connection) = req.take_socket() else {
        return Ok(upgrade_required());
    };

    let mut stream = connection.into_websocket().await?;
    while let Some(message) = stream.next().await {
        match message? {
            message @ (Message::Text(_) | Message::Binary(_)) => stream.send(message).await?,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(StatusCode::OK.into_response())
}

async fn room(mut req: HandlerRequest) -> Result<Response, HandlerError> {
    let Some(connection) = req.take_socket() else {
        return Ok(upgrade_required());
    };
    let room = req.param_str("id").unwrap_or_default();

    let mut stream = connection.into_websocket().await?;
    stream
        .send(Message::text(format!("joined {room}")))
        .await?;

    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                stream
                    .send(Message::text(format!("[{room}] {}", text.as_str())))
                    .await?
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    tracing::debug!(room = %room, "Left room");
    Ok(StatusCode::OK.into_response())
}
