//! End to end: real listener, websocket client and HTTP client.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use socket_router::config::AppConfig;
use socket_router::context::url_for;
use socket_router::{
    App, BuildOptions, HandlerError, HandlerRequest, RouteOptions, Shutdown, SocketServer,
    Sockets, Values,
};

async fn index(_req: HandlerRequest) -> Result<String, HandlerError> {
    let room = url_for(
        "rooms",
        &Values::from([("id".to_string(), json!("lobby"))]),
        &BuildOptions::default(),
    )?;
    Ok(room)
}

async fn rooms(mut req: HandlerRequest) -> Result<&'static str, HandlerError> {
    let Some(connection) = req.take_socket() else {
        return Ok("not a socket");
    };
    let room = req.param_str("id").unwrap_or_default();

    let mut stream = connection.into_websocket().await?;
    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                stream
                    .send(Message::text(format!("{room}: {}", text.as_str())))
                    .await?
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok("")
}

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<std::io::Result<()>>,
}

async fn start() -> Running {
    let mut config = AppConfig::default();
    config.server.shutdown_grace_secs = 1;
    let server_config = config.server.clone();

    let mut app = App::new(config);
    app.route("/", index).unwrap();
    let mut sockets = Sockets::new();
    sockets
        .add_url_rule(&mut app, "/rooms/<id>", None, rooms, RouteOptions::new())
        .unwrap();
    let service = sockets.init_app(app);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = SocketServer::new(service, &server_config);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    Running {
        addr,
        shutdown,
        handle,
    }
}

async fn stop(running: Running) {
    running.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), running.handle)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_websocket_session_end_to_end() {
    let running = start().await;

    let url = format!("ws://{}/rooms/lobby", running.addr);
    let (mut client, response) = connect_async(url).await.unwrap();
    assert_eq!(response.status().as_u16(), 101);

    client.send(Message::text("hi")).await.unwrap();
    let reply = client.next().await.unwrap().unwrap();
    assert_eq!(reply, Message::text("lobby: hi"));

    client.close(None).await.unwrap();
    drop(client);
    stop(running).await;
}

#[tokio::test]
async fn test_plain_request_end_to_end() {
    let running = start().await;

    let response = reqwest::get(format!("http://{}/", running.addr))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.text().await.unwrap(),
        format!("ws://{}/rooms/lobby", running.addr)
    );

    let plain_room = reqwest::get(format!("http://{}/rooms/lobby", running.addr))
        .await
        .unwrap();
    assert_eq!(plain_room.text().await.unwrap(), "not a socket");

    stop(running).await;
}

#[tokio::test]
async fn test_bad_handshake_is_rejected() {
    let running = start().await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/rooms/lobby", running.addr))
        .header("upgrade", "websocket")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    stop(running).await;
}

#[tokio::test]
async fn test_unrouted_socket_is_closed() {
    let running = start().await;

    let url = format!("ws://{}/nowhere", running.addr);
    let (mut client, _) = connect_async(url).await.unwrap();
    let next = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("connection closes");
    assert!(!matches!(next, Some(Ok(Message::Text(_)))));

    drop(client);
    stop(running).await;
}
