//! WebSocket ingress against a live server

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use awc::{ws, Client};
use futures::{SinkExt, StreamExt};
use notification_hub::handlers::register_websocket;
use notification_hub::SubscriberRegistry;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

async fn start_server(
    registry: Arc<SubscriberRegistry>,
) -> std::io::Result<(SocketAddr, ServerHandle)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(registry.clone()))
            .configure(register_websocket)
    })
    .workers(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    actix_rt::spawn(server);
    Ok((addr, handle))
}

async fn wait_for_members(registry: &SubscriberRegistry, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while registry.len().await != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("registry never reached {} members", expected));
}

#[actix_rt::test]
async fn test_subscriber_is_registered_then_removed_on_close() {
    let registry = Arc::new(SubscriberRegistry::default());
    let (addr, handle) = start_server(registry.clone())
        .await
        .expect("start websocket server");

    let (_resp, mut connection) = Client::new()
        .ws(format!("http://{addr}/ws"))
        .connect()
        .await
        .expect("connect websocket client");

    assert_eq!(registry.len().await, 1);

    connection
        .send(ws::Message::Close(None))
        .await
        .expect("send close frame");

    wait_for_members(&registry, 0).await;
    handle.stop(true).await;
}

#[actix_rt::test]
async fn test_broadcast_reaches_connected_client() {
    let registry = Arc::new(SubscriberRegistry::new(Some(Duration::from_secs(1))));
    let (addr, handle) = start_server(registry.clone())
        .await
        .expect("start websocket server");

    let (_resp, mut connection) = Client::new()
        .ws(format!("http://{addr}/ws"))
        .connect()
        .await
        .expect("connect websocket client");

    // Inbound frames are drained and ignored
    connection
        .send(ws::Message::Text("subscribe".into()))
        .await
        .expect("send text frame");

    let payload = r#"{"id":"m1","msg":"hi","sender":"bob","ts":"2024-01-01T00:00:00Z"}"#;
    let report = registry.broadcast(payload).await;
    assert_eq!(report.delivered, 1);

    let frame = timeout(Duration::from_secs(2), connection.next())
        .await
        .expect("frame in time")
        .expect("frame")
        .expect("frame data");
    match frame {
        ws::Frame::Text(bytes) => assert_eq!(&bytes[..], payload.as_bytes()),
        other => panic!("unexpected frame: {other:?}"),
    }

    assert_eq!(registry.len().await, 1);
    handle.stop(true).await;
}

#[actix_rt::test]
async fn test_dropped_client_is_removed() {
    let registry = Arc::new(SubscriberRegistry::default());
    let (addr, handle) = start_server(registry.clone())
        .await
        .expect("start websocket server");

    let (_resp, connection) = Client::new()
        .ws(format!("http://{addr}/ws"))
        .connect()
        .await
        .expect("connect websocket client");
    wait_for_members(&registry, 1).await;

    drop(connection);

    wait_for_members(&registry, 0).await;
    handle.stop(true).await;
}
