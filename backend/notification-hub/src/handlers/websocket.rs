/// WebSocket ingress and fan-out HTTP endpoints
///
/// Subscribers connect on /ws and receive every broadcast notification. The
/// connection is read only to detect closure; nothing the client sends is parsed.
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_ws::{Message, ProtocolError};
use futures::{Stream, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::websocket::{Subscriber, SubscriberRegistry, WsConnection};

/// Why a subscriber's read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    ClosedByPeer,
    ProtocolError,
    StreamEnded,
}

/// Subscribe to notifications
///
/// Endpoint: GET /ws
pub async fn ws_subscribe(
    req: HttpRequest,
    body: web::Payload,
    registry: web::Data<Arc<SubscriberRegistry>>,
) -> ActixResult<HttpResponse> {
    let (response, session, stream) = actix_ws::handle(&req, body)?;

    let conn: Subscriber = Arc::new(WsConnection::new(session));
    registry.add(conn.clone()).await;

    let registry = registry.get_ref().clone();
    // Inbound stream is tied to this worker's runtime
    actix_web::rt::spawn(async move {
        let reason = drain_until_closed(stream).await;
        debug!(?reason, "Subscriber read loop ended");
        registry.remove(&conn).await;
    });

    Ok(response)
}

/// Read inbound frames until the peer goes away
///
/// Data and control frames are discarded; pings are not answered so the
/// broadcast path stays the only writer on the session.
pub async fn drain_until_closed<S>(mut stream: S) -> DisconnectReason
where
    S: Stream<Item = std::result::Result<Message, ProtocolError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(reason)) => {
                debug!(?reason, "Subscriber sent close frame");
                return DisconnectReason::ClosedByPeer;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket protocol error");
                return DisconnectReason::ProtocolError;
            }
        }
    }
    DisconnectReason::StreamEnded
}

/// Get connection metrics
///
/// Endpoint: GET /api/v1/ws/metrics
pub async fn ws_metrics(registry: web::Data<Arc<SubscriberRegistry>>) -> HttpResponse {
    let total_connections = registry.len().await;

    HttpResponse::Ok().json(json!({
        "total_connections": total_connections
    }))
}

/// Broadcast a JSON document to every subscriber
///
/// Endpoint: POST /api/v1/ws/broadcast
pub async fn broadcast_message(
    registry: web::Data<Arc<SubscriberRegistry>>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    serde_json::from_slice::<serde_json::Value>(&body)?;
    let payload = std::str::from_utf8(&body)
        .map_err(|e| AppError::BadRequest(format!("body is not valid UTF-8: {}", e)))?;

    let report = registry.broadcast(payload).await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "attempted": report.attempted,
        "delivered": report.delivered,
        "failed": report.failed
    })))
}

/// Register WebSocket routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_subscribe)).service(
        web::scope("/api/v1/ws")
            .route("/broadcast", web::post().to(broadcast_message))
            .route("/metrics", web::get().to(ws_metrics)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::registry::testing::RecordingConnection;
    use actix_web::{test, App};
    use futures::stream;

    fn frames(
        items: Vec<std::result::Result<Message, ProtocolError>>,
    ) -> impl Stream<Item = std::result::Result<Message, ProtocolError>> + Unpin {
        stream::iter(items)
    }

    #[actix_rt::test]
    async fn test_drain_stops_on_close_frame() {
        let reason = drain_until_closed(frames(vec![
            Ok(Message::Text("subscribe".into())),
            Ok(Message::Ping(Default::default())),
            Ok(Message::Close(None)),
            Ok(Message::Text("never read".into())),
        ]))
        .await;

        assert_eq!(reason, DisconnectReason::ClosedByPeer);
    }

    #[actix_rt::test]
    async fn test_drain_stops_on_protocol_error() {
        let reason = drain_until_closed(frames(vec![
            Ok(Message::Pong(Default::default())),
            Err(ProtocolError::Overflow),
        ]))
        .await;

        assert_eq!(reason, DisconnectReason::ProtocolError);
    }

    #[actix_rt::test]
    async fn test_drain_stops_at_end_of_stream() {
        let reason = drain_until_closed(frames(vec![Ok(Message::Binary(Default::default()))])).await;
        assert_eq!(reason, DisconnectReason::StreamEnded);
    }

    #[actix_rt::test]
    async fn test_ws_metrics_reports_total() {
        let registry = Arc::new(SubscriberRegistry::default());
        registry.add(Arc::new(RecordingConnection::default())).await;
        registry.add(Arc::new(RecordingConnection::default())).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/ws/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["total_connections"], 2);
    }

    #[actix_rt::test]
    async fn test_broadcast_sends_body_verbatim() {
        let registry = Arc::new(SubscriberRegistry::default());
        let conn = Arc::new(RecordingConnection::default());
        registry.add(conn.clone()).await;
        registry.add(Arc::new(RecordingConnection::failing())).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry.clone()))
                .configure(register_routes),
        )
        .await;

        let payload = r#"{"id":"m1","msg":"hi","sender":"bob","ts":"2024-01-01T00:00:00Z"}"#;
        let req = test::TestRequest::post()
            .uri("/api/v1/ws/broadcast")
            .insert_header(("content-type", "application/json"))
            .set_payload(payload)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["attempted"], 2);
        assert_eq!(body["delivered"], 1);
        assert_eq!(body["failed"], 1);
        assert_eq!(conn.frames(), vec![payload.to_string()]);
        assert_eq!(registry.len().await, 1);
    }

    #[actix_rt::test]
    async fn test_broadcast_rejects_invalid_json() {
        let registry = Arc::new(SubscriberRegistry::default());
        let conn = Arc::new(RecordingConnection::default());
        registry.add(conn.clone()).await;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry.clone()))
                .configure(register_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/ws/broadcast")
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        assert!(conn.frames().is_empty());
    }

    #[actix_rt::test]
    async fn test_failed_handshake_registers_nothing() {
        let registry = Arc::new(SubscriberRegistry::default());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(registry.clone()))
                .configure(register_routes),
        )
        .await;

        // Plain GET without upgrade headers
        let req = test::TestRequest::get().uri("/ws").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_client_error());
        assert!(registry.is_empty().await);
    }
}
