use actix_web::HttpResponse;
use serde_json::json;

/// Endpoint: GET /health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "notification"
    }))
}

/// Endpoint: GET /
pub async fn banner() -> &'static str {
    "Notification Hub v1.0"
}
