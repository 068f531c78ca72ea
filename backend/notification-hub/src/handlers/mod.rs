/// HTTP handlers for the notification hub
pub mod health;
pub mod websocket;

pub use health::{banner, health_check};
pub use websocket::register_routes as register_websocket;
