/// WebSocket real-time notification fan-out
///
/// Architecture:
/// 1. SubscriberRegistry: the set of live connections, with add/remove/broadcast
/// 2. WsConnection: actix-ws session exposed as a SubscriberConnection
/// 3. Read-detection loops (handlers::websocket) remove connections on disconnect

pub mod registry;
pub mod session;

pub use registry::{
    BroadcastReport, ConnectionError, Subscriber, SubscriberConnection, SubscriberRegistry,
};
pub use session::WsConnection;
