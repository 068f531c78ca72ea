use super::registry::{ConnectionError, SubscriberConnection};
use actix_ws::Session;
use async_trait::async_trait;

/// A subscriber backed by an actix-ws session
///
/// `Session` is a cheap handle over the outbound frame queue; each call works on
/// its own clone, so no lock is held across the write.
pub struct WsConnection {
    session: Session,
}

impl WsConnection {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SubscriberConnection for WsConnection {
    async fn send_text(&self, payload: &str) -> Result<(), ConnectionError> {
        let mut session = self.session.clone();
        session
            .text(payload.to_owned())
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&self) {
        // Already closed by the peer is fine
        let _ = self.session.clone().close(None).await;
    }
}
