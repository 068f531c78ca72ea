/// Subscriber Registry
///
/// The set of live subscriber connections, shared between the ingress handlers
/// (which add and remove members) and the Kafka consumer (which broadcasts).
///
/// Locking discipline:
/// - `add` / `remove` take the write lock only to mutate the set and publish
///   the new size to the subscriber gauge
/// - `broadcast` takes the read lock only to copy the set, then writes outside it
/// - closing a connection never happens under the lock
///
/// Only `broadcast` writes to a connection, so each connection has a single
/// writer without a per-connection lock.
use crate::metrics;
use prometheus::IntGauge;
use async_trait::async_trait;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// An open duplex channel to one subscriber
#[async_trait]
pub trait SubscriberConnection: Send + Sync {
    /// Write one text frame
    async fn send_text(&self, payload: &str) -> Result<(), ConnectionError>;

    /// Release the connection; must tolerate being called on a dead connection
    async fn close(&self);
}

/// Shared handle to a subscriber. Identity is the allocation it points to.
pub type Subscriber = Arc<dyn SubscriberConnection>;

/// Set member keyed by pointer identity
#[derive(Clone)]
struct Member(Subscriber);

impl Member {
    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

/// Outcome of one broadcast call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members in the snapshot
    pub attempted: usize,
    pub delivered: usize,
    /// Members removed because their write failed
    pub failed: usize,
}

pub struct SubscriberRegistry {
    connections: RwLock<HashSet<Member>>,
    write_timeout: Option<Duration>,
    /// Tracks the set size; only written while the write lock is held
    gauge: IntGauge,
}

impl SubscriberRegistry {
    /// Create a registry whose writes are bounded by `write_timeout`
    pub fn new(write_timeout: Option<Duration>) -> Self {
        Self::with_gauge(write_timeout, metrics::connected_subscribers())
    }

    /// Same as [`SubscriberRegistry::new`], reporting its size to `gauge`
    pub fn with_gauge(write_timeout: Option<Duration>, gauge: IntGauge) -> Self {
        Self {
            connections: RwLock::new(HashSet::new()),
            write_timeout,
            gauge,
        }
    }

    /// Register a connection. Adding the same connection twice is a no-op.
    pub async fn add(&self, conn: Subscriber) {
        let (inserted, total) = {
            let mut connections = self.connections.write().await;
            let inserted = connections.insert(Member(conn));
            self.gauge.set(connections.len() as i64);
            (inserted, connections.len())
        };

        if inserted {
            info!(total, "Client connected");
        }
    }

    /// Unregister and close a connection.
    ///
    /// Returns `false` without closing anything if the connection was not registered.
    pub async fn remove(&self, conn: &Subscriber) -> bool {
        let member = Member(conn.clone());
        let (removed, total) = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(&member);
            if removed {
                self.gauge.set(connections.len() as i64);
            }
            (removed, connections.len())
        };

        if !removed {
            return false;
        }

        conn.close().await;
        info!(total, "Client disconnected");
        true
    }

    /// Deliver `payload` to every connection registered at snapshot time.
    ///
    /// Connections whose write fails are removed; the rest still receive the
    /// payload. Connections added while the broadcast is in flight may or may not
    /// receive it.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let snapshot: Vec<Subscriber> = {
            let connections = self.connections.read().await;
            connections.iter().map(|m| m.0.clone()).collect()
        };

        let mut report = BroadcastReport {
            attempted: snapshot.len(),
            ..BroadcastReport::default()
        };
        debug!(count = report.attempted, "Broadcasting message to clients");

        for conn in snapshot {
            match self.write(&conn, payload).await {
                Ok(()) => {
                    report.delivered += 1;
                    metrics::record_broadcast_write(true);
                }
                Err(e) => {
                    warn!(error = %e, "Error broadcasting to client");
                    metrics::record_broadcast_write(false);
                    if self.remove(&conn).await {
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }

    async fn write(&self, conn: &Subscriber, payload: &str) -> Result<(), ConnectionError> {
        match self.write_timeout {
            Some(deadline) => tokio::time::timeout(deadline, conn.send_text(payload))
                .await
                .map_err(|_| ConnectionError::Timeout(deadline))?,
            None => conn.send_text(payload).await,
        }
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Whether this exact connection is registered
    pub async fn contains(&self, conn: &Subscriber) -> bool {
        self.connections
            .read()
            .await
            .contains(&Member(conn.clone()))
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}
