/// Kafka consumer feeding the WebSocket fan-out
///
/// One long-running loop:
/// 1. Poll the next message, bounded by `poll_timeout` so shutdown is noticed
/// 2. On read errors, back off and retry; never exit unless shutting down
/// 3. Extract trace context from headers and open a consumer span under it
/// 4. Normalize `chat.message_posted` events and broadcast them; skip other keys
/// 5. Commit consumed offsets on a timer (at-least-once: a crash before the next
///    commit replays and rebroadcasts those messages)
use crate::config::KafkaConfig;
use crate::error::Result;
use crate::metrics;
use crate::models::QueueMessage;
use crate::services::normalizer::{decode_event, normalize};
use crate::websocket::{BroadcastReport, SubscriberRegistry};
use async_trait::async_trait;
use opentelemetry_config::extract_context;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn, Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Where the consumer loop reads from
///
/// `recv` must be cancel safe: the loop drops it when the poll timeout elapses.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn recv(&self) -> Result<QueueMessage>;

    /// Commit the offsets of every message returned by `recv` so far
    fn commit(&self) -> Result<()>;
}

#[async_trait]
impl<T: MessageSource + ?Sized> MessageSource for Arc<T> {
    async fn recv(&self) -> Result<QueueMessage> {
        (**self).recv().await
    }

    fn commit(&self) -> Result<()> {
        (**self).commit()
    }
}

/// `MessageSource` over an rdkafka consumer-group member
///
/// Auto-commit is off and offsets are stored as messages are handed out, so
/// `commit` flushes exactly what the loop has seen.
pub struct KafkaMessageSource {
    consumer: StreamConsumer,
}

impl KafkaMessageSource {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!(
            brokers = %config.bootstrap_servers(),
            topic = %config.topic,
            group_id = %config.group_id,
            "Initializing Kafka consumer"
        );

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        info!(topic = %config.topic, "Subscribed to Kafka topic");

        Ok(Self { consumer })
    }
}

#[async_trait]
impl MessageSource for KafkaMessageSource {
    async fn recv(&self) -> Result<QueueMessage> {
        let message = self.consumer.recv().await?;
        Ok(to_queue_message(&message))
    }

    fn commit(&self) -> Result<()> {
        self.consumer.commit_consumer_state(CommitMode::Async)?;
        Ok(())
    }
}

fn to_queue_message<M: Message>(message: &M) -> QueueMessage {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| {
                    (
                        header.key.to_string(),
                        header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                    )
                })
                .collect()
        })
        .unwrap_or_default();

    QueueMessage {
        topic: message.topic().to_string(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default(),
        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
        partition: message.partition(),
        offset: message.offset(),
    }
}

/// Loop timing and routing
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub topic: String,
    pub event_key: String,
    pub poll_timeout: Duration,
    pub retry_backoff: Duration,
    pub commit_interval: Duration,
}

impl From<&KafkaConfig> for ConsumerSettings {
    fn from(config: &KafkaConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            event_key: config.event_key.clone(),
            poll_timeout: config.poll_timeout,
            retry_backoff: config.retry_backoff,
            commit_interval: config.commit_interval,
        }
    }
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub broadcast: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub read_errors: u64,
    pub commits: u64,
}

#[derive(Debug)]
enum Outcome {
    Broadcast(BroadcastReport),
    Ignored,
    Malformed,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Broadcast(_) => "broadcast",
            Outcome::Ignored => "ignored",
            Outcome::Malformed => "malformed",
        }
    }
}

pub struct NotificationConsumer<S> {
    source: S,
    registry: Arc<SubscriberRegistry>,
    settings: ConsumerSettings,
}

impl<S: MessageSource> NotificationConsumer<S> {
    pub fn new(source: S, registry: Arc<SubscriberRegistry>, settings: ConsumerSettings) -> Self {
        Self {
            source,
            registry,
            settings,
        }
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Shutdown is only checked between reads; after it fires nothing else is
    /// committed.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!(topic = %self.settings.topic, "Consumer loop starting");

        let mut stats = ConsumerStats::default();
        let mut uncommitted = false;
        let mut last_commit = Instant::now();

        loop {
            if is_shutdown(&shutdown) {
                info!("Shutdown signal received, stopping consumer");
                break;
            }

            match timeout(self.settings.poll_timeout, self.source.recv()).await {
                // Poll window elapsed with nothing to read
                Err(_) => {}
                Ok(Ok(message)) => {
                    stats.received += 1;
                    uncommitted = true;

                    let outcome = self.process(message).await;
                    metrics::record_kafka_message(outcome.label());
                    match outcome {
                        Outcome::Broadcast(_) => stats.broadcast += 1,
                        Outcome::Ignored => stats.ignored += 1,
                        Outcome::Malformed => stats.malformed += 1,
                    }
                }
                Ok(Err(e)) => {
                    if is_shutdown(&shutdown) {
                        info!("Shutdown signal received, stopping consumer");
                        break;
                    }
                    stats.read_errors += 1;
                    metrics::record_kafka_error();
                    error!(
                        error = %e,
                        retry_in_ms = self.settings.retry_backoff.as_millis() as u64,
                        "Kafka read failed"
                    );
                    wait_or_shutdown(&mut shutdown, self.settings.retry_backoff).await;
                    continue;
                }
            }

            if uncommitted && last_commit.elapsed() >= self.settings.commit_interval {
                match self.source.commit() {
                    Ok(()) => {
                        stats.commits += 1;
                        uncommitted = false;
                    }
                    Err(e) => warn!(error = %e, "Failed to commit Kafka offsets"),
                }
                last_commit = Instant::now();
            }
        }

        info!(
            received = stats.received,
            broadcast = stats.broadcast,
            ignored = stats.ignored,
            malformed = stats.malformed,
            read_errors = stats.read_errors,
            commits = stats.commits,
            "Consumer loop stopped"
        );
        stats
    }

    async fn process(&self, message: QueueMessage) -> Outcome {
        let parent_cx = extract_context(&message.headers);

        let span = tracing::info_span!(
            "kafka.process",
            otel.name = %format!("{} process", message.key),
            otel.kind = "consumer",
            otel.status_code = tracing::field::Empty,
            messaging.system = "kafka",
            messaging.operation = "process",
            messaging.destination.name = %message.topic,
            messaging.kafka.message.key = %message.key,
            messaging.kafka.partition = message.partition,
            messaging.kafka.message.offset = message.offset,
        );
        span.set_parent(parent_cx);

        self.dispatch(&message, &span)
            .instrument(span.clone())
            .await
    }

    async fn dispatch(&self, message: &QueueMessage, span: &Span) -> Outcome {
        info!(key = %message.key, offset = message.offset, "Packet received");

        if message.key != self.settings.event_key {
            info!(key = %message.key, "Ignored event key");
            return Outcome::Ignored;
        }

        let event = match decode_event(&message.value) {
            Ok(event) => event,
            Err(e) => {
                span.record("otel.status_code", "ERROR");
                error!(
                    error = %e,
                    raw = %String::from_utf8_lossy(&message.value),
                    "Failed to decode event"
                );
                return Outcome::Malformed;
            }
        };

        let payload = match normalize(&event).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                span.record("otel.status_code", "ERROR");
                error!(error = %e, "Failed to encode notification");
                return Outcome::Malformed;
            }
        };

        let report = self.registry.broadcast(&payload).await;
        info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "Notification broadcast"
        );
        Outcome::Broadcast(report)
    }
}

/// Set, or the sender is gone and can never set it
fn is_shutdown(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) {
    tokio::select! {
        _ = sleep(delay) => {}
        _ = shutdown.changed() => {}
    }
}
