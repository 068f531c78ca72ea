use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use notification_hub::{
    handlers::{banner, health_check, register_websocket},
    metrics, AppError, Config, ConsumerSettings, KafkaMessageSource, NotificationConsumer,
    SubscriberRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long to wait for the consumer loop after the HTTP server stops
const CONSUMER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    if let Err(e) = opentelemetry_config::init_tracing(&config.app.service_name, config.tracing.clone())
    {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    tracing::info!(
        service = %config.app.service_name,
        env = %config.app.env,
        "Starting notification hub"
    );

    let registry = Arc::new(SubscriberRegistry::new(config.websocket.write_timeout));
    tracing::info!(
        write_timeout_ms = config
            .websocket
            .write_timeout
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0),
        "Subscriber registry initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer_handle = if config.kafka.brokers.is_empty() {
        tracing::warn!("KAFKA_BROKERS is empty; Kafka consumer not started");
        None
    } else {
        let source =
            KafkaMessageSource::new(&config.kafka).context("Failed to create Kafka consumer")?;
        let consumer = NotificationConsumer::new(
            source,
            registry.clone(),
            ConsumerSettings::from(&config.kafka),
        );
        Some(tokio::spawn(consumer.run(shutdown_rx)))
    };

    let addr = (config.app.host.clone(), config.app.port);
    tracing::info!("Starting HTTP server on {}:{}", addr.0, addr.1);

    let http_registry = registry.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(http_registry.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(health_check))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/", web::get().to(banner))
            .configure(register_websocket)
    })
    .bind(&addr)
    .map_err(|e| AppError::StartServer(format!("{}:{}: {}", addr.0, addr.1, e)))?
    .run()
    .await
    .context("HTTP server error")?;

    tracing::info!("HTTP server stopped, shutting down consumer");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = consumer_handle {
        match tokio::time::timeout(CONSUMER_SHUTDOWN_GRACE, handle).await {
            Ok(Ok(stats)) => tracing::info!(?stats, "Consumer stopped"),
            Ok(Err(e)) => tracing::error!(error = %e, "Consumer task failed"),
            Err(_) => tracing::warn!("Consumer did not stop within grace period"),
        }
    }

    opentelemetry_config::shutdown_tracing();
    Ok(())
}
