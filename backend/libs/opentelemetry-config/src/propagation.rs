//! Trace context propagation over Kafka message headers
//!
//! Kafka headers are an ordered list of `(key, bytes)` pairs and may repeat a key.
//! [`HeaderExtractor`] and [`HeaderInjector`] expose that list through the
//! OpenTelemetry carrier traits so any text-map propagator can read or write
//! `traceparent`, `tracestate` and `baggage`.

use opentelemetry::{
    global,
    propagation::{Extractor, Injector, TextMapCompositePropagator, TextMapPropagator},
    Context,
};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

/// Owned Kafka header list, in wire order
pub type KafkaHeaders = Vec<(String, Vec<u8>)>;

/// W3C TraceContext + W3C Baggage, the propagator installed process-wide
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Read-side carrier over a Kafka header list
///
/// Producers that serialize headers through a JSON encoder sometimes wrap the
/// value in quotes (`"\"00-...-01\""`); one surrounding pair is stripped.
pub struct HeaderExtractor<'a>(pub &'a [(String, Vec<u8>)]);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, value)| std::str::from_utf8(value).ok())
            .map(unquote)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// Write-side carrier over a Kafka header list; `set` appends
pub struct HeaderInjector<'a>(pub &'a mut KafkaHeaders);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.push((key.to_string(), value.into_bytes()));
    }
}

/// Strip exactly one pair of surrounding double quotes, if present.
pub fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Extract the remote context carried by `headers` using the global propagator
pub fn extract_context(headers: &[(String, Vec<u8>)]) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Inject `cx` into `headers` using the global propagator
pub fn inject_context(cx: &Context, headers: &mut KafkaHeaders) {
    global::get_text_map_propagator(|propagator| {
        propagator.inject_context(cx, &mut HeaderInjector(headers))
    });
}
