pub mod kafka_consumer;
pub mod normalizer;

pub use kafka_consumer::{
    ConsumerSettings, ConsumerStats, KafkaMessageSource, MessageSource, NotificationConsumer,
};
pub use normalizer::{decode_event, normalize};
