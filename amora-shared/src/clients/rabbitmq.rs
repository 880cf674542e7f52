use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Consumer,
};
use serde::Serialize;

use crate::types::Event;

const EXCHANGE_NAME: &str = "amora.events";

/// Unacked deliveries a single consumer may hold.
const CONSUMER_PREFETCH: u16 = 32;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("broker rejected event {0}")]
    Nacked(uuid::Uuid),
}

/// AMQP properties for an event: persistent JSON carrying the envelope id,
/// type and correlation so consumers can dedupe without decoding the body.
pub fn properties_for<T: Serialize>(event: &Event<T>) -> BasicProperties {
    let props = BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(2)
        .with_message_id(event.id.to_string().into())
        .with_kind(event.event_type.clone().into())
        .with_app_id(event.source.clone().into())
        .with_timestamp(event.timestamp.timestamp().max(0) as u64);
    match event.correlation_id {
        Some(id) => props.with_correlation_id(id.to_string().into()),
        None => props,
    }
}

/// Topic-exchange client. Publishes wait for the broker confirm.
#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        channel
            .exchange_declare(
                EXCHANGE_NAME,
                lapin::ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        channel.confirm_select(ConfirmSelectOptions::default()).await?;

        tracing::info!(exchange = EXCHANGE_NAME, "connected to RabbitMQ");
        Ok(Self { channel })
    }

    pub async fn publish<T: Serialize>(&self, routing_key: &str, event: &Event<T>) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        let confirmation = self
            .channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties_for(event),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(PublishError::Nacked(event.id));
        }

        tracing::debug!(routing_key = %routing_key, event_id = %event.id, "event published");
        Ok(())
    }

    /// Declare a durable queue bound to `routing_keys` and start consuming
    /// with a bounded prefetch.
    pub async fn subscribe(&self, queue_name: &str, routing_keys: &[&str]) -> Result<Consumer, lapin::Error> {
        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;

        for key in routing_keys {
            self.channel
                .queue_bind(queue_name, EXCHANGE_NAME, key, QueueBindOptions::default(), FieldTable::default())
                .await?;
        }

        self.channel
            .basic_qos(CONSUMER_PREFETCH, BasicQosOptions::default())
            .await?;

        let consumer = self
            .channel
            .basic_consume(
                queue_name,
                &format!("{queue_name}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue = %queue_name, bindings = ?routing_keys, "subscribed to RabbitMQ queue");
        Ok(consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::{payloads, routing_keys};
    use uuid::Uuid;

    #[test]
    fn properties_carry_envelope_metadata() {
        let match_id = Uuid::now_v7();
        let event = Event::new(
            "amora-lifecycle",
            routing_keys::LIFECYCLE_HANDSHAKE_CLOSED,
            payloads::HandshakeClosed { match_id, reason: "unmatched".into() },
        )
        .with_correlation(match_id);

        let props = properties_for(&event);
        assert_eq!(props.delivery_mode(), &Some(2));
        assert_eq!(props.message_id().as_ref().map(|s| s.as_str()), Some(event.id.to_string().as_str()));
        assert_eq!(
            props.correlation_id().as_ref().map(|s| s.as_str()),
            Some(match_id.to_string().as_str())
        );
        assert_eq!(
            props.kind().as_ref().map(|s| s.as_str()),
            Some("amora.lifecycle.handshake.closed")
        );
    }

    #[test]
    fn uncorrelated_events_have_no_correlation_id() {
        let event = Event::new("amora-lifecycle", "amora.test", serde_json::json!({}));
        assert!(properties_for(&event).correlation_id().is_none());
    }
}
