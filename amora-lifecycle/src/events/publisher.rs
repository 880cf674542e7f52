use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::engine::Effect;

const SOURCE: &str = "amora-lifecycle";

/// Converts an effect into the event it publishes as.
pub fn routing_for(effect: &Effect) -> &'static str {
    match effect {
        Effect::Notify { .. } => routing_keys::LIFECYCLE_NOTIFICATION_REQUESTED,
        Effect::CloseHandshake { .. } => routing_keys::LIFECYCLE_HANDSHAKE_CLOSED,
    }
}

/// Publishes effects after their transition has been stored. Failures are
/// logged and dropped.
pub async fn dispatch(rabbitmq: &RabbitMQClient, effects: Vec<Effect>) {
    for effect in effects {
        let routing_key = routing_for(&effect);
        let result = match effect {
            Effect::Notify { to, kind, match_id } => {
                let event = Event::new(
                    SOURCE,
                    routing_key,
                    payloads::NotificationRequested {
                        to_user_id: to,
                        kind: kind.as_str().to_string(),
                        match_id,
                    },
                )
                .with_user(to)
                .with_correlation(match_id);
                rabbitmq.publish(routing_key, &event).await
            }
            Effect::CloseHandshake { match_id, reason } => {
                let event = Event::new(
                    SOURCE,
                    routing_key,
                    payloads::HandshakeClosed { match_id, reason: reason.to_string() },
                )
                .with_correlation(match_id);
                rabbitmq.publish(routing_key, &event).await
            }
        };

        if let Err(e) = result {
            tracing::error!(error = %e, routing_key, "failed to publish lifecycle event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NotificationKind;
    use uuid::Uuid;

    #[test]
    fn effects_route_to_their_topics() {
        let match_id = Uuid::from_u128(42);
        let notify = Effect::Notify { to: Uuid::from_u128(1), kind: NotificationKind::DrinkReady, match_id };
        let close = Effect::CloseHandshake { match_id, reason: "date_cancelled" };

        assert_eq!(routing_for(&notify), "amora.lifecycle.notification.requested");
        assert_eq!(routing_for(&close), "amora.lifecycle.handshake.closed");
    }
}
