use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `amora.{domain}.{entity}.{action}`
/// Example: `amora.lifecycle.notification.requested`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Matching events (consumed)
    pub const MATCHING_MATCH_CREATED: &str = "amora.matching.match.created";
    pub const MATCHING_MATCH_REMOVED: &str = "amora.matching.match.removed";

    // User events (consumed)
    pub const USER_BLOCK_CREATED: &str = "amora.user.block.created";

    // Lifecycle events (published)
    pub const LIFECYCLE_NOTIFICATION_REQUESTED: &str = "amora.lifecycle.notification.requested";
    pub const LIFECYCLE_HANDSHAKE_CLOSED: &str = "amora.lifecycle.handshake.closed";
}

/// Common event data payloads
pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub match_id: Uuid,
        pub user_a_id: Uuid,
        pub user_b_id: Uuid,
        pub created_at: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchRemoved {
        pub match_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockCreated {
        pub blocker_id: Uuid,
        pub blocked_id: Uuid,
    }

    /// Fire-and-forget push request; `kind` is e.g. `drink_ready` or `date_accepted`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NotificationRequested {
        pub to_user_id: Uuid,
        pub kind: String,
        pub match_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HandshakeClosed {
        pub match_id: Uuid,
        pub reason: String,
    }
}
