use std::sync::Arc;

use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};

use crate::config::Policy;
use crate::models::Match;
use crate::store::LifecycleStore;

/// Push kinds requested from the notification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    DrinkReady,
    DateProposed,
    DateAccepted,
    DateDeclined,
    DateCancelled,
    ChatStarted,
    DrinkRedeemed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DrinkReady => "drink_ready",
            Self::DateProposed => "date_proposed",
            Self::DateAccepted => "date_accepted",
            Self::DateDeclined => "date_declined",
            Self::DateCancelled => "date_cancelled",
            Self::ChatStarted => "chat_started",
            Self::DrinkRedeemed => "drink_redeemed",
        }
    }
}

/// Work that must happen after a transition has been persisted. Delivery is
/// best-effort; the stored state is authoritative.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Notify {
        to: Uuid,
        kind: NotificationKind,
        match_id: Uuid,
    },
    CloseHandshake {
        match_id: Uuid,
        reason: &'static str,
    },
}

#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub effects: Vec<Effect>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self { value, effects: Vec::new() }
    }

    pub fn with_effects(value: T, effects: Vec<Effect>) -> Self {
        Self { value, effects }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRemovalReason {
    Declined,
    Cancelled,
    Expired,
    Unmatched,
}

impl DateRemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declined => "date_declined",
            Self::Cancelled => "date_cancelled",
            Self::Expired => "date_expired",
            Self::Unmatched => "unmatched",
        }
    }
}

/// Raised by the date plan machine and consumed by the drink perk machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateEvent {
    /// The plan left `none`.
    Activated { match_id: Uuid },
    /// The plan went away without the date being completed.
    Removed { match_id: Uuid, reason: DateRemovalReason },
}

/// Entry point for every lifecycle operation. Cheap to clone.
#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn LifecycleStore>,
    policy: Policy,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn LifecycleStore>, policy: Policy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &dyn LifecycleStore {
        self.store.as_ref()
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Loads the match for a participant. Absent match, outsider and blocked
    /// pair all produce the same NotFound.
    pub fn authorize(&self, match_id: Uuid, requester: Uuid) -> AppResult<Match> {
        let not_found = || AppError::not_found("match not found");

        let m = self.store.get_match(match_id)?.ok_or_else(not_found)?;
        if !m.involves(requester) {
            return Err(not_found());
        }
        if self.store.is_blocked(m.user_a_id, m.user_b_id)? {
            return Err(not_found());
        }
        Ok(m)
    }
}

pub(crate) fn record_transition(machine: &'static str, transition: &'static str, match_id: Uuid) {
    metrics::counter!(
        "lifecycle_transitions_total",
        "machine" => machine,
        "transition" => transition
    )
    .increment(1);
    tracing::info!(match_id = %match_id, machine, transition, "lifecycle transition");
}

pub(crate) fn notify(to: Uuid, kind: NotificationKind, match_id: Uuid) -> Effect {
    Effect::Notify { to, kind, match_id }
}
