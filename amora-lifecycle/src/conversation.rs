use chrono::{DateTime, Utc};
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};

use crate::engine::{notify, record_transition, Lifecycle, NotificationKind, Outcome};
use crate::models::{
    ConversationState, Match, MatchMessage, MessageKind, NewConversationState, NewMatchMessage,
    TerminalState,
};
use crate::transcript;

const MACHINE: &str = "conversation";

impl Lifecycle {
    /// Create-or-fetch the match's conversation row.
    pub fn ensure_state(&self, m: &Match, now: DateTime<Utc>) -> AppResult<ConversationState> {
        self.store().ensure_conversation(&NewConversationState {
            match_id: m.id,
            user_a_id: m.user_a_id,
            user_b_id: m.user_b_id,
            created_at: now,
        })
    }

    /// Reading a thread may start the receiver's decision window, and enforces
    /// an already lapsed one.
    pub fn open_for_read(
        &self,
        match_id: Uuid,
        requester: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ConversationState> {
        let m = self.authorize(match_id, requester)?;
        let mut state = self.ensure_state(&m, now)?;
        if state.terminal().is_some() {
            return Err(AppError::gone("conversation has ended"));
        }

        if !state.is_active() && state.decision_started_at.is_none() {
            let messages = self.store().list_messages(m.id, transcript::TRANSCRIPT_SCAN_LIMIT)?;
            let initiator = transcript::first_qualifying_sender(&messages);
            if initiator.is_some_and(|sender| sender != requester) {
                let expires_at = now + self.policy().decision_window();
                if self.store().start_decision_timer(m.id, requester, now, expires_at)? {
                    record_transition(MACHINE, "decision_timer_started", m.id);
                }
                state = self.reload_state(m.id)?;
            }
        }

        self.enforce_decision_window(state, now)
    }

    /// Appends a participant message. Active conversations require the
    /// sender to hold enough credit unless the match is grandfathered.
    pub fn send_message(
        &self,
        match_id: Uuid,
        sender: Uuid,
        body: &str,
        now: DateTime<Utc>,
    ) -> AppResult<MatchMessage> {
        let body = body.trim();
        if body.is_empty() {
            return Err(AppError::invalid_argument("message body is required"));
        }
        if body.chars().count() > self.policy().message_max_chars {
            return Err(AppError::invalid_argument("message body is too long"));
        }

        let m = self.authorize(match_id, sender)?;
        let state = self.ensure_state(&m, now)?;
        let state = self.enforce_decision_window(state, now)?;
        if state.terminal().is_some() {
            return Err(AppError::gone("conversation has ended"));
        }

        if state.is_active() && !self.legacy_unlock(m.id, now) {
            self.require_balance(sender, self.policy().active_chat_required_cents, now)?;
        }

        let message = self.store().append_message(&NewMatchMessage {
            id: Uuid::now_v7(),
            match_id: m.id,
            sender_id: sender,
            kind: MessageKind::Text.as_str().to_string(),
            body: Some(body.to_string()),
            created_at: now,
        })?;

        let recipient = m.counterpart(sender);
        if let Err(e) = self.store().set_thread_archived(m.id, recipient, false, now) {
            tracing::warn!(match_id = %m.id, error = %e, "failed to unarchive thread for recipient");
        }

        tracing::debug!(match_id = %m.id, message_id = %message.id, "message appended");
        Ok(message)
    }

    /// Pre-Chat -> Active. Idempotent once active.
    pub fn start_chat(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Outcome<ConversationState>> {
        let m = self.authorize(match_id, user_id)?;
        let state = self.ensure_state(&m, now)?;
        let state = self.enforce_decision_window(state, now)?;
        if state.terminal().is_some() {
            return Err(AppError::gone("conversation has ended"));
        }
        if state.is_active() {
            return Ok(Outcome::new(state));
        }

        if !self.legacy_unlock(m.id, now) {
            self.require_balance(user_id, self.policy().active_chat_required_cents, now)?;
        }

        let mut effects = Vec::new();
        if self.store().mark_active(m.id, now)? {
            record_transition(MACHINE, "activated", m.id);
            effects.push(notify(m.counterpart(user_id), NotificationKind::ChatStarted, m.id));
        }

        Ok(Outcome::with_effects(self.reload_state(m.id)?, effects))
    }

    pub fn end_conversation(
        &self,
        match_id: Uuid,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<ConversationState> {
        let m = self.authorize(match_id, actor)?;
        let state = self.ensure_state(&m, now)?;
        if state.terminal().is_some() {
            return Err(AppError::gone("conversation has ended"));
        }
        if self.store().mark_terminal(m.id, TerminalState::Archived, now, false)? {
            record_transition(MACHINE, "archived", m.id);
        }
        self.reload_state(m.id)
    }

    /// Hides the thread from `user_id`'s inbox until the other side writes again.
    pub fn archive_thread(&self, match_id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let m = self.authorize(match_id, user_id)?;
        if self.store().set_thread_archived(m.id, user_id, true, now)? {
            tracing::info!(match_id = %m.id, user_id = %user_id, "thread archived");
        }
        self.store().is_thread_archived(m.id, user_id)
    }

    /// Restarts the decision window after a date falls through, unless one
    /// is already running or the conversation has moved on.
    pub(crate) fn restore_decision_timer(&self, m: &Match, actor: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let state = self.ensure_state(m, now)?;
        let for_user = state.decision_started_for_user_id.unwrap_or(actor);
        let expires_at = now + self.policy().decision_window();
        if self.store().restart_decision_timer(m.id, for_user, now, expires_at)? {
            record_transition(MACHINE, "decision_timer_restarted", m.id);
        }
        Ok(())
    }

    pub(crate) fn clear_decision_timer(&self, match_id: Uuid) -> AppResult<()> {
        if self.store().clear_decision_timer(match_id)? {
            record_transition(MACHINE, "decision_timer_cleared", match_id);
        }
        Ok(())
    }

    /// Moves a lapsed Pre-Chat conversation to Terminal("expired") and fails Gone.
    fn enforce_decision_window(
        &self,
        state: ConversationState,
        now: DateTime<Utc>,
    ) -> AppResult<ConversationState> {
        if state.terminal().is_some() || state.is_active() {
            return Ok(state);
        }
        let Some(expires_at) = state.decision_expires_at else {
            return Ok(state);
        };
        if now < expires_at {
            return Ok(state);
        }

        if self.store().mark_terminal(state.match_id, TerminalState::Expired, now, true)? {
            record_transition(MACHINE, "expired", state.match_id);
        }
        let current = self.reload_state(state.match_id)?;
        if current.terminal().is_some() {
            return Err(AppError::gone("conversation has expired"));
        }
        // lost to a concurrent start_chat
        Ok(current)
    }

    fn reload_state(&self, match_id: Uuid) -> AppResult<ConversationState> {
        self.store()
            .get_conversation(match_id)?
            .ok_or_else(|| AppError::not_found("match not found"))
    }
}
