//! Persistence for the lifecycle engines.
//!
//! Every mutating method is a conditional write: it only applies when the row
//! is still in the state the caller expects, and reports whether it applied.
//! Callers that lose a race re-read the row instead of failing.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use amora_shared::errors::AppResult;

use crate::models::{
    ConversationState, DatePlan, DatePlanChanges, DateStatus, DrinkPerk, DrinkPerkChanges,
    Match, MatchMessage, NewBlock, NewConversationState, NewDatePlan, NewDrinkPerk,
    NewLedgerEntry, NewMatch, NewMatchMessage, PerkState, TerminalState, UnlockToken, Wallet,
};

#[cfg(test)]
pub mod memory;
pub mod pg;

pub trait LifecycleStore: Send + Sync {
    fn ping(&self) -> AppResult<()>;

    // --- Matches & blocks ---

    fn get_match(&self, match_id: Uuid) -> AppResult<Option<Match>>;
    /// Returns false when the match already existed.
    fn insert_match(&self, new: &NewMatch) -> AppResult<bool>;
    /// Deletes the match and every row keyed on it.
    fn delete_match(&self, match_id: Uuid) -> AppResult<bool>;
    /// True when either user has blocked the other.
    fn is_blocked(&self, a: Uuid, b: Uuid) -> AppResult<bool>;
    fn insert_block(&self, new: &NewBlock) -> AppResult<bool>;

    // --- Conversation state ---

    /// Create-or-fetch; never overwrites an existing row.
    fn ensure_conversation(&self, new: &NewConversationState) -> AppResult<ConversationState>;
    fn get_conversation(&self, match_id: Uuid) -> AppResult<Option<ConversationState>>;
    /// Applies only if no timer was ever started and the conversation is still pre-chat.
    fn start_decision_timer(
        &self,
        match_id: Uuid,
        for_user_id: Uuid,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool>;
    /// Applies only if no timer is currently running and the conversation is still pre-chat.
    fn restart_decision_timer(
        &self,
        match_id: Uuid,
        for_user_id: Uuid,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool>;
    /// Drops the deadline but keeps `decision_started_at`, so a later open
    /// does not start a fresh window.
    fn clear_decision_timer(&self, match_id: Uuid) -> AppResult<bool>;
    fn mark_active(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;
    /// With `only_if_pre_chat`, an Active conversation is left untouched.
    fn mark_terminal(
        &self,
        match_id: Uuid,
        state: TerminalState,
        at: DateTime<Utc>,
        only_if_pre_chat: bool,
    ) -> AppResult<bool>;
    /// Returns true when the flag changed.
    fn set_thread_archived(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        archived: bool,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
    fn is_thread_archived(&self, match_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    // --- Message log ---

    fn append_message(&self, new: &NewMatchMessage) -> AppResult<MatchMessage>;
    /// Oldest first.
    fn list_messages(&self, match_id: Uuid, limit: i64) -> AppResult<Vec<MatchMessage>>;

    // --- Date plan ---

    fn ensure_date_plan(&self, new: &NewDatePlan) -> AppResult<DatePlan>;
    fn get_date_plan(&self, match_id: Uuid) -> AppResult<Option<DatePlan>>;
    /// Writes `changes` only if the stored status is still `expected`.
    fn transition_date_plan(
        &self,
        match_id: Uuid,
        expected: DateStatus,
        changes: &DatePlanChanges,
    ) -> AppResult<Option<DatePlan>>;
    /// pending -> spent; true for exactly one caller per date.
    fn mark_credit_spent(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;
    /// Plans whose date has passed and that are still unanswered or whose
    /// credit has not been settled.
    fn list_due_date_plans(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>>;

    // --- Drink perk ---

    fn ensure_drink_perk(&self, new: &NewDrinkPerk) -> AppResult<DrinkPerk>;
    fn get_drink_perk(&self, match_id: Uuid) -> AppResult<Option<DrinkPerk>>;
    /// Writes `changes` only if both the state and `together_since` are unchanged.
    fn update_drink_perk(
        &self,
        match_id: Uuid,
        expected_state: PerkState,
        expected_together_since: Option<DateTime<Utc>>,
        changes: &DrinkPerkChanges,
    ) -> AppResult<Option<DrinkPerk>>;
    /// Back to LOCKED unless already LOCKED or REDEEMED.
    fn reset_drink_perk(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;

    // --- Unlock tokens ---

    /// Stores `token` unless the match already holds one unlocked at or
    /// after `issued_since`. Returns whether it was stored.
    fn issue_unlock_token(&self, token: &UnlockToken, issued_since: DateTime<Utc>) -> AppResult<bool>;
    fn get_unlock_token(&self, match_id: Uuid) -> AppResult<Option<UnlockToken>>;
    fn redeem_unlock_token(&self, match_id: Uuid, token: &str, at: DateTime<Utc>) -> AppResult<bool>;
    /// Pulls `expires_at` forward to `at` for a token that is still claimable.
    fn expire_unlock_token(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool>;

    // --- Wallets ---

    fn ensure_wallet(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<Wallet>;
    /// Records the entry and applies its delta atomically. Returns false if an
    /// entry with the same idempotency key already exists.
    fn post_ledger_entry(&self, entry: &NewLedgerEntry) -> AppResult<bool>;
}
