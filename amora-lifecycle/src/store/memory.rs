//! In-process store used by the engine tests. Each conditional write holds the
//! row's shard lock for the whole check-and-set, so concurrent callers see the
//! same winner semantics as the Postgres statements.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};

use crate::models::{
    ConversationState, CreditStatus, DatePlan, DatePlanChanges, DateStatus, DrinkPerk,
    DrinkPerkChanges, Match, MatchMessage, NewBlock, NewConversationState, NewDatePlan,
    NewDrinkPerk, NewLedgerEntry, NewMatch, NewMatchMessage, PerkState, TerminalState,
    UnlockToken, Wallet,
};

use super::LifecycleStore;

#[derive(Default)]
pub struct MemoryStore {
    matches: DashMap<Uuid, Match>,
    blocks: DashMap<(Uuid, Uuid), ()>,
    conversations: DashMap<Uuid, ConversationState>,
    archives: DashMap<(Uuid, Uuid), DateTime<Utc>>,
    messages: DashMap<Uuid, Vec<MatchMessage>>,
    plans: DashMap<Uuid, DatePlan>,
    perks: DashMap<Uuid, DrinkPerk>,
    tokens: DashMap<Uuid, UnlockToken>,
    wallets: DashMap<Uuid, Wallet>,
    ledger: DashMap<String, NewLedgerEntry>,
    faults: DashMap<&'static str, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of the named store operation fail.
    pub fn fail_next(&self, op: &'static str, times: usize) {
        self.faults.insert(op, times);
    }

    fn check_fault(&self, op: &'static str) -> AppResult<()> {
        if let Some(mut left) = self.faults.get_mut(op) {
            if *left > 0 {
                *left -= 1;
                return Err(AppError::internal(format!("{op} unavailable")));
            }
        }
        Ok(())
    }

    pub fn ledger_entries_for(&self, user_id: Uuid) -> Vec<NewLedgerEntry> {
        self.ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect()
    }
}

fn apply_plan(plan: &mut DatePlan, changes: &DatePlanChanges) {
    plan.date_status = changes.date_status.clone();
    plan.proposed_by_user_id = changes.proposed_by_user_id;
    plan.date_start = changes.date_start;
    plan.date_end = changes.date_end;
    plan.activity_label = changes.activity_label.clone();
    plan.place_label = changes.place_label.clone();
    plan.place_id = changes.place_id.clone();
    plan.credit_amount_cents = changes.credit_amount_cents;
    plan.credit_status = changes.credit_status.clone();
    plan.credit_expires_at = changes.credit_expires_at;
    plan.updated_at = changes.updated_at;
}

fn apply_perk(perk: &mut DrinkPerk, changes: &DrinkPerkChanges) {
    perk.state = changes.state.clone();
    perk.together_since = changes.together_since;
    perk.ready_at = changes.ready_at;
    perk.redeemed_at = changes.redeemed_at;
    perk.updated_at = changes.updated_at;
}

impl LifecycleStore for MemoryStore {
    fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    fn get_match(&self, match_id: Uuid) -> AppResult<Option<Match>> {
        Ok(self.matches.get(&match_id).map(|m| m.clone()))
    }

    fn insert_match(&self, new: &NewMatch) -> AppResult<bool> {
        match self.matches.entry(new.id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Match {
                    id: new.id,
                    user_a_id: new.user_a_id,
                    user_b_id: new.user_b_id,
                    created_at: new.created_at,
                });
                Ok(true)
            }
        }
    }

    fn delete_match(&self, match_id: Uuid) -> AppResult<bool> {
        let removed = self.matches.remove(&match_id).is_some();
        self.conversations.remove(&match_id);
        self.archives.retain(|(m, _), _| *m != match_id);
        self.messages.remove(&match_id);
        self.plans.remove(&match_id);
        self.perks.remove(&match_id);
        self.tokens.remove(&match_id);
        Ok(removed)
    }

    fn is_blocked(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        Ok(self.blocks.contains_key(&(a, b)) || self.blocks.contains_key(&(b, a)))
    }

    fn insert_block(&self, new: &NewBlock) -> AppResult<bool> {
        Ok(self.blocks.insert((new.blocker_id, new.blocked_id), ()).is_none())
    }

    fn ensure_conversation(&self, new: &NewConversationState) -> AppResult<ConversationState> {
        let row = self.conversations.entry(new.match_id).or_insert_with(|| ConversationState {
            match_id: new.match_id,
            user_a_id: new.user_a_id,
            user_b_id: new.user_b_id,
            decision_started_for_user_id: None,
            decision_started_at: None,
            decision_expires_at: None,
            active_at: None,
            terminal_state: None,
            terminal_at: None,
            created_at: new.created_at,
        });
        Ok(row.clone())
    }

    fn get_conversation(&self, match_id: Uuid) -> AppResult<Option<ConversationState>> {
        Ok(self.conversations.get(&match_id).map(|c| c.clone()))
    }

    fn start_decision_timer(
        &self,
        match_id: Uuid,
        for_user_id: Uuid,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let Some(mut row) = self.conversations.get_mut(&match_id) else {
            return Ok(false);
        };
        if row.decision_started_at.is_some() || row.active_at.is_some() || row.terminal_state.is_some() {
            return Ok(false);
        }
        row.decision_started_for_user_id = Some(for_user_id);
        row.decision_started_at = Some(started_at);
        row.decision_expires_at = Some(expires_at);
        Ok(true)
    }

    fn restart_decision_timer(
        &self,
        match_id: Uuid,
        for_user_id: Uuid,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let Some(mut row) = self.conversations.get_mut(&match_id) else {
            return Ok(false);
        };
        if row.decision_expires_at.is_some() || row.active_at.is_some() || row.terminal_state.is_some() {
            return Ok(false);
        }
        row.decision_started_for_user_id = Some(for_user_id);
        row.decision_started_at = Some(started_at);
        row.decision_expires_at = Some(expires_at);
        Ok(true)
    }

    fn clear_decision_timer(&self, match_id: Uuid) -> AppResult<bool> {
        let Some(mut row) = self.conversations.get_mut(&match_id) else {
            return Ok(false);
        };
        Ok(row.decision_expires_at.take().is_some())
    }

    fn mark_active(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let Some(mut row) = self.conversations.get_mut(&match_id) else {
            return Ok(false);
        };
        if row.active_at.is_some() || row.terminal_state.is_some() {
            return Ok(false);
        }
        row.active_at = Some(at);
        row.decision_expires_at = None;
        Ok(true)
    }

    fn mark_terminal(
        &self,
        match_id: Uuid,
        state: TerminalState,
        at: DateTime<Utc>,
        only_if_pre_chat: bool,
    ) -> AppResult<bool> {
        let Some(mut row) = self.conversations.get_mut(&match_id) else {
            return Ok(false);
        };
        if row.terminal_state.is_some() || (only_if_pre_chat && row.active_at.is_some()) {
            return Ok(false);
        }
        row.terminal_state = Some(state.as_str().to_string());
        row.terminal_at = Some(at);
        Ok(true)
    }

    fn set_thread_archived(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        archived: bool,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let key = (match_id, user_id);
        if archived {
            match self.archives.entry(key) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(at);
                    Ok(true)
                }
            }
        } else {
            Ok(self.archives.remove(&key).is_some())
        }
    }

    fn is_thread_archived(&self, match_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(self.archives.contains_key(&(match_id, user_id)))
    }

    fn append_message(&self, new: &NewMatchMessage) -> AppResult<MatchMessage> {
        let message = MatchMessage {
            id: new.id,
            match_id: new.match_id,
            sender_id: new.sender_id,
            kind: new.kind.clone(),
            body: new.body.clone(),
            created_at: new.created_at,
        };
        self.messages.entry(new.match_id).or_default().push(message.clone());
        Ok(message)
    }

    fn list_messages(&self, match_id: Uuid, limit: i64) -> AppResult<Vec<MatchMessage>> {
        let mut messages = self
            .messages
            .get(&match_id)
            .map(|m| m.clone())
            .unwrap_or_default();
        messages.sort_by_key(|m| m.created_at);
        messages.truncate(limit.max(0) as usize);
        Ok(messages)
    }

    fn ensure_date_plan(&self, new: &NewDatePlan) -> AppResult<DatePlan> {
        let row = self.plans.entry(new.match_id).or_insert_with(|| DatePlan {
            match_id: new.match_id,
            date_status: new.date_status.clone(),
            proposed_by_user_id: None,
            date_start: None,
            date_end: None,
            activity_label: None,
            place_label: None,
            place_id: None,
            credit_amount_cents: 0,
            credit_status: new.credit_status.clone(),
            credit_expires_at: None,
            updated_at: new.updated_at,
        });
        Ok(row.clone())
    }

    fn get_date_plan(&self, match_id: Uuid) -> AppResult<Option<DatePlan>> {
        Ok(self.plans.get(&match_id).map(|p| p.clone()))
    }

    fn transition_date_plan(
        &self,
        match_id: Uuid,
        expected: DateStatus,
        changes: &DatePlanChanges,
    ) -> AppResult<Option<DatePlan>> {
        let Some(mut plan) = self.plans.get_mut(&match_id) else {
            return Ok(None);
        };
        if plan.status() != expected {
            return Ok(None);
        }
        apply_plan(&mut plan, changes);
        Ok(Some(plan.clone()))
    }

    fn mark_credit_spent(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let Some(mut plan) = self.plans.get_mut(&match_id) else {
            return Ok(false);
        };
        if plan.credit() != CreditStatus::Pending {
            return Ok(false);
        }
        plan.credit_status = CreditStatus::Spent.as_str().to_string();
        plan.updated_at = at;
        Ok(true)
    }

    fn list_due_date_plans(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        let mut due: Vec<(DateTime<Utc>, Uuid)> = self
            .plans
            .iter()
            .filter(|p| match p.status() {
                DateStatus::Proposed => true,
                DateStatus::Locked | DateStatus::Unlocked | DateStatus::Expired => {
                    p.credit() == CreditStatus::Pending
                }
                DateStatus::None => false,
            })
            .filter_map(|p| p.date_end.filter(|end| *end <= now).map(|end| (end, p.match_id)))
            .collect();
        due.sort();
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    fn ensure_drink_perk(&self, new: &NewDrinkPerk) -> AppResult<DrinkPerk> {
        let row = self.perks.entry(new.match_id).or_insert_with(|| DrinkPerk {
            match_id: new.match_id,
            state: new.state.clone(),
            together_since: None,
            ready_at: None,
            redeemed_at: None,
            updated_at: new.updated_at,
        });
        Ok(row.clone())
    }

    fn get_drink_perk(&self, match_id: Uuid) -> AppResult<Option<DrinkPerk>> {
        Ok(self.perks.get(&match_id).map(|p| p.clone()))
    }

    fn update_drink_perk(
        &self,
        match_id: Uuid,
        expected_state: PerkState,
        expected_together_since: Option<DateTime<Utc>>,
        changes: &DrinkPerkChanges,
    ) -> AppResult<Option<DrinkPerk>> {
        let Some(mut perk) = self.perks.get_mut(&match_id) else {
            return Ok(None);
        };
        if perk.perk_state() != expected_state || perk.together_since != expected_together_since {
            return Ok(None);
        }
        apply_perk(&mut perk, changes);
        Ok(Some(perk.clone()))
    }

    fn reset_drink_perk(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let Some(mut perk) = self.perks.get_mut(&match_id) else {
            return Ok(false);
        };
        if matches!(perk.perk_state(), PerkState::Redeemed | PerkState::Locked) {
            return Ok(false);
        }
        perk.state = PerkState::Locked.as_str().to_string();
        perk.together_since = None;
        perk.ready_at = None;
        perk.updated_at = at;
        Ok(true)
    }

    fn issue_unlock_token(&self, token: &UnlockToken, issued_since: DateTime<Utc>) -> AppResult<bool> {
        self.check_fault("issue_unlock_token")?;
        match self.tokens.entry(token.match_id) {
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok(true)
            }
            Entry::Occupied(mut slot) if slot.get().unlocked_at < issued_since => {
                slot.insert(token.clone());
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    fn get_unlock_token(&self, match_id: Uuid) -> AppResult<Option<UnlockToken>> {
        Ok(self.tokens.get(&match_id).map(|t| t.clone()))
    }

    fn redeem_unlock_token(&self, match_id: Uuid, token: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let Some(mut row) = self.tokens.get_mut(&match_id) else {
            return Ok(false);
        };
        if row.token != token || !row.is_claimable(at) {
            return Ok(false);
        }
        row.redeemed_at = Some(at);
        Ok(true)
    }

    fn expire_unlock_token(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let Some(mut row) = self.tokens.get_mut(&match_id) else {
            return Ok(false);
        };
        if !row.is_claimable(at) {
            return Ok(false);
        }
        row.expires_at = at;
        Ok(true)
    }

    fn ensure_wallet(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<Wallet> {
        let row = self.wallets.entry(user_id).or_insert_with(|| Wallet {
            user_id,
            balance_cents: 0,
            updated_at: at,
        });
        Ok(row.clone())
    }

    fn post_ledger_entry(&self, entry: &NewLedgerEntry) -> AppResult<bool> {
        self.check_fault("post_ledger_entry")?;
        match self.ledger.entry(entry.idempotency_key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let mut wallet = self.wallets.entry(entry.user_id).or_insert_with(|| Wallet {
                    user_id: entry.user_id,
                    balance_cents: 0,
                    updated_at: entry.created_at,
                });
                wallet.balance_cents += entry.delta_cents;
                wallet.updated_at = entry.created_at;
                slot.insert(entry.clone());
                Ok(true)
            }
        }
    }
}
