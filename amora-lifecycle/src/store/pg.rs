use chrono::{DateTime, Utc};
use diesel::dsl::exists;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use uuid::Uuid;

use amora_shared::clients::db::DbPool;
use amora_shared::errors::{AppError, AppResult};

use crate::models::{
    ConversationState, CreditStatus, DatePlan, DatePlanChanges, DateStatus, DrinkPerk,
    DrinkPerkChanges, Match, MatchMessage, NewBlock, NewConversationState, NewDatePlan,
    NewDrinkPerk, NewLedgerEntry, NewMatch, NewMatchMessage, NewWallet, PerkState, TerminalState,
    UnlockToken, Wallet,
};
use crate::schema::{
    blocks, conversation_states, date_plans, drink_perks, ledger_entries, match_messages,
    matches, thread_archives, unlock_tokens, wallets,
};

use super::LifecycleStore;

type Conn = PooledConnection<ConnectionManager<PgConnection>>;

/// Postgres-backed store. Races are settled by the row count of conditional
/// `UPDATE ... WHERE <expected state>` statements and `ON CONFLICT DO NOTHING` inserts.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> AppResult<Conn> {
        self.pool.get().map_err(|e| AppError::internal(e.to_string()))
    }
}

impl LifecycleStore for PgStore {
    fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }

    fn get_match(&self, match_id: Uuid) -> AppResult<Option<Match>> {
        let mut conn = self.conn()?;
        Ok(matches::table.find(match_id).first::<Match>(&mut conn).optional()?)
    }

    fn insert_match(&self, new: &NewMatch) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let inserted = diesel::insert_into(matches::table)
            .values(new)
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    fn delete_match(&self, match_id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(matches::table.find(match_id)).execute(&mut conn)?;
        Ok(deleted == 1)
    }

    fn is_blocked(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let blocked = diesel::select(exists(
            blocks::table.filter(
                blocks::blocker_id
                    .eq(a)
                    .and(blocks::blocked_id.eq(b))
                    .or(blocks::blocker_id.eq(b).and(blocks::blocked_id.eq(a))),
            ),
        ))
        .get_result::<bool>(&mut conn)?;
        Ok(blocked)
    }

    fn insert_block(&self, new: &NewBlock) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let inserted = diesel::insert_into(blocks::table)
            .values(new)
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(inserted == 1)
    }

    fn ensure_conversation(&self, new: &NewConversationState) -> AppResult<ConversationState> {
        let mut conn = self.conn()?;
        diesel::insert_into(conversation_states::table)
            .values(new)
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(conversation_states::table
            .find(new.match_id)
            .first::<ConversationState>(&mut conn)?)
    }

    fn get_conversation(&self, match_id: Uuid) -> AppResult<Option<ConversationState>> {
        let mut conn = self.conn()?;
        Ok(conversation_states::table
            .find(match_id)
            .first::<ConversationState>(&mut conn)
            .optional()?)
    }

    fn start_decision_timer(
        &self,
        match_id: Uuid,
        for_user_id: Uuid,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            conversation_states::table
                .filter(conversation_states::match_id.eq(match_id))
                .filter(conversation_states::decision_started_at.is_null())
                .filter(conversation_states::active_at.is_null())
                .filter(conversation_states::terminal_state.is_null()),
        )
        .set((
            conversation_states::decision_started_for_user_id.eq(Some(for_user_id)),
            conversation_states::decision_started_at.eq(Some(started_at)),
            conversation_states::decision_expires_at.eq(Some(expires_at)),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn restart_decision_timer(
        &self,
        match_id: Uuid,
        for_user_id: Uuid,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            conversation_states::table
                .filter(conversation_states::match_id.eq(match_id))
                .filter(conversation_states::decision_expires_at.is_null())
                .filter(conversation_states::active_at.is_null())
                .filter(conversation_states::terminal_state.is_null()),
        )
        .set((
            conversation_states::decision_started_for_user_id.eq(Some(for_user_id)),
            conversation_states::decision_started_at.eq(Some(started_at)),
            conversation_states::decision_expires_at.eq(Some(expires_at)),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn clear_decision_timer(&self, match_id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            conversation_states::table
                .filter(conversation_states::match_id.eq(match_id))
                .filter(conversation_states::decision_expires_at.is_not_null()),
        )
        .set(conversation_states::decision_expires_at.eq(None::<DateTime<Utc>>))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn mark_active(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            conversation_states::table
                .filter(conversation_states::match_id.eq(match_id))
                .filter(conversation_states::active_at.is_null())
                .filter(conversation_states::terminal_state.is_null()),
        )
        .set((
            conversation_states::active_at.eq(Some(at)),
            conversation_states::decision_expires_at.eq(None::<DateTime<Utc>>),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn mark_terminal(
        &self,
        match_id: Uuid,
        state: TerminalState,
        at: DateTime<Utc>,
        only_if_pre_chat: bool,
    ) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let target = conversation_states::table
            .filter(conversation_states::match_id.eq(match_id))
            .filter(conversation_states::terminal_state.is_null());
        let changes = (
            conversation_states::terminal_state.eq(Some(state.as_str())),
            conversation_states::terminal_at.eq(Some(at)),
        );

        let updated = if only_if_pre_chat {
            diesel::update(target.filter(conversation_states::active_at.is_null()))
                .set(changes)
                .execute(&mut conn)?
        } else {
            diesel::update(target).set(changes).execute(&mut conn)?
        };
        Ok(updated == 1)
    }

    fn set_thread_archived(
        &self,
        match_id: Uuid,
        user_id: Uuid,
        archived: bool,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let changed = if archived {
            diesel::insert_into(thread_archives::table)
                .values((
                    thread_archives::match_id.eq(match_id),
                    thread_archives::user_id.eq(user_id),
                    thread_archives::archived_at.eq(at),
                ))
                .on_conflict_do_nothing()
                .execute(&mut conn)?
        } else {
            diesel::delete(
                thread_archives::table
                    .filter(thread_archives::match_id.eq(match_id))
                    .filter(thread_archives::user_id.eq(user_id)),
            )
            .execute(&mut conn)?
        };
        Ok(changed == 1)
    }

    fn is_thread_archived(&self, match_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut conn = self.conn()?;
        Ok(diesel::select(exists(
            thread_archives::table
                .filter(thread_archives::match_id.eq(match_id))
                .filter(thread_archives::user_id.eq(user_id)),
        ))
        .get_result::<bool>(&mut conn)?)
    }

    fn append_message(&self, new: &NewMatchMessage) -> AppResult<MatchMessage> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(match_messages::table)
            .values(new)
            .get_result::<MatchMessage>(&mut conn)?)
    }

    fn list_messages(&self, match_id: Uuid, limit: i64) -> AppResult<Vec<MatchMessage>> {
        let mut conn = self.conn()?;
        Ok(match_messages::table
            .filter(match_messages::match_id.eq(match_id))
            .order(match_messages::created_at.asc())
            .limit(limit)
            .load::<MatchMessage>(&mut conn)?)
    }

    fn ensure_date_plan(&self, new: &NewDatePlan) -> AppResult<DatePlan> {
        let mut conn = self.conn()?;
        diesel::insert_into(date_plans::table)
            .values(new)
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(date_plans::table.find(new.match_id).first::<DatePlan>(&mut conn)?)
    }

    fn get_date_plan(&self, match_id: Uuid) -> AppResult<Option<DatePlan>> {
        let mut conn = self.conn()?;
        Ok(date_plans::table.find(match_id).first::<DatePlan>(&mut conn).optional()?)
    }

    fn transition_date_plan(
        &self,
        match_id: Uuid,
        expected: DateStatus,
        changes: &DatePlanChanges,
    ) -> AppResult<Option<DatePlan>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            date_plans::table
                .filter(date_plans::match_id.eq(match_id))
                .filter(date_plans::date_status.eq(expected.as_str())),
        )
        .set(changes)
        .get_result::<DatePlan>(&mut conn)
        .optional()?)
    }

    fn mark_credit_spent(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            date_plans::table
                .filter(date_plans::match_id.eq(match_id))
                .filter(date_plans::credit_status.eq(CreditStatus::Pending.as_str())),
        )
        .set((
            date_plans::credit_status.eq(CreditStatus::Spent.as_str()),
            date_plans::updated_at.eq(at),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn list_due_date_plans(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        let mut conn = self.conn()?;
        Ok(date_plans::table
            .filter(
                date_plans::date_status.eq(DateStatus::Proposed.as_str()).or(date_plans::credit_status
                    .eq(CreditStatus::Pending.as_str())
                    .and(date_plans::date_status.eq_any([
                        DateStatus::Locked.as_str(),
                        DateStatus::Unlocked.as_str(),
                        DateStatus::Expired.as_str(),
                    ]))),
            )
            .filter(date_plans::date_end.le(now))
            .order(date_plans::date_end.asc())
            .select(date_plans::match_id)
            .limit(limit)
            .load::<Uuid>(&mut conn)?)
    }

    fn ensure_drink_perk(&self, new: &NewDrinkPerk) -> AppResult<DrinkPerk> {
        let mut conn = self.conn()?;
        diesel::insert_into(drink_perks::table)
            .values(new)
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(drink_perks::table.find(new.match_id).first::<DrinkPerk>(&mut conn)?)
    }

    fn get_drink_perk(&self, match_id: Uuid) -> AppResult<Option<DrinkPerk>> {
        let mut conn = self.conn()?;
        Ok(drink_perks::table.find(match_id).first::<DrinkPerk>(&mut conn).optional()?)
    }

    fn update_drink_perk(
        &self,
        match_id: Uuid,
        expected_state: PerkState,
        expected_together_since: Option<DateTime<Utc>>,
        changes: &DrinkPerkChanges,
    ) -> AppResult<Option<DrinkPerk>> {
        let mut conn = self.conn()?;
        Ok(diesel::update(
            drink_perks::table
                .filter(drink_perks::match_id.eq(match_id))
                .filter(drink_perks::state.eq(expected_state.as_str()))
                .filter(drink_perks::together_since.is_not_distinct_from(expected_together_since)),
        )
        .set(changes)
        .get_result::<DrinkPerk>(&mut conn)
        .optional()?)
    }

    fn reset_drink_perk(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            drink_perks::table
                .filter(drink_perks::match_id.eq(match_id))
                .filter(drink_perks::state.ne_all([
                    PerkState::Redeemed.as_str(),
                    PerkState::Locked.as_str(),
                ])),
        )
        .set((
            drink_perks::state.eq(PerkState::Locked.as_str()),
            drink_perks::together_since.eq(None::<DateTime<Utc>>),
            drink_perks::ready_at.eq(None::<DateTime<Utc>>),
            drink_perks::updated_at.eq(at),
        ))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn issue_unlock_token(&self, token: &UnlockToken, issued_since: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn()?;
        conn.transaction::<bool, AppError, _>(|conn| {
            let inserted = diesel::insert_into(unlock_tokens::table)
                .values(token)
                .on_conflict_do_nothing()
                .execute(conn)?;
            if inserted == 1 {
                return Ok(true);
            }

            let replaced = diesel::update(
                unlock_tokens::table
                    .filter(unlock_tokens::match_id.eq(token.match_id))
                    .filter(unlock_tokens::unlocked_at.lt(issued_since)),
            )
            .set((
                unlock_tokens::token.eq(&token.token),
                unlock_tokens::unlocked_at.eq(token.unlocked_at),
                unlock_tokens::expires_at.eq(token.expires_at),
                unlock_tokens::redeemed_at.eq(None::<DateTime<Utc>>),
            ))
            .execute(conn)?;
            Ok(replaced == 1)
        })
    }

    fn get_unlock_token(&self, match_id: Uuid) -> AppResult<Option<UnlockToken>> {
        let mut conn = self.conn()?;
        Ok(unlock_tokens::table
            .find(match_id)
            .first::<UnlockToken>(&mut conn)
            .optional()?)
    }

    fn redeem_unlock_token(&self, match_id: Uuid, token: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            unlock_tokens::table
                .filter(unlock_tokens::match_id.eq(match_id))
                .filter(unlock_tokens::token.eq(token))
                .filter(unlock_tokens::redeemed_at.is_null())
                .filter(unlock_tokens::expires_at.gt(at)),
        )
        .set(unlock_tokens::redeemed_at.eq(Some(at)))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn expire_unlock_token(&self, match_id: Uuid, at: DateTime<Utc>) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            unlock_tokens::table
                .filter(unlock_tokens::match_id.eq(match_id))
                .filter(unlock_tokens::redeemed_at.is_null())
                .filter(unlock_tokens::expires_at.gt(at)),
        )
        .set(unlock_tokens::expires_at.eq(at))
        .execute(&mut conn)?;
        Ok(updated == 1)
    }

    fn ensure_wallet(&self, user_id: Uuid, at: DateTime<Utc>) -> AppResult<Wallet> {
        let mut conn = self.conn()?;
        diesel::insert_into(wallets::table)
            .values(&NewWallet { user_id, balance_cents: 0, updated_at: at })
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(wallets::table.find(user_id).first::<Wallet>(&mut conn)?)
    }

    fn post_ledger_entry(&self, entry: &NewLedgerEntry) -> AppResult<bool> {
        let mut conn = self.conn()?;
        conn.transaction::<bool, AppError, _>(|conn| {
            let inserted = diesel::insert_into(ledger_entries::table)
                .values(entry)
                .on_conflict(ledger_entries::idempotency_key)
                .do_nothing()
                .execute(conn)?;
            if inserted == 0 {
                return Ok(false);
            }

            diesel::insert_into(wallets::table)
                .values(&NewWallet {
                    user_id: entry.user_id,
                    balance_cents: 0,
                    updated_at: entry.created_at,
                })
                .on_conflict_do_nothing()
                .execute(conn)?;

            diesel::update(wallets::table.find(entry.user_id))
                .set((
                    wallets::balance_cents.eq(wallets::balance_cents + entry.delta_cents),
                    wallets::updated_at.eq(entry.created_at),
                ))
                .execute(conn)?;

            Ok(true)
        })
    }
}
