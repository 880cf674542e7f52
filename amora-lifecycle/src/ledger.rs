use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};

use crate::engine::Lifecycle;
use crate::models::{NewLedgerEntry, Wallet};
use crate::transcript;

pub const DATE_COMPLETED_REASON: &str = "date_completed";
const TOP_UP_REASON: &str = "top_up";

/// Deterministic key so a retried debit for the same match, user and reason
/// lands on the existing ledger row.
pub fn idempotency_key(scope: &str, user_id: Uuid, reason: &str) -> String {
    let digest = Sha256::digest(format!("{scope}:{user_id}:{reason}").as_bytes());
    hex::encode(digest)
}

impl Lifecycle {
    pub fn get_balance(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<i64> {
        Ok(self.store().ensure_wallet(user_id, now)?.balance_cents)
    }

    pub fn wallet(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<Wallet> {
        self.store().ensure_wallet(user_id, now)
    }

    pub fn require_balance(&self, user_id: Uuid, required_cents: i64, now: DateTime<Utc>) -> AppResult<()> {
        let balance = self.get_balance(user_id, now)?;
        if balance < required_cents {
            tracing::debug!(user_id = %user_id, balance, required_cents, "insufficient credit");
            return Err(AppError::payment_required(required_cents));
        }
        Ok(())
    }

    /// Debits `amount_cents` from every user once per (match, user, reason).
    /// Returns how many debits were newly applied.
    pub fn spend(
        &self,
        user_ids: &[Uuid],
        match_id: Uuid,
        reason: &str,
        amount_cents: i64,
        now: DateTime<Utc>,
    ) -> AppResult<usize> {
        let mut applied = 0;
        for &user_id in user_ids {
            let entry = NewLedgerEntry {
                id: Uuid::now_v7(),
                idempotency_key: idempotency_key(&match_id.to_string(), user_id, reason),
                user_id,
                match_id: Some(match_id),
                delta_cents: -amount_cents,
                reason: reason.to_string(),
                created_at: now,
            };
            if self.store().post_ledger_entry(&entry)? {
                applied += 1;
                tracing::info!(
                    user_id = %user_id,
                    match_id = %match_id,
                    amount_cents,
                    reason,
                    "wallet debited"
                );
            }
        }
        Ok(applied)
    }

    /// Top-up from the purchase flow. Replaying the same `reference` is a no-op.
    pub fn credit(
        &self,
        user_id: Uuid,
        amount_cents: i64,
        reference: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Wallet> {
        if amount_cents <= 0 {
            return Err(AppError::invalid_argument("credit amount must be positive"));
        }
        if reference.trim().is_empty() {
            return Err(AppError::invalid_argument("credit reference is required"));
        }

        let entry = NewLedgerEntry {
            id: Uuid::now_v7(),
            idempotency_key: idempotency_key(reference, user_id, TOP_UP_REASON),
            user_id,
            match_id: None,
            delta_cents: amount_cents,
            reason: TOP_UP_REASON.to_string(),
            created_at: now,
        };
        if self.store().post_ledger_entry(&entry)? {
            tracing::info!(user_id = %user_id, amount_cents, reference, "wallet credited");
        }
        self.store().ensure_wallet(user_id, now)
    }

    /// Old matches with a real two-sided conversation are exempt from the
    /// credit gate. Never fails; lookup errors count as "not exempt".
    pub fn legacy_unlock(&self, match_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.try_legacy_unlock(match_id, now) {
            Ok(unlocked) => unlocked,
            Err(e) => {
                tracing::warn!(match_id = %match_id, error = %e, "legacy unlock check failed");
                false
            }
        }
    }

    fn try_legacy_unlock(&self, match_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(m) = self.store().get_match(match_id)? else {
            return Ok(false);
        };
        if now - m.created_at <= self.policy().legacy_unlock_age() {
            return Ok(false);
        }
        let messages = self.store().list_messages(match_id, transcript::TRANSCRIPT_SCAN_LIMIT)?;
        Ok(transcript::distinct_qualifying_senders(&messages) >= self.policy().legacy_unlock_min_senders)
    }
}
