use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};
use amora_shared::types::payloads::{BlockCreated, MatchCreated};

use crate::engine::{record_transition, DateRemovalReason, Effect, Lifecycle, Outcome};
use crate::models::{NewBlock, NewMatch};

const MACHINE: &str = "match";

impl Lifecycle {
    pub fn register_match(&self, event: &MatchCreated) -> AppResult<bool> {
        if event.user_a_id == event.user_b_id {
            return Err(AppError::invalid_argument("a match needs two different users"));
        }
        let inserted = self.store().insert_match(&NewMatch {
            id: event.match_id,
            user_a_id: event.user_a_id,
            user_b_id: event.user_b_id,
            created_at: event.created_at,
        })?;
        if inserted {
            record_transition(MACHINE, "created", event.match_id);
        }
        Ok(inserted)
    }

    /// Drops the match and everything keyed on it.
    pub fn remove_match(&self, match_id: Uuid) -> AppResult<Vec<Effect>> {
        if !self.store().delete_match(match_id)? {
            return Ok(Vec::new());
        }
        record_transition(MACHINE, "removed", match_id);
        Ok(vec![Effect::CloseHandshake {
            match_id,
            reason: DateRemovalReason::Unmatched.as_str(),
        }])
    }

    pub fn unmatch(&self, match_id: Uuid, requester: Uuid) -> AppResult<Outcome<()>> {
        let m = self.authorize(match_id, requester)?;
        tracing::info!(match_id = %m.id, user_id = %requester, "unmatch requested");
        Ok(Outcome::with_effects((), self.remove_match(m.id)?))
    }

    pub fn register_block(&self, event: &BlockCreated) -> AppResult<bool> {
        let inserted = self.store().insert_block(&NewBlock {
            blocker_id: event.blocker_id,
            blocked_id: event.blocked_id,
        })?;
        if inserted {
            tracing::info!(blocker_id = %event.blocker_id, blocked_id = %event.blocked_id, "block recorded");
        }
        Ok(inserted)
    }
}
