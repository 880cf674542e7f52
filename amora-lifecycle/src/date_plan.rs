use chrono::{DateTime, Utc};
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};

use crate::engine::{
    notify, record_transition, DateEvent, DateRemovalReason, Effect, Lifecycle, NotificationKind,
    Outcome,
};
use crate::ledger::DATE_COMPLETED_REASON;
use crate::models::{CreditStatus, DatePlan, DatePlanChanges, DateStatus, Match, NewDatePlan};

const MACHINE: &str = "date_plan";

#[derive(Debug, Clone)]
pub struct DateProposal {
    pub date_start: DateTime<Utc>,
    pub date_end: DateTime<Utc>,
    pub activity_label: String,
    pub place_label: String,
    pub place_id: String,
}

impl DateProposal {
    fn validate(&self, now: DateTime<Utc>) -> AppResult<()> {
        if self.date_end <= self.date_start {
            return Err(AppError::invalid_argument("date_end must be after date_start"));
        }
        if self.date_end <= now {
            return Err(AppError::invalid_argument("date is already over"));
        }
        for (field, value) in [
            ("activity_label", &self.activity_label),
            ("place_label", &self.place_label),
            ("place_id", &self.place_id),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::invalid_argument(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// The columns of an empty plan.
fn cleared(plan: &DatePlan, now: DateTime<Utc>) -> DatePlanChanges {
    DatePlanChanges {
        date_status: DateStatus::None.as_str().to_string(),
        proposed_by_user_id: None,
        date_start: None,
        date_end: None,
        activity_label: None,
        place_label: None,
        place_id: None,
        credit_amount_cents: 0,
        credit_status: CreditStatus::Pending.as_str().to_string(),
        credit_expires_at: None,
        ..DatePlanChanges::from_plan(plan, now)
    }
}

impl Lifecycle {
    pub fn ensure_date_plan(&self, match_id: Uuid, now: DateTime<Utc>) -> AppResult<DatePlan> {
        self.store().ensure_date_plan(&NewDatePlan {
            match_id,
            date_status: DateStatus::None.as_str().to_string(),
            credit_status: CreditStatus::Pending.as_str().to_string(),
            updated_at: now,
        })
    }

    pub fn get_date_plan(
        &self,
        match_id: Uuid,
        requester: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Outcome<DatePlan>> {
        let m = self.authorize(match_id, requester)?;
        let plan = self.ensure_date_plan(m.id, now)?;
        let (plan, effects) = self.auto_expire(&m, plan, now);
        Ok(Outcome::with_effects(plan, effects))
    }

    pub fn propose_date(
        &self,
        match_id: Uuid,
        proposer: Uuid,
        proposal: DateProposal,
        now: DateTime<Utc>,
    ) -> AppResult<Outcome<DatePlan>> {
        proposal.validate(now)?;
        let m = self.authorize(match_id, proposer)?;
        if let Some(state) = self.store().get_conversation(m.id)? {
            if state.terminal().is_some() {
                return Err(AppError::gone("conversation has ended"));
            }
        }

        let plan = self.ensure_date_plan(m.id, now)?;
        let (plan, mut effects) = self.auto_expire(&m, plan, now);
        if plan.status() != DateStatus::None {
            return Err(AppError::conflict("a date plan already exists for this match"));
        }

        let changes = DatePlanChanges {
            date_status: DateStatus::Proposed.as_str().to_string(),
            proposed_by_user_id: Some(proposer),
            date_start: Some(proposal.date_start),
            date_end: Some(proposal.date_end),
            activity_label: Some(proposal.activity_label),
            place_label: Some(proposal.place_label),
            place_id: Some(proposal.place_id),
            credit_amount_cents: self.policy().date_credit_cents,
            credit_status: CreditStatus::Pending.as_str().to_string(),
            credit_expires_at: Some(proposal.date_end),
            updated_at: now,
        };
        let Some(updated) = self.store().transition_date_plan(m.id, DateStatus::None, &changes)? else {
            return Err(AppError::conflict("a date plan already exists for this match"));
        };

        record_transition(MACHINE, "proposed", m.id);
        effects.extend(self.on_date_event(DateEvent::Activated { match_id: m.id }, now)?);
        effects.push(notify(m.counterpart(proposer), NotificationKind::DateProposed, m.id));
        Ok(Outcome::with_effects(updated, effects))
    }

    /// Accept locks the plan and lifts the decision timer; decline clears the
    /// plan and gives the conversation a fresh window.
    pub fn respond_to_date(
        &self,
        match_id: Uuid,
        responder: Uuid,
        accept: bool,
        now: DateTime<Utc>,
    ) -> AppResult<Outcome<DatePlan>> {
        let m = self.authorize(match_id, responder)?;
        let plan = self.ensure_date_plan(m.id, now)?;
        let (plan, mut effects) = self.auto_expire(&m, plan, now);
        if plan.status() != DateStatus::Proposed {
            return Err(AppError::invalid_argument("there is no pending date proposal"));
        }
        let Some(proposer) = plan.proposed_by_user_id else {
            return Err(AppError::invalid_argument("there is no pending date proposal"));
        };
        if proposer == responder {
            return Err(AppError::forbidden("cannot respond to your own proposal"));
        }

        if accept {
            let changes = DatePlanChanges {
                date_status: DateStatus::Locked.as_str().to_string(),
                ..DatePlanChanges::from_plan(&plan, now)
            };
            let Some(updated) = self.store().transition_date_plan(m.id, DateStatus::Proposed, &changes)? else {
                return Ok(Outcome::with_effects(self.reload_plan(m.id)?, effects));
            };
            record_transition(MACHINE, "accepted", m.id);
            self.clear_decision_timer(m.id)?;
            effects.push(notify(proposer, NotificationKind::DateAccepted, m.id));
            Ok(Outcome::with_effects(updated, effects))
        } else {
            let Some(updated) =
                self.store().transition_date_plan(m.id, DateStatus::Proposed, &cleared(&plan, now))?
            else {
                return Ok(Outcome::with_effects(self.reload_plan(m.id)?, effects));
            };
            record_transition(MACHINE, "declined", m.id);
            self.restore_decision_timer(&m, responder, now)?;
            effects.extend(self.on_date_event(
                DateEvent::Removed { match_id: m.id, reason: DateRemovalReason::Declined },
                now,
            )?);
            effects.push(notify(proposer, NotificationKind::DateDeclined, m.id));
            Ok(Outcome::with_effects(updated, effects))
        }
    }

    /// Only the proposer may call off a proposed or accepted date.
    pub fn cancel_date(
        &self,
        match_id: Uuid,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Outcome<DatePlan>> {
        let m = self.authorize(match_id, actor)?;
        let plan = self.ensure_date_plan(m.id, now)?;
        let (plan, mut effects) = self.auto_expire(&m, plan, now);
        let status = plan.status();
        if !status.is_pending_date() {
            return Err(AppError::invalid_argument("there is no date to cancel"));
        }
        if plan.proposed_by_user_id != Some(actor) {
            return Err(AppError::forbidden("only the proposer can cancel this date"));
        }

        let Some(updated) = self.store().transition_date_plan(m.id, status, &cleared(&plan, now))? else {
            return Ok(Outcome::with_effects(self.reload_plan(m.id)?, effects));
        };
        record_transition(MACHINE, "cancelled", m.id);
        self.restore_decision_timer(&m, actor, now)?;
        effects.extend(self.on_date_event(
            DateEvent::Removed { match_id: m.id, reason: DateRemovalReason::Cancelled },
            now,
        )?);
        effects.push(notify(m.counterpart(actor), NotificationKind::DateCancelled, m.id));
        Ok(Outcome::with_effects(updated, effects))
    }

    /// Locked -> Unlocked once the perk has been earned. Returns whether this
    /// caller made the move.
    pub(crate) fn unlock_date(&self, plan: &DatePlan, now: DateTime<Utc>) -> AppResult<bool> {
        let changes = DatePlanChanges {
            date_status: DateStatus::Unlocked.as_str().to_string(),
            ..DatePlanChanges::from_plan(plan, now)
        };
        let won = self
            .store()
            .transition_date_plan(plan.match_id, DateStatus::Locked, &changes)?
            .is_some();
        if won {
            record_transition(MACHINE, "unlocked", plan.match_id);
        }
        Ok(won)
    }

    /// Lazily applies deadlines: a proposal nobody answered before the date
    /// ended lapses, a Locked plan whose date has ended expires, and a
    /// finished date's credit is spent once. Failures are logged and leave
    /// the plan for the next read.
    pub fn auto_expire(&self, m: &Match, plan: DatePlan, now: DateTime<Utc>) -> (DatePlan, Vec<Effect>) {
        let mut effects = Vec::new();
        match self.try_auto_expire(m, &plan, now, &mut effects) {
            Ok(updated) => (updated, effects),
            Err(e) => {
                tracing::warn!(match_id = %m.id, error = %e, "date auto-expire failed");
                let current = self.store().get_date_plan(m.id).ok().flatten().unwrap_or(plan);
                (current, effects)
            }
        }
    }

    fn try_auto_expire(
        &self,
        m: &Match,
        plan: &DatePlan,
        now: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) -> AppResult<DatePlan> {
        let date_over = plan.date_end.is_some_and(|end| end <= now);
        if !date_over {
            return Ok(plan.clone());
        }

        let mut plan = plan.clone();
        if plan.status() == DateStatus::Proposed {
            match self.store().transition_date_plan(m.id, DateStatus::Proposed, &cleared(&plan, now))? {
                Some(updated) => {
                    record_transition(MACHINE, "lapsed", m.id);
                    let waiting = plan.proposed_by_user_id.map_or(m.user_b_id, |p| m.counterpart(p));
                    if let Err(e) = self.restore_decision_timer(m, waiting, now) {
                        tracing::warn!(match_id = %m.id, error = %e, "failed to restore decision timer");
                    }
                    self.removed_on_expiry(m.id, now, effects);
                    return Ok(updated);
                }
                None => plan = self.reload_plan(m.id)?,
            }
        }

        if plan.status() == DateStatus::Locked {
            let changes = DatePlanChanges {
                date_status: DateStatus::Expired.as_str().to_string(),
                proposed_by_user_id: None,
                ..DatePlanChanges::from_plan(&plan, now)
            };
            match self.store().transition_date_plan(m.id, DateStatus::Locked, &changes)? {
                Some(updated) => {
                    record_transition(MACHINE, "expired", m.id);
                    self.removed_on_expiry(m.id, now, effects);
                    plan = updated;
                }
                None => plan = self.reload_plan(m.id)?,
            }
        }

        let settled = matches!(plan.status(), DateStatus::Expired | DateStatus::Unlocked);
        if settled && plan.credit() == CreditStatus::Pending {
            // Debits are keyed per (match, user), so a retry after a partial
            // failure charges only the users that were missed.
            self.spend(&m.participants(), m.id, DATE_COMPLETED_REASON, plan.credit_amount_cents, now)?;
            if self.store().mark_credit_spent(m.id, now)? {
                record_transition(MACHINE, "credit_spent", m.id);
            }
            plan = self.reload_plan(m.id)?;
        }

        Ok(plan)
    }

    fn removed_on_expiry(&self, match_id: Uuid, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        let event = DateEvent::Removed { match_id, reason: DateRemovalReason::Expired };
        match self.on_date_event(event, now) {
            Ok(more) => effects.extend(more),
            Err(e) => {
                tracing::warn!(match_id = %match_id, error = %e, "failed to apply date removal");
                effects.push(Effect::CloseHandshake { match_id, reason: DateRemovalReason::Expired.as_str() });
            }
        }
    }

    /// Runs deadline handling for plans whose date has ended, so proposals
    /// lapse and credit is settled even when neither participant polls.
    pub fn sweep_due_dates(&self, now: DateTime<Utc>, limit: i64) -> AppResult<(usize, Vec<Effect>)> {
        let due = self.store().list_due_date_plans(now, limit)?;
        let mut effects = Vec::new();
        let mut processed = 0;
        for match_id in due {
            let (Some(m), Some(plan)) = (self.store().get_match(match_id)?, self.store().get_date_plan(match_id)?)
            else {
                continue;
            };
            let (_, plan_effects) = self.auto_expire(&m, plan, now);
            effects.extend(plan_effects);
            processed += 1;
        }
        Ok((processed, effects))
    }

    fn reload_plan(&self, match_id: Uuid) -> AppResult<DatePlan> {
        self.store()
            .get_date_plan(match_id)?
            .ok_or_else(|| AppError::not_found("match not found"))
    }
}
