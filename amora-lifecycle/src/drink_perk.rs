use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use amora_shared::errors::{AppError, AppResult};

use crate::engine::{notify, record_transition, DateEvent, Effect, Lifecycle, NotificationKind, Outcome};
use crate::geo::{self, LocationReport, Proximity};
use crate::models::{DateStatus, DrinkPerk, DrinkPerkChanges, Match, NewDrinkPerk, PerkState, UnlockToken};

const MACHINE: &str = "drink_perk";

/// What one geofencing sample does to an ARMED perk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerkStep {
    Unchanged,
    StartDwell,
    ClearDwell,
    Ready,
}

/// Pure transition function; safe to replay with the same inputs.
pub fn next_step(perk: &DrinkPerk, proximity: Proximity, now: DateTime<Utc>, dwell: Duration) -> PerkStep {
    if perk.perk_state() != PerkState::Armed {
        return PerkStep::Unchanged;
    }
    match (proximity, perk.together_since) {
        (Proximity::Together { .. }, None) => PerkStep::StartDwell,
        (Proximity::Together { .. }, Some(since)) if now - since >= dwell => PerkStep::Ready,
        (Proximity::Together { .. }, Some(_)) => PerkStep::Unchanged,
        (Proximity::Apart { .. } | Proximity::Unknown, Some(_)) => PerkStep::ClearDwell,
        (Proximity::Apart { .. } | Proximity::Unknown, None) => PerkStep::Unchanged,
    }
}

fn changes_for(perk: &DrinkPerk, step: PerkStep, now: DateTime<Utc>) -> Option<DrinkPerkChanges> {
    let base = DrinkPerkChanges::from_perk(perk, now);
    match step {
        PerkStep::Unchanged => None,
        PerkStep::StartDwell => Some(DrinkPerkChanges { together_since: Some(now), ..base }),
        PerkStep::ClearDwell => Some(DrinkPerkChanges { together_since: None, ..base }),
        PerkStep::Ready => Some(DrinkPerkChanges {
            state: PerkState::Ready.as_str().to_string(),
            ready_at: Some(now),
            ..base
        }),
    }
}

pub fn generate_unlock_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

#[derive(Debug, Clone, Serialize)]
pub struct PerkView {
    pub match_id: Uuid,
    pub state: PerkState,
    pub together_since: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_expires_at: Option<DateTime<Utc>>,
}

impl Lifecycle {
    fn ensure_drink_perk(&self, match_id: Uuid, now: DateTime<Utc>) -> AppResult<DrinkPerk> {
        self.store().ensure_drink_perk(&NewDrinkPerk {
            match_id,
            state: PerkState::Locked.as_str().to_string(),
            updated_at: now,
        })
    }

    /// Reacts to the date plan: arm when a date appears, reset when it goes
    /// away. A redeemed perk is never touched.
    pub(crate) fn on_date_event(&self, event: DateEvent, now: DateTime<Utc>) -> AppResult<Vec<Effect>> {
        match event {
            DateEvent::Activated { match_id } => {
                let perk = self.ensure_drink_perk(match_id, now)?;
                if perk.perk_state() == PerkState::Locked {
                    let changes = DrinkPerkChanges {
                        state: PerkState::Armed.as_str().to_string(),
                        together_since: None,
                        ready_at: None,
                        ..DrinkPerkChanges::from_perk(&perk, now)
                    };
                    if self
                        .store()
                        .update_drink_perk(match_id, PerkState::Locked, perk.together_since, &changes)?
                        .is_some()
                    {
                        record_transition(MACHINE, "armed", match_id);
                    }
                }
                Ok(Vec::new())
            }
            DateEvent::Removed { match_id, reason } => {
                if self.store().reset_drink_perk(match_id, now)? {
                    record_transition(MACHINE, "reset", match_id);
                }
                if self.store().expire_unlock_token(match_id, now)? {
                    tracing::info!(match_id = %match_id, reason = reason.as_str(), "unlock token expired");
                }
                Ok(vec![Effect::CloseHandshake { match_id, reason: reason.as_str() }])
            }
        }
    }

    /// Poll endpoint: runs date deadlines, then one geofencing sample against
    /// the participants' latest reports.
    pub fn evaluate_perk(
        &self,
        match_id: Uuid,
        requester: Uuid,
        reports: &[LocationReport],
        now: DateTime<Utc>,
    ) -> AppResult<Outcome<PerkView>> {
        let m = self.authorize(match_id, requester)?;
        let plan = self.ensure_date_plan(m.id, now)?;
        let (plan, mut effects) = self.auto_expire(&m, plan, now);

        let mut perk = self.ensure_drink_perk(m.id, now)?;
        if plan.status().is_pending_date() && perk.perk_state() == PerkState::Locked {
            effects.extend(self.on_date_event(DateEvent::Activated { match_id: m.id }, now)?);
            perk = self.reload_perk(m.id)?;
        }

        let policy = self.policy();
        if plan.status() == DateStatus::Locked
            && perk.perk_state() == PerkState::Armed
            && geo::in_geofence_window(&plan, now, policy.geofence_margin())
        {
            let a = reports.iter().find(|r| r.user_id == m.user_a_id);
            let b = reports.iter().find(|r| r.user_id == m.user_b_id);
            let proximity = geo::evaluate(a, b, now, policy);
            let step = next_step(&perk, proximity, now, policy.dwell());
            tracing::debug!(match_id = %m.id, ?proximity, ?step, "geofence sample");

            if let Some(changes) = changes_for(&perk, step, now) {
                match self
                    .store()
                    .update_drink_perk(m.id, PerkState::Armed, perk.together_since, &changes)?
                {
                    Some(updated) => {
                        if step == PerkStep::Ready {
                            record_transition(MACHINE, "ready", m.id);
                            for user in m.participants() {
                                effects.push(notify(user, NotificationKind::DrinkReady, m.id));
                            }
                        }
                        perk = updated;
                    }
                    None => perk = self.reload_perk(m.id)?,
                }
            }
        }

        if perk.perk_state() == PerkState::Ready {
            if let Err(e) = self.settle_ready(&m, &perk, now) {
                tracing::warn!(match_id = %m.id, error = %e, "failed to settle ready perk");
            }
        }

        let token = match perk.perk_state() {
            PerkState::Ready => match self.store().get_unlock_token(m.id) {
                Ok(token) => token.filter(|t| t.is_claimable(now)),
                Err(e) => {
                    tracing::warn!(match_id = %m.id, error = %e, "failed to load unlock token");
                    None
                }
            },
            _ => None,
        };

        Ok(Outcome::with_effects(
            PerkView {
                match_id: m.id,
                state: perk.perk_state(),
                together_since: perk.together_since,
                ready_at: perk.ready_at,
                redeemed_at: perk.redeemed_at,
                unlock_expires_at: token.as_ref().map(|t| t.expires_at),
                unlock_token: token.map(|t| t.token),
            },
            effects,
        ))
    }

    /// Handshake completion: consumes the unlock token and makes the perk
    /// REDEEMED for good. Replays after success return the redeemed perk.
    pub fn redeem_perk(&self, match_id: Uuid, token: &str, now: DateTime<Utc>) -> AppResult<Outcome<DrinkPerk>> {
        let m = self
            .store()
            .get_match(match_id)?
            .ok_or_else(|| AppError::not_found("match not found"))?;
        let perk = self.ensure_drink_perk(m.id, now)?;
        match perk.perk_state() {
            PerkState::Redeemed => return Ok(Outcome::new(perk)),
            PerkState::Ready => {}
            _ => return Err(AppError::invalid_argument("drink perk is not ready")),
        }

        let invalid = || AppError::invalid_argument("invalid or expired unlock token");
        let stored = self.store().get_unlock_token(m.id)?.ok_or_else(invalid)?;
        if stored.token != token || !stored.is_claimable(now) {
            return Err(invalid());
        }
        if !self.store().redeem_unlock_token(m.id, token, now)? {
            let current = self.reload_perk(m.id)?;
            if current.perk_state() == PerkState::Redeemed {
                return Ok(Outcome::new(current));
            }
            return Err(invalid());
        }

        let changes = DrinkPerkChanges {
            state: PerkState::Redeemed.as_str().to_string(),
            redeemed_at: Some(now),
            ..DrinkPerkChanges::from_perk(&perk, now)
        };
        let Some(updated) = self
            .store()
            .update_drink_perk(m.id, PerkState::Ready, perk.together_since, &changes)?
        else {
            return Ok(Outcome::new(self.reload_perk(m.id)?));
        };

        record_transition(MACHINE, "redeemed", m.id);
        let effects = m
            .participants()
            .into_iter()
            .map(|user| notify(user, NotificationKind::DrinkRedeemed, m.id))
            .collect();
        Ok(Outcome::with_effects(updated, effects))
    }

    /// Brings the plan and token in line with a READY perk: Locked moves to
    /// Unlocked and a token is issued for this readiness if none exists yet.
    /// Repeats on every poll until both have happened.
    fn settle_ready(&self, m: &Match, perk: &DrinkPerk, now: DateTime<Utc>) -> AppResult<()> {
        let Some(ready_at) = perk.ready_at else {
            return Ok(());
        };
        let mut plan = self.ensure_date_plan(m.id, now)?;
        if plan.status() == DateStatus::Locked {
            self.unlock_date(&plan, now)?;
            plan = self.ensure_date_plan(m.id, now)?;
        }
        if plan.status() != DateStatus::Unlocked {
            return Ok(());
        }

        let issued = self.store().get_unlock_token(m.id)?;
        if issued.is_some_and(|t| t.unlocked_at >= ready_at) {
            return Ok(());
        }
        self.issue_unlock_token(m.id, ready_at, now)?;
        Ok(())
    }

    fn issue_unlock_token(&self, match_id: Uuid, ready_at: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<bool> {
        let token = UnlockToken {
            match_id,
            token: generate_unlock_token(),
            unlocked_at: now,
            expires_at: now + self.policy().unlock_token_ttl(),
            redeemed_at: None,
        };
        let stored = self.store().issue_unlock_token(&token, ready_at)?;
        if stored {
            tracing::info!(match_id = %match_id, expires_at = %token.expires_at, "unlock token issued");
        }
        Ok(stored)
    }

    fn reload_perk(&self, match_id: Uuid) -> AppResult<DrinkPerk> {
        self.store()
            .get_drink_perk(match_id)?
            .ok_or_else(|| AppError::not_found("match not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_plan::DateProposal;
    use crate::engine::fixtures::*;
    use crate::store::LifecycleStore;
    use amora_shared::errors::ErrorCode;

    const LAT: f64 = 48.8566;
    const LNG: f64 = 2.3522;

    fn near(user: Uuid, when: DateTime<Utc>) -> LocationReport {
        LocationReport { user_id: user, lat: LAT, lng: LNG, captured_at: when }
    }

    /// Roughly `metres` north of the reference point.
    fn offset(user: Uuid, metres: f64, when: DateTime<Utc>) -> LocationReport {
        LocationReport {
            user_id: user,
            lat: LAT + (metres / 6_371_000.0_f64).to_degrees(),
            lng: LNG,
            captured_at: when,
        }
    }

    fn both_near(when: DateTime<Utc>) -> Vec<LocationReport> {
        vec![near(USER_1, when), offset(USER_2, 8.0, when)]
    }

    /// Match 42: user 1 proposes 19:00-21:00, user 2 accepts.
    fn locked_date(h: &Harness) {
        h.lifecycle
            .propose_date(
                MATCH,
                USER_1,
                DateProposal {
                    date_start: at(1, 19, 0, 0),
                    date_end: at(1, 21, 0, 0),
                    activity_label: "Drinks".into(),
                    place_label: "Le Comptoir".into(),
                    place_id: "place-123".into(),
                },
                at(1, 12, 0, 0),
            )
            .unwrap();
        h.lifecycle.respond_to_date(MATCH, USER_2, true, at(1, 12, 30, 0)).unwrap();
    }

    fn ready_notifications(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Notify { kind: NotificationKind::DrinkReady, .. }))
            .count()
    }

    #[test]
    fn match_42_becomes_ready_after_two_minutes_and_stays_ready() {
        let h = harness();
        locked_date(&h);

        let state = h.store.get_conversation(MATCH).unwrap();
        assert!(state.map_or(true, |s| s.decision_expires_at.is_none()));

        let mut ready_fired = 0;
        let mut first_ready = None;
        let start = at(1, 19, 5, 0);
        for tick in 0..=10 {
            let now = start + Duration::seconds(30 * tick);
            let viewer = if tick % 2 == 0 { USER_1 } else { USER_2 };
            let outcome = h.lifecycle.evaluate_perk(MATCH, viewer, &both_near(now), now).unwrap();
            ready_fired += ready_notifications(&outcome.effects);
            if outcome.value.state == PerkState::Ready && first_ready.is_none() {
                first_ready = Some(now);
            }
            if first_ready.is_some() {
                assert_eq!(outcome.value.state, PerkState::Ready);
            }
        }

        assert_eq!(first_ready, Some(at(1, 19, 7, 0)));
        assert_eq!(ready_fired, 2, "one drink_ready per participant");

        let perk = h.store.get_drink_perk(MATCH).unwrap().unwrap();
        assert_eq!(perk.ready_at, Some(at(1, 19, 7, 0)));
        let plan = h.store.get_date_plan(MATCH).unwrap().unwrap();
        assert_eq!(plan.status(), DateStatus::Unlocked);

        let token = h.store.get_unlock_token(MATCH).unwrap().unwrap();
        let redeemed = h.lifecycle.redeem_perk(MATCH, &token.token, at(1, 19, 20, 0)).unwrap();
        assert_eq!(redeemed.value.perk_state(), PerkState::Redeemed);
        assert_eq!(redeemed.effects.len(), 2);

        // the plan is Unlocked now, so there is no date left to cancel
        let err = h.lifecycle.cancel_date(MATCH, USER_1, at(1, 19, 30, 0)).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
        assert_eq!(h.store.get_date_plan(MATCH).unwrap().unwrap().status(), DateStatus::Unlocked);
        let perk = h.store.get_drink_perk(MATCH).unwrap().unwrap();
        assert_eq!(perk.perk_state(), PerkState::Redeemed);
        assert_eq!(perk.redeemed_at, Some(at(1, 19, 20, 0)));
    }

    #[test]
    fn date_removal_never_resets_a_redeemed_perk() {
        let h = harness();
        locked_date(&h);
        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();
        let t1 = t0 + Duration::minutes(2);
        let token = h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t1), t1).unwrap().value.unlock_token.unwrap();
        let redeemed_at = t1 + Duration::minutes(1);
        h.lifecycle.redeem_perk(MATCH, &token, redeemed_at).unwrap();

        let effects = h
            .lifecycle
            .on_date_event(
                DateEvent::Removed { match_id: MATCH, reason: crate::engine::DateRemovalReason::Unmatched },
                redeemed_at + Duration::minutes(10),
            )
            .unwrap();
        assert!(effects.contains(&Effect::CloseHandshake { match_id: MATCH, reason: "unmatched" }));

        let perk = h.store.get_drink_perk(MATCH).unwrap().unwrap();
        assert_eq!(perk.perk_state(), PerkState::Redeemed);
        assert_eq!(perk.redeemed_at, Some(redeemed_at));
    }

    #[test]
    fn failed_token_issue_keeps_ready_effects_and_is_repaired() {
        let h = harness();
        locked_date(&h);
        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();

        h.store.fail_next("issue_unlock_token", 1);
        let t1 = t0 + Duration::minutes(2);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t1), t1).unwrap();
        assert_eq!(outcome.value.state, PerkState::Ready);
        assert_eq!(ready_notifications(&outcome.effects), 2);
        assert!(outcome.value.unlock_token.is_none());
        assert!(h.store.get_unlock_token(MATCH).unwrap().is_none());
        assert_eq!(h.store.get_date_plan(MATCH).unwrap().unwrap().status(), DateStatus::Unlocked);

        let t2 = t1 + Duration::seconds(30);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_2, &[], t2).unwrap();
        assert_eq!(ready_notifications(&outcome.effects), 0);
        let token = outcome.value.unlock_token.unwrap();

        // later polls keep the repaired token
        let t3 = t2 + Duration::seconds(30);
        let again = h.lifecycle.evaluate_perk(MATCH, USER_1, &[], t3).unwrap();
        assert_eq!(again.value.unlock_token.as_deref(), Some(token.as_str()));

        let redeemed = h.lifecycle.redeem_perk(MATCH, &token, t3).unwrap();
        assert_eq!(redeemed.value.perk_state(), PerkState::Redeemed);
    }

    #[test]
    fn dwell_of_119_seconds_is_not_enough() {
        let h = harness();
        locked_date(&h);
        let first = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(first), first).unwrap();

        let almost = first + Duration::seconds(119);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(almost), almost).unwrap();
        assert_eq!(outcome.value.state, PerkState::Armed);
        assert_eq!(outcome.value.together_since, Some(first));

        let enough = first + Duration::seconds(120);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_2, &both_near(enough), enough).unwrap();
        assert_eq!(outcome.value.state, PerkState::Ready);
        assert!(outcome.value.unlock_token.is_some());
    }

    #[test]
    fn moving_apart_restarts_the_dwell() {
        let h = harness();
        locked_date(&h);
        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();

        let t1 = t0 + Duration::seconds(60);
        let apart = vec![near(USER_1, t1), offset(USER_2, 80.0, t1)];
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &apart, t1).unwrap();
        assert!(outcome.value.together_since.is_none());

        let t2 = t0 + Duration::seconds(90);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t2), t2).unwrap();
        let t3 = t0 + Duration::seconds(150);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t3), t3).unwrap();
        assert_eq!(outcome.value.state, PerkState::Armed);
        assert_eq!(outcome.value.together_since, Some(t2));
    }

    #[test]
    fn stale_reports_clear_the_dwell() {
        let h = harness();
        locked_date(&h);
        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();

        // user 2 stops reporting
        let t1 = t0 + Duration::minutes(6);
        let reports = vec![near(USER_1, t1), offset(USER_2, 5.0, t0)];
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &reports, t1).unwrap();
        assert_eq!(outcome.value.state, PerkState::Armed);
        assert!(outcome.value.together_since.is_none());
    }

    #[test]
    fn geofencing_is_idle_outside_the_window() {
        let h = harness();
        locked_date(&h);
        let early = at(1, 12, 59, 0);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(early), early).unwrap();
        assert!(outcome.value.together_since.is_none());

        let opens = at(1, 13, 0, 0);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(opens), opens).unwrap();
        assert_eq!(outcome.value.together_since, Some(opens));
    }

    #[test]
    fn proposed_date_arms_but_does_not_geofence() {
        let h = harness();
        h.lifecycle
            .propose_date(
                MATCH,
                USER_1,
                DateProposal {
                    date_start: at(1, 19, 0, 0),
                    date_end: at(1, 21, 0, 0),
                    activity_label: "Drinks".into(),
                    place_label: "Le Comptoir".into(),
                    place_id: "place-123".into(),
                },
                at(1, 12, 0, 0),
            )
            .unwrap();

        let now = at(1, 19, 5, 0);
        let outcome = h.lifecycle.evaluate_perk(MATCH, USER_2, &both_near(now), now).unwrap();
        assert_eq!(outcome.value.state, PerkState::Armed);
        assert!(outcome.value.together_since.is_none());
    }

    #[test]
    fn concurrent_pollers_fire_ready_once() {
        let h = harness();
        locked_date(&h);
        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();

        let t1 = t0 + Duration::seconds(125);
        let fired: usize = std::thread::scope(|s| {
            let handles: Vec<_> = [USER_1, USER_2, USER_1, USER_2]
                .into_iter()
                .map(|viewer| {
                    let lifecycle = &h.lifecycle;
                    s.spawn(move || {
                        let outcome = lifecycle.evaluate_perk(MATCH, viewer, &both_near(t1), t1).unwrap();
                        ready_notifications(&outcome.effects)
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).sum()
        });

        assert_eq!(fired, 2);
    }

    #[test]
    fn perk_row_is_a_singleton() {
        let h = harness();
        let now = at(1, 12, 0, 0);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| h.lifecycle.ensure_drink_perk(MATCH, now).unwrap());
            }
        });
        let perk = h.store.get_drink_perk(MATCH).unwrap().unwrap();
        assert_eq!(perk.perk_state(), PerkState::Locked);
    }

    #[test]
    fn redeem_rejects_bad_tokens() {
        let h = harness();
        locked_date(&h);
        let err = h.lifecycle.redeem_perk(MATCH, "nope", at(1, 19, 0, 0)).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);

        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();
        let t1 = t0 + Duration::minutes(2);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t1), t1).unwrap();

        let err = h.lifecycle.redeem_perk(MATCH, "nope", t1).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);

        let token = h.store.get_unlock_token(MATCH).unwrap().unwrap();
        let expired = t1 + Duration::hours(2);
        let err = h.lifecycle.redeem_perk(MATCH, &token.token, expired).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidArgument);

        let ok = h.lifecycle.redeem_perk(MATCH, &token.token, t1 + Duration::minutes(5)).unwrap();
        assert_eq!(ok.value.perk_state(), PerkState::Redeemed);
        let replay = h.lifecycle.redeem_perk(MATCH, &token.token, t1 + Duration::minutes(6)).unwrap();
        assert!(replay.effects.is_empty());
        assert_eq!(replay.value.redeemed_at, Some(t1 + Duration::minutes(5)));
    }

    #[test]
    fn cancelled_date_resets_an_unredeemed_perk() {
        let h = harness();
        locked_date(&h);
        let t0 = at(1, 19, 5, 0);
        h.lifecycle.evaluate_perk(MATCH, USER_1, &both_near(t0), t0).unwrap();

        let outcome = h.lifecycle.cancel_date(MATCH, USER_1, t0 + Duration::seconds(30)).unwrap();
        assert!(outcome.effects.contains(&Effect::CloseHandshake { match_id: MATCH, reason: "date_cancelled" }));

        let perk = h.store.get_drink_perk(MATCH).unwrap().unwrap();
        assert_eq!(perk.perk_state(), PerkState::Locked);
        assert!(perk.together_since.is_none());
    }

    #[test]
    fn next_step_is_pure() {
        let perk = DrinkPerk {
            match_id: MATCH,
            state: "armed".into(),
            together_since: Some(at(1, 19, 0, 0)),
            ready_at: None,
            redeemed_at: None,
            updated_at: at(1, 19, 0, 0),
        };
        let together = Proximity::Together { distance_m: 3.0 };
        let dwell = Duration::seconds(120);
        assert_eq!(next_step(&perk, together, at(1, 19, 1, 59), dwell), PerkStep::Unchanged);
        assert_eq!(next_step(&perk, together, at(1, 19, 2, 0), dwell), PerkStep::Ready);
        assert_eq!(next_step(&perk, Proximity::Unknown, at(1, 19, 2, 0), dwell), PerkStep::ClearDwell);

        let redeemed = DrinkPerk { state: "redeemed".into(), ..perk };
        assert_eq!(next_step(&redeemed, together, at(1, 19, 5, 0), dwell), PerkStep::Unchanged);
    }
}
