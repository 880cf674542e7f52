use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    blocks, conversation_states, date_plans, drink_perks, ledger_entries, match_messages,
    matches, unlock_tokens, wallets,
};

// --- Status enums (stored as varchar) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Expired,
    Archived,
}

impl TerminalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for TerminalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expired" => Ok(Self::Expired),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown terminal state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStatus {
    #[default]
    None,
    Proposed,
    Locked,
    Unlocked,
    Expired,
}

impl DateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Proposed => "proposed",
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Expired => "expired",
        }
    }

    /// A proposal or an accepted date that has not happened yet.
    pub fn is_pending_date(&self) -> bool {
        matches!(self, Self::Proposed | Self::Locked)
    }
}

impl std::str::FromStr for DateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "proposed" => Ok(Self::Proposed),
            "locked" => Ok(Self::Locked),
            "unlocked" => Ok(Self::Unlocked),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("unknown date status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    #[default]
    Pending,
    Spent,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Spent => "spent",
        }
    }
}

impl std::str::FromStr for CreditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "spent" => Ok(Self::Spent),
            _ => Err(format!("unknown credit status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerkState {
    #[default]
    Locked,
    Armed,
    Ready,
    Redeemed,
}

impl PerkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Armed => "armed",
            Self::Ready => "ready",
            Self::Redeemed => "redeemed",
        }
    }
}

impl std::str::FromStr for PerkState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "locked" => Ok(Self::Locked),
            "armed" => Ok(Self::Armed),
            "ready" => Ok(Self::Ready),
            "redeemed" => Ok(Self::Redeemed),
            _ => Err(format!("unknown perk state: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Media,
    System,
    Hint,
    Feedback,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Media => "media",
            Self::System => "system",
            Self::Hint => "hint",
            Self::Feedback => "feedback",
        }
    }

    /// Kinds the service writes itself; they never count as conversation.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::System | Self::Hint | Self::Feedback)
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "media" => Ok(Self::Media),
            "system" => Ok(Self::System),
            "hint" => Ok(Self::Hint),
            "feedback" => Ok(Self::Feedback),
            _ => Err(format!("unknown message kind: {s}")),
        }
    }
}

// --- Match ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    /// The other participant. Callers must have checked `involves` first.
    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.user_a_id == user_id {
            self.user_b_id
        } else {
            self.user_a_id
        }
    }

    pub fn participants(&self) -> [Uuid; 2] {
        [self.user_a_id, self.user_b_id]
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = matches)]
pub struct NewMatch {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// --- Block ---

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = blocks)]
pub struct NewBlock {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
}

// --- ConversationState ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = conversation_states, primary_key(match_id))]
pub struct ConversationState {
    pub match_id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub decision_started_for_user_id: Option<Uuid>,
    pub decision_started_at: Option<DateTime<Utc>>,
    pub decision_expires_at: Option<DateTime<Utc>>,
    pub active_at: Option<DateTime<Utc>>,
    pub terminal_state: Option<String>,
    pub terminal_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn terminal(&self) -> Option<TerminalState> {
        self.terminal_state.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn is_active(&self) -> bool {
        self.active_at.is_some()
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = conversation_states)]
pub struct NewConversationState {
    pub match_id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// --- MatchMessage ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone)]
#[diesel(table_name = match_messages)]
pub struct MatchMessage {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub kind: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = match_messages)]
pub struct NewMatchMessage {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub kind: String,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- DatePlan ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = date_plans, primary_key(match_id))]
pub struct DatePlan {
    pub match_id: Uuid,
    pub date_status: String,
    pub proposed_by_user_id: Option<Uuid>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub activity_label: Option<String>,
    pub place_label: Option<String>,
    pub place_id: Option<String>,
    pub credit_amount_cents: i64,
    pub credit_status: String,
    pub credit_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DatePlan {
    pub fn status(&self) -> DateStatus {
        self.date_status.parse().unwrap_or_default()
    }

    pub fn credit(&self) -> CreditStatus {
        self.credit_status.parse().unwrap_or_default()
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = date_plans)]
pub struct NewDatePlan {
    pub match_id: Uuid,
    pub date_status: String,
    pub credit_status: String,
    pub updated_at: DateTime<Utc>,
}

/// Full replacement of the mutable plan columns; `None` writes NULL.
#[derive(Debug, AsChangeset, Clone, PartialEq)]
#[diesel(table_name = date_plans, treat_none_as_null = true)]
pub struct DatePlanChanges {
    pub date_status: String,
    pub proposed_by_user_id: Option<Uuid>,
    pub date_start: Option<DateTime<Utc>>,
    pub date_end: Option<DateTime<Utc>>,
    pub activity_label: Option<String>,
    pub place_label: Option<String>,
    pub place_id: Option<String>,
    pub credit_amount_cents: i64,
    pub credit_status: String,
    pub credit_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DatePlanChanges {
    /// Starts from the plan as stored, so a transition only edits what it names.
    pub fn from_plan(plan: &DatePlan, now: DateTime<Utc>) -> Self {
        Self {
            date_status: plan.date_status.clone(),
            proposed_by_user_id: plan.proposed_by_user_id,
            date_start: plan.date_start,
            date_end: plan.date_end,
            activity_label: plan.activity_label.clone(),
            place_label: plan.place_label.clone(),
            place_id: plan.place_id.clone(),
            credit_amount_cents: plan.credit_amount_cents,
            credit_status: plan.credit_status.clone(),
            credit_expires_at: plan.credit_expires_at,
            updated_at: now,
        }
    }

    pub fn status(&self) -> DateStatus {
        self.date_status.parse().unwrap_or_default()
    }
}

// --- DrinkPerk ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = drink_perks, primary_key(match_id))]
pub struct DrinkPerk {
    pub match_id: Uuid,
    pub state: String,
    pub together_since: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DrinkPerk {
    pub fn perk_state(&self) -> PerkState {
        self.state.parse().unwrap_or_default()
    }
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = drink_perks)]
pub struct NewDrinkPerk {
    pub match_id: Uuid,
    pub state: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, AsChangeset, Clone, PartialEq)]
#[diesel(table_name = drink_perks, treat_none_as_null = true)]
pub struct DrinkPerkChanges {
    pub state: String,
    pub together_since: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DrinkPerkChanges {
    pub fn from_perk(perk: &DrinkPerk, now: DateTime<Utc>) -> Self {
        Self {
            state: perk.state.clone(),
            together_since: perk.together_since,
            ready_at: perk.ready_at,
            redeemed_at: perk.redeemed_at,
            updated_at: now,
        }
    }

    pub fn perk_state(&self) -> PerkState {
        self.state.parse().unwrap_or_default()
    }
}

// --- UnlockToken ---

#[derive(Debug, Queryable, Identifiable, Insertable, Serialize, Clone, PartialEq)]
#[diesel(table_name = unlock_tokens, primary_key(match_id))]
pub struct UnlockToken {
    pub match_id: Uuid,
    pub token: String,
    pub unlocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

impl UnlockToken {
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.redeemed_at.is_none() && self.expires_at > now
    }
}

// --- Wallet & ledger ---

#[derive(Debug, Queryable, Identifiable, Serialize, Clone, PartialEq)]
#[diesel(table_name = wallets, primary_key(user_id))]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = wallets)]
pub struct NewWallet {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Clone)]
#[diesel(table_name = ledger_entries)]
pub struct NewLedgerEntry {
    pub id: Uuid,
    pub idempotency_key: String,
    pub user_id: Uuid,
    pub match_id: Option<Uuid>,
    pub delta_cents: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
