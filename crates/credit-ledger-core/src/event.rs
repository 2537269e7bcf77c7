//! Credit events.
//!
//! A `CreditEvent` is the immutable audit record of one billable or manual
//! operation. It carries the full fee decomposition, both as totals and split
//! by credit kind, so any charge can be explained after the fact without
//! replaying account state. Only the `note` may change after insertion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, AgentId, EventId, UserId};
use crate::kind::{CreditKind, KindAmounts};
use crate::money::Credits;

str_enum! {
    /// What kind of operation produced an event.
    pub enum EventType {
        /// An LLM message.
        Message => "message",
        /// A skill invocation.
        SkillCall => "skill_call",
        /// A memory summarization.
        Memory => "memory",
        /// Permanent credits purchased.
        Recharge => "recharge",
        /// Generic reward grant.
        Reward => "reward",
        /// Reward for taking part in an event.
        EventReward => "event_reward",
        /// Bonus granted alongside a recharge.
        RechargeBonus => "recharge_bonus",
        /// Agent earnings paid out.
        Withdraw => "withdraw",
        /// Manual correction.
        Adjustment => "adjustment",
        /// Scheduled free credit refill.
        Refill => "refill",
    }
}

str_enum! {
    /// Whether an event adds to or takes from the primary account.
    pub enum Direction {
        /// Credits flow into the account.
        Income => "income",
        /// Credits flow out of the account.
        Expense => "expense",
    }
}

str_enum! {
    /// The system that originated a request; half of the idempotency key.
    pub enum UpstreamType {
        /// Admin or public API.
        Api => "api",
        /// Periodic jobs.
        Scheduler => "scheduler",
        /// The agent executor.
        Executor => "executor",
        /// One-off initialization scripts.
        Initializer => "initializer",
    }
}

str_enum! {
    /// Flavour of a reward grant.
    pub enum RewardType {
        /// Generic reward.
        Reward => "reward",
        /// Reward for taking part in an event.
        EventReward => "event_reward",
        /// Bonus granted alongside a recharge.
        RechargeBonus => "recharge_bonus",
    }
}

impl From<RewardType> for EventType {
    fn from(value: RewardType) -> Self {
        match value {
            RewardType::Reward => Self::Reward,
            RewardType::EventReward => Self::EventReward,
            RewardType::RechargeBonus => Self::RechargeBonus,
        }
    }
}

/// An amount together with how it was paid across the credit kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountSplit {
    /// Total of the leg.
    pub amount: Credits,
    /// Per-kind breakdown; sums to `amount`.
    pub by_kind: KindAmounts,
}

impl AmountSplit {
    /// A leg with no amount.
    pub const ZERO: Self = Self {
        amount: Credits::ZERO,
        by_kind: KindAmounts::ZERO,
    };

    /// Build a leg from its per-kind breakdown.
    #[must_use]
    pub fn from_kinds(by_kind: KindAmounts) -> Self {
        Self {
            amount: by_kind.total(),
            by_kind,
        }
    }
}

/// Audit record of one billable or manual operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEvent {
    /// Time-ordered event id.
    pub id: EventId,
    /// Operation that produced the event.
    pub event_type: EventType,
    /// Income or expense, from the primary account's point of view.
    pub direction: Direction,
    /// Originating system.
    pub upstream_type: UpstreamType,
    /// Idempotency key within `upstream_type`.
    pub upstream_tx_id: String,
    /// Primary account (the payer for expenses).
    pub account_id: AccountId,
    /// User involved, if any.
    pub user_id: Option<UserId>,
    /// Agent involved, if any.
    pub agent_id: Option<AgentId>,
    /// First message of the conversation turn.
    pub start_message_id: Option<String>,
    /// Message being billed.
    pub message_id: Option<String>,
    /// Model the agent ran with.
    pub model: Option<String>,
    /// Skill call being billed.
    pub skill_call_id: Option<String>,
    /// Skill being billed.
    pub skill_name: Option<String>,
    /// Total moved from or to the primary account.
    pub total_amount: Credits,
    /// Dominant kind used.
    pub credit_type: Option<CreditKind>,
    /// Every kind touched.
    pub credit_types: Vec<CreditKind>,
    /// Primary account's total balance after the operation.
    pub balance_after: Credits,
    /// Base cost after discount, split by kind.
    pub base: AmountSplit,
    /// Base cost before discount.
    pub base_original_amount: Credits,
    /// Discount applied to the base cost.
    pub base_discount_amount: Credits,
    /// LLM part of the original base cost.
    pub base_llm_amount: Credits,
    /// Skill part of the original base cost.
    pub base_skill_amount: Credits,
    /// Platform fee.
    pub fee_platform: AmountSplit,
    /// Skill developer fee.
    pub fee_dev: AmountSplit,
    /// Account that received the developer fee.
    pub fee_dev_account: Option<AccountId>,
    /// Agent owner fee.
    pub fee_agent: AmountSplit,
    /// Account that received the agent fee.
    pub fee_agent_account: Option<AccountId>,
    /// Total moved per kind.
    pub paid: KindAmounts,
    /// Free-form operator note.
    pub note: Option<String>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl CreditEvent {
    /// Start an event with a fresh id and every amount zero.
    #[must_use]
    pub fn new(
        event_type: EventType,
        direction: Direction,
        upstream_type: UpstreamType,
        upstream_tx_id: impl Into<String>,
        account_id: AccountId,
    ) -> Self {
        Self {
            id: EventId::generate(),
            event_type,
            direction,
            upstream_type,
            upstream_tx_id: upstream_tx_id.into(),
            account_id,
            user_id: None,
            agent_id: None,
            start_message_id: None,
            message_id: None,
            model: None,
            skill_call_id: None,
            skill_name: None,
            total_amount: Credits::ZERO,
            credit_type: None,
            credit_types: Vec::new(),
            balance_after: Credits::ZERO,
            base: AmountSplit::ZERO,
            base_original_amount: Credits::ZERO,
            base_discount_amount: Credits::ZERO,
            base_llm_amount: Credits::ZERO,
            base_skill_amount: Credits::ZERO,
            fee_platform: AmountSplit::ZERO,
            fee_dev: AmountSplit::ZERO,
            fee_dev_account: None,
            fee_agent: AmountSplit::ZERO,
            fee_agent_account: None,
            paid: KindAmounts::ZERO,
            note: None,
            created_at: Utc::now(),
        }
    }

    /// Record a transfer of a single kind: total, base and paid all equal `amount`.
    pub fn set_transfer(&mut self, kind: CreditKind, amount: Credits) {
        let by_kind = KindAmounts::single(kind, amount);
        self.total_amount = amount;
        self.credit_type = Some(kind);
        self.credit_types = vec![kind];
        self.base = AmountSplit::from_kinds(by_kind);
        self.base_original_amount = amount;
        self.paid = by_kind;
    }

    /// Check the fee decomposition: legs add up to the total, and per kind
    /// the legs add up to what that kind paid.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        let legs = [self.base, self.fee_platform, self.fee_dev, self.fee_agent];
        let total: Credits = legs.iter().map(|leg| leg.amount).sum();
        let by_kind = legs
            .iter()
            .fold(KindAmounts::ZERO, |acc, leg| acc + leg.by_kind);

        total == self.total_amount
            && by_kind == self.paid
            && self.paid.total() == self.total_amount
            && legs.iter().all(|leg| leg.by_kind.total() == leg.amount)
    }
}
