//! Credit transactions (ledger lines).
//!
//! Each event writes one transaction per account it touched. Across the
//! transactions of one event, debits and credits sum to the same amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::RewardType;
use crate::ids::{AccountId, EventId, TransactionId};
use crate::kind::{CreditKind, KindAmounts};
use crate::money::Credits;

str_enum! {
    /// What a ledger line records.
    pub enum TransactionType {
        /// Payer side of an expense.
        Pay => "pay",
        /// Base cost of an LLM message.
        ReceiveBaseLlm => "receive_base_llm",
        /// Base cost of a skill call.
        ReceiveBaseSkill => "receive_base_skill",
        /// Base cost of a memory summarization.
        ReceiveBaseMemory => "receive_base_memory",
        /// Skill developer fee.
        ReceiveFeeDev => "receive_fee_dev",
        /// Agent owner fee.
        ReceiveFeeAgent => "receive_fee_agent",
        /// Platform fee.
        ReceiveFeePlatform => "receive_fee_platform",
        /// Recharge, both sides.
        Recharge => "recharge",
        /// Manual adjustment, both sides.
        Adjustment => "adjustment",
        /// Scheduled refill, both sides.
        Refill => "refill",
        /// Agent withdrawal, both sides.
        Withdraw => "withdraw",
        /// Generic reward, both sides.
        Reward => "reward",
        /// Event reward, both sides.
        EventReward => "event_reward",
        /// Recharge bonus, both sides.
        RechargeBonus => "recharge_bonus",
    }
}

impl From<RewardType> for TransactionType {
    fn from(value: RewardType) -> Self {
        match value {
            RewardType::Reward => Self::Reward,
            RewardType::EventReward => Self::EventReward,
            RewardType::RechargeBonus => Self::RechargeBonus,
        }
    }
}

str_enum! {
    /// Side of a ledger line.
    pub enum CreditDebit {
        /// Credits added to the account.
        Credit => "credit",
        /// Credits removed from the account.
        Debit => "debit",
    }
}

/// One account's side of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Time-ordered transaction id.
    pub id: TransactionId,
    /// Account the line applies to.
    pub account_id: AccountId,
    /// Event the line belongs to.
    pub event_id: EventId,
    /// What the line records.
    pub tx_type: TransactionType,
    /// Credit or debit.
    pub credit_debit: CreditDebit,
    /// Unsigned amount moved.
    pub change_amount: Credits,
    /// Dominant kind of the event.
    pub credit_type: Option<CreditKind>,
    /// Per-kind breakdown of `change_amount`.
    pub by_kind: KindAmounts,
    /// When the line was written.
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build a ledger line whose amount is the total of `by_kind`.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        event_id: EventId,
        tx_type: TransactionType,
        credit_debit: CreditDebit,
        credit_type: Option<CreditKind>,
        by_kind: KindAmounts,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            event_id,
            tx_type,
            credit_debit,
            change_amount: by_kind.total(),
            credit_type,
            by_kind,
            created_at: Utc::now(),
        }
    }

    /// A credit line.
    #[must_use]
    pub fn credit(
        account_id: AccountId,
        event_id: EventId,
        tx_type: TransactionType,
        credit_type: Option<CreditKind>,
        by_kind: KindAmounts,
    ) -> Self {
        Self::new(account_id, event_id, tx_type, CreditDebit::Credit, credit_type, by_kind)
    }

    /// A debit line.
    #[must_use]
    pub fn debit(
        account_id: AccountId,
        event_id: EventId,
        tx_type: TransactionType,
        credit_type: Option<CreditKind>,
        by_kind: KindAmounts,
    ) -> Self {
        Self::new(account_id, event_id, tx_type, CreditDebit::Debit, credit_type, by_kind)
    }

    /// Signed effect on the account: positive for credits.
    #[must_use]
    pub fn signed_amount(&self) -> Credits {
        match self.credit_debit {
            CreditDebit::Credit => self.change_amount,
            CreditDebit::Debit => -self.change_amount,
        }
    }
}
