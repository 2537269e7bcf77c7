//! Credit accounts.
//!
//! One account exists per `(owner_type, owner_id)`. The mutation methods here
//! are pure; the service crate loads an account under a row lock, applies one
//! of them, and writes the result back in the same transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ids::{AccountId, EventId};
use crate::kind::{CreditKind, KindAmounts};
use crate::money::Credits;

str_enum! {
    /// Who owns an account.
    pub enum OwnerType {
        /// An end user.
        User => "user",
        /// An AI agent (earns agent fees, can withdraw to its owner).
        Agent => "agent",
        /// A platform bookkeeping account.
        Platform => "platform",
    }
}

/// Owner ids of the platform sink accounts.
///
/// Each holds the counter-leg of one kind of operation. Sinks model platform
/// liabilities and are allowed to go negative.
pub mod sinks {
    /// Counter-leg of recharges.
    pub const RECHARGE: &str = "platform_recharge";
    /// Counter-leg of refills.
    pub const REFILL: &str = "platform_refill";
    /// Counter-leg of adjustments.
    pub const ADJUSTMENT: &str = "platform_adjustment";
    /// Counter-leg of rewards.
    pub const REWARD: &str = "platform_reward";
    /// Receives the base cost of LLM messages.
    pub const MESSAGE: &str = "platform_message";
    /// Receives the base cost of skill calls.
    pub const SKILL: &str = "platform_skill";
    /// Receives the base cost of memory summarization.
    pub const MEMORY: &str = "platform_memory";
    /// Receives platform fees.
    pub const FEE: &str = "platform_fee";
    /// Receives developer fees for skills without an author.
    pub const DEV: &str = "platform_dev";
    /// Receives withdrawn agent earnings.
    pub const WITHDRAW: &str = "platform_withdraw";
}

/// Whether a single-kind deduction may take a balance below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeductionPolicy {
    /// Sink legs and adjustments.
    AllowNegative,
    /// Fail with `InsufficientBalance` if the kind cannot cover the amount.
    RequireFunds,
}

/// A balance holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    /// Account id.
    pub id: AccountId,
    /// Owner category.
    pub owner_type: OwnerType,
    /// Owner id within the category.
    pub owner_id: String,
    /// Current balance per kind.
    pub balance: KindAmounts,
    /// Ceiling the hourly refill tops free credits up to.
    pub free_quota: Credits,
    /// Free credits added per refill.
    pub refill_amount: Credits,
    /// Lifetime income per kind.
    pub total_income: KindAmounts,
    /// Lifetime expense per kind.
    pub total_expense: KindAmounts,
    /// Last event that touched the account.
    pub last_event_id: Option<EventId>,
    /// Last income.
    pub income_at: Option<DateTime<Utc>>,
    /// Last expense.
    pub expense_at: Option<DateTime<Utc>>,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    /// Create an account with zero balances and no refill.
    #[must_use]
    pub fn new(owner_type: OwnerType, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            owner_type,
            owner_id: owner_id.into(),
            balance: KindAmounts::ZERO,
            free_quota: Credits::ZERO,
            refill_amount: Credits::ZERO,
            total_income: KindAmounts::ZERO,
            total_expense: KindAmounts::ZERO,
            last_event_id: None,
            income_at: None,
            expense_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the free quota and refill amount.
    #[must_use]
    pub fn with_quota(mut self, free_quota: Credits, refill_amount: Credits) -> Self {
        self.free_quota = free_quota;
        self.refill_amount = refill_amount;
        self
    }

    /// Total balance across all kinds.
    #[must_use]
    pub fn total_balance(&self) -> Credits {
        self.balance.total()
    }

    /// Add `amounts` to the balance and to lifetime income.
    pub fn apply_income(&mut self, amounts: &KindAmounts, event_id: EventId) {
        let now = Utc::now();
        self.balance += *amounts;
        self.total_income += *amounts;
        self.last_event_id = Some(event_id);
        self.income_at = Some(now);
        self.updated_at = now;
    }

    /// Subtract `amount` from one kind and add it to lifetime expense.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientBalance` under `RequireFunds` if the kind's
    /// balance is below `amount`.
    pub fn apply_deduction(
        &mut self,
        kind: CreditKind,
        amount: Credits,
        event_id: EventId,
        policy: DeductionPolicy,
    ) -> Result<()> {
        let available = self.balance.get(kind);
        if policy == DeductionPolicy::RequireFunds && available < amount {
            return Err(LedgerError::InsufficientBalance {
                kind,
                available,
                required: amount,
            });
        }

        let now = Utc::now();
        *self.balance.get_mut(kind) -= amount;
        *self.total_expense.get_mut(kind) += amount;
        self.last_event_id = Some(event_id);
        self.expense_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Consume `amount` in priority order (free, reward, permanent) and
    /// return what each kind paid.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a negative amount and `InsufficientCredits`
    /// if the sum of all three kinds is below `amount`. Only positive kinds
    /// are drawn on. The account is unchanged on error.
    pub fn apply_expense(&mut self, amount: Credits, event_id: EventId) -> Result<KindAmounts> {
        if amount.is_negative() {
            return Err(LedgerError::validation("expense amount must not be negative"));
        }
        let available = self.total_balance();
        if available < amount {
            return Err(LedgerError::InsufficientCredits {
                available,
                required: amount,
            });
        }

        let mut remaining = amount;
        let mut paid = KindAmounts::ZERO;
        for kind in CreditKind::CONSUMPTION_ORDER {
            if remaining.is_zero() {
                break;
            }
            let take = self.balance.get(kind).positive_part().min(remaining);
            *paid.get_mut(kind) = take;
            remaining -= take;
        }

        let now = Utc::now();
        self.balance -= paid;
        self.total_expense += paid;
        self.last_event_id = Some(event_id);
        self.expense_at = Some(now);
        self.updated_at = now;
        Ok(paid)
    }

    /// Free credits a refill would add right now, if any.
    ///
    /// Never more than `refill_amount`, never past `free_quota`.
    #[must_use]
    pub fn refill_due(&self) -> Option<Credits> {
        if !self.refill_amount.is_positive() || self.balance.free >= self.free_quota {
            return None;
        }
        let amount = self.refill_amount.min(self.free_quota - self.balance.free);
        amount.is_positive().then_some(amount)
    }
}
