//! Common test utilities for credit ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use rust_decimal_macros::dec;

use credit_ledger_core::{
    sinks, AgentBilling, CreditAccount, CreditTransaction, Credits, EventId, KindAmounts,
    OwnerType, PaymentSettings, PricingConfig, SkillPrice, UserId,
};
use credit_ledger_service::{Ledger, MessageCharge, SkillCharge, StaticAgentDirectory};
use credit_ledger_store::{LedgerTx as _, MemoryStore, Store};

/// Agent with an owner and a 10% fee.
pub const AGENT: &str = "agent-1";
/// Owner of [`AGENT`].
pub const OWNER: &str = "owner-1";
/// Agent with an owner and no fee.
pub const FREE_AGENT: &str = "agent-2";
/// Agent without an owner.
pub const ORPHAN: &str = "orphan";
/// Author of the `web_search` skill.
pub const SKILL_AUTHOR: &str = "dev-1";

/// Every platform sink.
pub const SINKS: [&str; 10] = [
    sinks::RECHARGE,
    sinks::REFILL,
    sinks::ADJUSTMENT,
    sinks::REWARD,
    sinks::MESSAGE,
    sinks::SKILL,
    sinks::MEMORY,
    sinks::FEE,
    sinks::DEV,
    sinks::WITHDRAW,
];

/// Test harness around a ledger on an in-memory store.
pub struct TestHarness {
    /// The ledger under test.
    pub ledger: Ledger,
    /// The store behind it, for direct inspection.
    pub store: MemoryStore,
}

impl TestHarness {
    /// Create a harness with default payment settings.
    pub fn new() -> Self {
        Self::with_settings(PaymentSettings::default())
    }

    /// Create a harness with custom payment settings.
    pub fn with_settings(settings: PaymentSettings) -> Self {
        let store = MemoryStore::new();

        let pricing = PricingConfig::from_skills([
            SkillPrice::new("web_search", "search")
                .with_prices(Credits::whole(10), Credits::whole(5))
                .with_author(UserId::new(SKILL_AUTHOR)),
            SkillPrice::new("calculator", "math"),
        ]);

        let agents: StaticAgentDirectory = [
            AgentBilling::new(AGENT)
                .with_owner(OWNER)
                .with_fee_percentage(dec!(10))
                .with_model("gpt-4o"),
            AgentBilling::new(FREE_AGENT).with_owner(OWNER),
            AgentBilling::new(ORPHAN),
        ]
        .into_iter()
        .collect();

        let ledger = Ledger::new(Arc::new(store.clone()), settings, pricing, Arc::new(agents));

        Self { ledger, store }
    }

    /// Billing snapshot of an agent from the harness directory.
    pub fn agent(id: &str) -> AgentBilling {
        match id {
            AGENT => AgentBilling::new(AGENT)
                .with_owner(OWNER)
                .with_fee_percentage(dec!(10))
                .with_model("gpt-4o"),
            FREE_AGENT => AgentBilling::new(FREE_AGENT).with_owner(OWNER),
            other => AgentBilling::new(other),
        }
    }

    /// A message charge by `payer` through `agent`.
    pub fn message(payer: &str, message_id: &str, base: Credits, agent: &str) -> MessageCharge {
        MessageCharge {
            payer: UserId::new(payer),
            message_id: message_id.to_string(),
            start_message_id: message_id.to_string(),
            base_llm_amount: base,
            agent: Self::agent(agent),
        }
    }

    /// A skill charge by `payer` through `agent`.
    pub fn skill(payer: &str, message_id: &str, call_id: &str, skill: &str, agent: &str) -> SkillCharge {
        SkillCharge {
            payer: UserId::new(payer),
            message_id: message_id.to_string(),
            start_message_id: message_id.to_string(),
            skill_call_id: call_id.to_string(),
            skill_name: skill.to_string(),
            agent: Self::agent(agent),
        }
    }

    /// Give a user permanent credits.
    pub async fn fund(&self, user: &str, amount: i64) {
        self.ledger
            .recharge(
                &UserId::new(user),
                Credits::whole(amount),
                &format!("fund-{user}-{}", EventId::generate()),
                None,
            )
            .await
            .expect("Failed to fund user");
    }

    /// Read an account without creating it.
    pub async fn account(&self, owner_type: OwnerType, owner_id: &str) -> Option<CreditAccount> {
        let mut tx = self.store.begin().await.expect("Failed to begin");
        let account = tx
            .get_account(owner_type, owner_id)
            .await
            .expect("Failed to read account");
        tx.rollback().await.expect("Failed to roll back");
        account
    }

    /// Balance of an account, zero if it doesn't exist.
    pub async fn balance(&self, owner_type: OwnerType, owner_id: &str) -> KindAmounts {
        self.account(owner_type, owner_id)
            .await
            .map_or(KindAmounts::ZERO, |account| account.balance)
    }

    /// Ledger lines of one event.
    pub async fn transactions(&self, event_id: &EventId) -> Vec<CreditTransaction> {
        let mut tx = self.store.begin().await.expect("Failed to begin");
        let lines = tx
            .list_transactions_by_event(event_id)
            .await
            .expect("Failed to list transactions");
        tx.rollback().await.expect("Failed to roll back");
        lines
    }

    /// Sum of the balances of every platform sink and the given owners.
    pub async fn total_balance(&self, users: &[&str], agents: &[&str]) -> KindAmounts {
        let mut total = KindAmounts::ZERO;
        for sink in SINKS {
            total += self.balance(OwnerType::Platform, sink).await;
        }
        for user in users {
            total += self.balance(OwnerType::User, user).await;
        }
        for agent in agents {
            total += self.balance(OwnerType::Agent, agent).await;
        }
        total
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a decimal credit amount.
pub fn credits(value: rust_decimal::Decimal) -> Credits {
    Credits::new(value)
}
