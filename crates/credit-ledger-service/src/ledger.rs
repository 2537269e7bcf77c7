//! Transactional facade over the ledger operations.
//!
//! Each method opens one store transaction, runs the operation, and commits.
//! On error the transaction is rolled back, so nothing partially applies.

use std::sync::Arc;

use credit_ledger_core::{
    AccountId, AgentBilling, AgentId, CreditAccount, CreditDebit, CreditEvent, CreditKind,
    Credits, EventId, OwnerType, PaymentSettings, PricingConfig, Result, RewardType,
    TransactionId, TransactionType, UserId,
};
use credit_ledger_store::{LedgerTx, Store};

use crate::accounts::Accounts;
use crate::agents::AgentDirectory;
use crate::config::ServiceConfig;
use crate::expense::{self, MessageCharge, SkillCharge, SkillCost};
use crate::manual::{self, Settlement};
use crate::query::{self, EventFilter, FeedPage, Page, TransactionWithEvent};
use crate::refill::{self, RefillReport};

/// The credit ledger.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
    settings: Arc<PaymentSettings>,
    pricing: Arc<PricingConfig>,
    agents: Arc<dyn AgentDirectory>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("settings", &self.settings)
            .field("skills", &self.pricing.len())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create a ledger.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        settings: PaymentSettings,
        pricing: PricingConfig,
        agents: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
            pricing: Arc::new(pricing),
            agents,
        }
    }

    /// Create a ledger from service configuration.
    #[must_use]
    pub fn from_config(
        store: Arc<dyn Store>,
        config: &ServiceConfig,
        agents: Arc<dyn AgentDirectory>,
    ) -> Self {
        Self::new(store, config.payment.clone(), config.pricing.clone(), agents)
    }

    /// Payment settings in effect.
    #[must_use]
    pub fn settings(&self) -> &PaymentSettings {
        &self.settings
    }

    /// Skill price catalogue.
    #[must_use]
    pub fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        Ok(self.store.begin().await?)
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Get an account, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_or_create_account(
        &self,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> Result<CreditAccount> {
        let mut tx = self.begin().await?;
        let result = Accounts::new(&self.settings)
            .get_or_create(tx.as_mut(), owner_type, owner_id)
            .await;
        finish(tx, result).await
    }

    /// Change a user's free quota and/or refill amount.
    ///
    /// # Errors
    ///
    /// See [`Accounts::update_daily_quota`].
    pub async fn update_daily_quota(
        &self,
        user_id: &UserId,
        free_quota: Option<Credits>,
        refill_amount: Option<Credits>,
        upstream_tx_id: &str,
        note: &str,
    ) -> Result<CreditAccount> {
        let mut tx = self.begin().await?;
        let result = Accounts::new(&self.settings)
            .update_daily_quota(
                tx.as_mut(),
                user_id,
                free_quota,
                refill_amount,
                upstream_tx_id,
                note,
            )
            .await;
        finish(tx, result).await
    }

    // =========================================================================
    // Expenses
    // =========================================================================

    /// Bill an LLM message.
    ///
    /// # Errors
    ///
    /// See [`expense::expense_message`].
    pub async fn expense_message(&self, charge: &MessageCharge) -> Result<CreditEvent> {
        let mut tx = self.begin().await?;
        let result = expense::expense_message(tx.as_mut(), &self.settings, charge).await;
        finish(tx, result).await
    }

    /// Bill a skill call.
    ///
    /// # Errors
    ///
    /// See [`expense::expense_skill`].
    pub async fn expense_skill(&self, charge: &SkillCharge) -> Result<CreditEvent> {
        let mut tx = self.begin().await?;
        let result =
            expense::expense_skill(tx.as_mut(), &self.settings, &self.pricing, charge).await;
        finish(tx, result).await
    }

    /// Bill a memory summarization.
    ///
    /// # Errors
    ///
    /// See [`expense::expense_summarize`].
    pub async fn expense_summarize(&self, charge: &MessageCharge) -> Result<CreditEvent> {
        let mut tx = self.begin().await?;
        let result = expense::expense_summarize(tx.as_mut(), &self.settings, charge).await;
        finish(tx, result).await
    }

    /// Price a skill call without charging it.
    ///
    /// # Errors
    ///
    /// See [`expense::skill_cost`].
    pub fn skill_cost(
        &self,
        skill_name: &str,
        payer: &UserId,
        agent: &AgentBilling,
    ) -> Result<SkillCost> {
        expense::skill_cost(&self.settings, &self.pricing, skill_name, payer, agent)
    }

    // =========================================================================
    // Manual operations
    // =========================================================================

    /// Add permanent credits to a user.
    ///
    /// # Errors
    ///
    /// See [`manual::recharge`].
    pub async fn recharge(
        &self,
        user_id: &UserId,
        amount: Credits,
        upstream_tx_id: &str,
        note: Option<&str>,
    ) -> Result<Settlement> {
        let mut tx = self.begin().await?;
        let result =
            manual::recharge(tx.as_mut(), &self.settings, user_id, amount, upstream_tx_id, note)
                .await;
        finish(tx, result).await
    }

    /// Add reward credits to a user.
    ///
    /// # Errors
    ///
    /// See [`manual::reward`].
    pub async fn reward(
        &self,
        user_id: &UserId,
        amount: Credits,
        upstream_tx_id: &str,
        reward_type: RewardType,
        note: Option<&str>,
    ) -> Result<Settlement> {
        let mut tx = self.begin().await?;
        let result = manual::reward(
            tx.as_mut(),
            &self.settings,
            user_id,
            amount,
            upstream_tx_id,
            reward_type,
            note,
        )
        .await;
        finish(tx, result).await
    }

    /// Withdraw an agent's permanent earnings.
    ///
    /// # Errors
    ///
    /// See [`manual::withdraw`].
    pub async fn withdraw(
        &self,
        agent_id: &AgentId,
        amount: Credits,
        upstream_tx_id: &str,
        note: Option<&str>,
    ) -> Result<Settlement> {
        let mut tx = self.begin().await?;
        let result = manual::withdraw(
            tx.as_mut(),
            &self.settings,
            self.agents.as_ref(),
            agent_id,
            amount,
            upstream_tx_id,
            note,
        )
        .await;
        finish(tx, result).await
    }

    /// Adjust one credit kind of a user by a signed amount.
    ///
    /// # Errors
    ///
    /// See [`manual::adjustment`].
    pub async fn adjustment(
        &self,
        user_id: &UserId,
        kind: CreditKind,
        amount: Credits,
        upstream_tx_id: &str,
        note: &str,
    ) -> Result<Settlement> {
        let mut tx = self.begin().await?;
        let result = manual::adjustment(
            tx.as_mut(),
            &self.settings,
            user_id,
            kind,
            amount,
            upstream_tx_id,
            note,
        )
        .await;
        finish(tx, result).await
    }

    // =========================================================================
    // Refill
    // =========================================================================

    /// Refill one account.
    ///
    /// # Errors
    ///
    /// See [`refill::refill_free_credits_for_account`].
    pub async fn refill_free_credits_for_account(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<CreditEvent>> {
        let mut tx = self.begin().await?;
        let result =
            refill::refill_free_credits_for_account(tx.as_mut(), &self.settings, account_id)
                .await;
        finish(tx, result).await
    }

    /// Refill every account below its free quota, one transaction each.
    ///
    /// # Errors
    ///
    /// Returns an error only if the candidate list cannot be read.
    pub async fn refill_all_free_credits(&self) -> Result<RefillReport> {
        refill::refill_all_free_credits(self.store.as_ref(), &self.settings).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// A user's events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_events_by_user(
        &self,
        user_id: &UserId,
        filter: &EventFilter,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<CreditEvent, EventId>> {
        let mut tx = self.begin().await?;
        let result = query::list_events_by_user(tx.as_mut(), user_id, filter, cursor, limit).await;
        finish(tx, result).await
    }

    /// An agent's own events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_events_by_agent(
        &self,
        agent_id: &AgentId,
        filter: &EventFilter,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<CreditEvent, EventId>> {
        let mut tx = self.begin().await?;
        let result =
            query::list_events_by_agent(tx.as_mut(), agent_id, filter, cursor, limit).await;
        finish(tx, result).await
    }

    /// Events in which an agent earned a fee, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_fee_events_by_agent(
        &self,
        agent_id: &AgentId,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<CreditEvent, EventId>> {
        let mut tx = self.begin().await?;
        let result = query::list_fee_events_by_agent(tx.as_mut(), agent_id, cursor, limit).await;
        finish(tx, result).await
    }

    /// Admin feed, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_credit_events(
        &self,
        filter: &EventFilter,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<FeedPage> {
        let mut tx = self.begin().await?;
        let result = query::list_credit_events(tx.as_mut(), filter, cursor, limit).await;
        finish(tx, result).await
    }

    /// A user's ledger lines with their events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        tx_types: &[TransactionType],
        credit_debit: Option<CreditDebit>,
        cursor: Option<TransactionId>,
        limit: usize,
    ) -> Result<Page<TransactionWithEvent, TransactionId>> {
        let mut tx = self.begin().await?;
        let result = query::list_transactions_by_user(
            tx.as_mut(),
            user_id,
            tx_types,
            credit_debit,
            cursor,
            limit,
        )
        .await;
        finish(tx, result).await
    }

    /// An event by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such event exists.
    pub async fn fetch_event_by_id(&self, event_id: &EventId) -> Result<CreditEvent> {
        let mut tx = self.begin().await?;
        let result = query::fetch_event_by_id(tx.as_mut(), event_id).await;
        finish(tx, result).await
    }

    /// The oldest event carrying an upstream transaction id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such event exists.
    pub async fn fetch_event_by_upstream_tx_id(&self, upstream_tx_id: &str) -> Result<CreditEvent> {
        let mut tx = self.begin().await?;
        let result = query::fetch_event_by_upstream_tx_id(tx.as_mut(), upstream_tx_id).await;
        finish(tx, result).await
    }

    /// Replace an event's note.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such event exists.
    pub async fn update_event_note(
        &self,
        event_id: &EventId,
        note: Option<&str>,
    ) -> Result<CreditEvent> {
        let mut tx = self.begin().await?;
        let result = query::update_event_note(tx.as_mut(), event_id, note).await;
        finish(tx, result).await
    }
}

/// Commit on success, roll back on error.
async fn finish<T>(tx: Box<dyn LedgerTx>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
