//! Account operations.
//!
//! Every function takes the open transaction and never commits. Accounts are
//! loaded through the transaction, which locks the row until the caller
//! commits or rolls back.

use credit_ledger_core::{
    CreditAccount, CreditKind, Credits, DeductionPolicy, EventId, KindAmounts, LedgerError,
    OwnerType, PaymentSettings, Result, UserId,
};
use credit_ledger_store::LedgerTx;

/// Account operations bound to the defaults for newly created accounts.
#[derive(Debug, Clone, Copy)]
pub struct Accounts<'a> {
    settings: &'a PaymentSettings,
}

impl<'a> Accounts<'a> {
    /// Use `settings` for the quota of new user accounts.
    #[must_use]
    pub const fn new(settings: &'a PaymentSettings) -> Self {
        Self { settings }
    }

    /// Get an account, creating it if the owner has none yet.
    ///
    /// New user accounts start with the configured free quota and refill
    /// amount; agent and platform accounts get neither. Balances start at zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_or_create(
        &self,
        tx: &mut dyn LedgerTx,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> Result<CreditAccount> {
        if let Some(account) = tx.get_account(owner_type, owner_id).await? {
            return Ok(account);
        }

        let mut account = CreditAccount::new(owner_type, owner_id);
        if owner_type == OwnerType::User {
            account = account.with_quota(
                self.settings.default_free_quota,
                self.settings.default_refill_amount,
            );
        }
        let account = tx.insert_account(&account).await?;

        tracing::debug!(
            account_id = %account.id,
            owner_type = %owner_type,
            owner_id = %owner_id,
            "Created credit account"
        );
        Ok(account)
    }

    /// Add `amounts` to an account.
    ///
    /// A split charge leg may carry a rounding offset of one unit between
    /// kinds, so only the total has to be non-negative.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the amounts sum to less than zero, or an error
    /// if the store fails.
    pub async fn income(
        &self,
        tx: &mut dyn LedgerTx,
        owner_type: OwnerType,
        owner_id: &str,
        amounts: &KindAmounts,
        event_id: EventId,
    ) -> Result<CreditAccount> {
        if amounts.total().is_negative() {
            return Err(LedgerError::validation("income total must not be negative"));
        }

        let mut account = self.get_or_create(tx, owner_type, owner_id).await?;
        account.apply_income(amounts, event_id);
        tx.update_account(&account).await?;
        Ok(account)
    }

    /// Subtract `amount` from one credit kind.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a negative amount, `InsufficientBalance`
    /// under [`DeductionPolicy::RequireFunds`] when the kind cannot cover it,
    /// or an error if the store fails.
    #[allow(clippy::too_many_arguments)]
    pub async fn deduction(
        &self,
        tx: &mut dyn LedgerTx,
        owner_type: OwnerType,
        owner_id: &str,
        kind: CreditKind,
        amount: Credits,
        event_id: EventId,
        policy: DeductionPolicy,
    ) -> Result<CreditAccount> {
        if amount.is_negative() {
            return Err(LedgerError::validation("deduction amount must not be negative"));
        }

        let mut account = self.get_or_create(tx, owner_type, owner_id).await?;
        account.apply_deduction(kind, amount, event_id, policy)?;
        tx.update_account(&account).await?;
        Ok(account)
    }

    /// Consume `amount` from an account, free credits first, then reward,
    /// then permanent. Returns the updated account and what each kind paid.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientCredits` if the three kinds together are short,
    /// or an error if the store fails.
    pub async fn expense(
        &self,
        tx: &mut dyn LedgerTx,
        owner_type: OwnerType,
        owner_id: &str,
        amount: Credits,
        event_id: EventId,
    ) -> Result<(CreditAccount, KindAmounts)> {
        let mut account = self.get_or_create(tx, owner_type, owner_id).await?;
        let paid = account.apply_expense(amount, event_id)?;
        tx.update_account(&account).await?;
        Ok((account, paid))
    }

    /// Change a user's free quota and/or hourly refill amount.
    ///
    /// The change is logged with `upstream_tx_id` and `note`; no event is
    /// recorded because balances do not move.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if neither value is given, a value is negative,
    /// or the note is empty.
    pub async fn update_daily_quota(
        &self,
        tx: &mut dyn LedgerTx,
        user_id: &UserId,
        free_quota: Option<Credits>,
        refill_amount: Option<Credits>,
        upstream_tx_id: &str,
        note: &str,
    ) -> Result<CreditAccount> {
        if free_quota.is_none() && refill_amount.is_none() {
            return Err(LedgerError::validation(
                "at least one of free_quota or refill_amount is required",
            ));
        }
        if [free_quota, refill_amount]
            .into_iter()
            .flatten()
            .any(|value| value.is_negative())
        {
            return Err(LedgerError::validation("quota values must not be negative"));
        }
        if note.trim().is_empty() {
            return Err(LedgerError::validation("a note is required"));
        }

        let mut account = self
            .get_or_create(tx, OwnerType::User, user_id.as_str())
            .await?;
        let previous = (account.free_quota, account.refill_amount);

        if let Some(free_quota) = free_quota {
            account.free_quota = free_quota;
        }
        if let Some(refill_amount) = refill_amount {
            account.refill_amount = refill_amount;
        }
        account.updated_at = chrono::Utc::now();
        tx.update_account(&account).await?;

        tracing::info!(
            user_id = %user_id,
            upstream_tx_id = %upstream_tx_id,
            old_free_quota = %previous.0,
            new_free_quota = %account.free_quota,
            old_refill_amount = %previous.1,
            new_refill_amount = %account.refill_amount,
            note = %note,
            "Daily quota updated"
        );
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_store::{MemoryStore, Store};

    #[tokio::test]
    async fn new_user_gets_default_quota() {
        let store = MemoryStore::new();
        let settings = PaymentSettings::default();
        let accounts = Accounts::new(&settings);
        let mut tx = store.begin().await.unwrap();

        let user = accounts
            .get_or_create(tx.as_mut(), OwnerType::User, "u1")
            .await
            .unwrap();
        assert_eq!(user.free_quota, settings.default_free_quota);
        assert_eq!(user.refill_amount, settings.default_refill_amount);
        assert_eq!(user.total_balance(), Credits::ZERO);

        let agent = accounts
            .get_or_create(tx.as_mut(), OwnerType::Agent, "a1")
            .await
            .unwrap();
        assert_eq!(agent.free_quota, Credits::ZERO);
        assert_eq!(agent.refill_amount, Credits::ZERO);

        let again = accounts
            .get_or_create(tx.as_mut(), OwnerType::User, "u1")
            .await
            .unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn quota_update_requires_a_field_and_a_note() {
        let store = MemoryStore::new();
        let settings = PaymentSettings::default();
        let accounts = Accounts::new(&settings);
        let mut tx = store.begin().await.unwrap();
        let user = UserId::new("u1");

        let none = accounts
            .update_daily_quota(tx.as_mut(), &user, None, None, "q1", "note")
            .await;
        assert!(matches!(none, Err(LedgerError::Validation(_))));

        let no_note = accounts
            .update_daily_quota(tx.as_mut(), &user, Some(Credits::whole(5)), None, "q1", "  ")
            .await;
        assert!(matches!(no_note, Err(LedgerError::Validation(_))));

        let negative = accounts
            .update_daily_quota(tx.as_mut(), &user, None, Some(Credits::whole(-1)), "q1", "x")
            .await;
        assert!(matches!(negative, Err(LedgerError::Validation(_))));

        let account = accounts
            .update_daily_quota(tx.as_mut(), &user, None, Some(Credits::whole(5)), "q1", "tune")
            .await
            .unwrap();
        assert_eq!(account.refill_amount, Credits::whole(5));
        assert_eq!(account.free_quota, settings.default_free_quota);
    }

    #[tokio::test]
    async fn failed_expense_leaves_balance_alone() {
        let store = MemoryStore::new();
        let settings = PaymentSettings::default();
        let accounts = Accounts::new(&settings);
        let mut tx = store.begin().await.unwrap();

        accounts
            .income(
                tx.as_mut(),
                OwnerType::User,
                "u1",
                &KindAmounts::single(CreditKind::Permanent, Credits::whole(2)),
                EventId::generate(),
            )
            .await
            .unwrap();

        let result = accounts
            .expense(tx.as_mut(), OwnerType::User, "u1", Credits::whole(3), EventId::generate())
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientCredits { .. })));

        let account = tx.get_account(OwnerType::User, "u1").await.unwrap().unwrap();
        assert_eq!(account.balance.permanent, Credits::whole(2));
    }
}
