//! Hourly free credit refill.

use serde::{Deserialize, Serialize};

use credit_ledger_core::{
    sinks, AccountId, CreditEvent, CreditKind, CreditTransaction, DeductionPolicy, Direction,
    EventId, EventType, KindAmounts, LedgerError, OwnerType, PaymentSettings, Result,
    TransactionType, UpstreamType, UserId,
};
use credit_ledger_store::{LedgerTx, Store};

use crate::accounts::Accounts;
use crate::recorder;

/// Outcome of one refill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillReport {
    /// Accounts below their free quota when the run started.
    pub candidates: usize,
    /// Accounts that received credits.
    pub refilled: usize,
    /// Accounts whose refill failed and was rolled back.
    pub failed: usize,
}

/// Top up one account's free credits toward its quota.
///
/// Re-reads the account under lock, so a stale candidate list is harmless.
/// Adds `min(refill_amount, free_quota - free_credits)` and returns the
/// refill event, or `None` if nothing was due.
///
/// # Errors
///
/// Returns `NotFound` if the account doesn't exist, or an error if the store
/// fails.
pub async fn refill_free_credits_for_account(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    account_id: &AccountId,
) -> Result<Option<CreditEvent>> {
    let account = tx
        .get_account_by_id(account_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("account", account_id))?;

    let Some(amount) = account.refill_due() else {
        return Ok(None);
    };

    let accounts = Accounts::new(settings);
    let mut event = CreditEvent::new(
        EventType::Refill,
        Direction::Income,
        UpstreamType::Scheduler,
        EventId::generate().to_string(),
        account.id,
    );
    let event_id = event.id;
    let by_kind = KindAmounts::single(CreditKind::Free, amount);

    let account = accounts
        .income(tx, account.owner_type, &account.owner_id, &by_kind, event_id)
        .await?;
    let sink = accounts
        .deduction(
            tx,
            OwnerType::Platform,
            sinks::REFILL,
            CreditKind::Free,
            amount,
            event_id,
            DeductionPolicy::AllowNegative,
        )
        .await?;

    event.set_transfer(CreditKind::Free, amount);
    if account.owner_type == OwnerType::User {
        event.user_id = Some(UserId::new(account.owner_id.clone()));
    }
    event.balance_after = account.total_balance();
    event.note = Some(format!("Hourly free credits refill of {amount}"));

    let transactions = [
        CreditTransaction::credit(
            account.id,
            event_id,
            TransactionType::Refill,
            Some(CreditKind::Free),
            by_kind,
        ),
        CreditTransaction::debit(
            sink.id,
            event_id,
            TransactionType::Refill,
            Some(CreditKind::Free),
            by_kind,
        ),
    ];
    recorder::record(tx, &event, &transactions).await?;

    tracing::info!(
        account_id = %account.id,
        owner_id = %account.owner_id,
        amount = %amount,
        free_credits = %account.balance.free,
        free_quota = %account.free_quota,
        "Free credits refilled"
    );
    Ok(Some(event))
}

/// Refill every account below its free quota.
///
/// Each account runs in its own transaction; a failure is logged and rolled
/// back without stopping the run.
///
/// # Errors
///
/// Returns an error only if the candidate list cannot be read.
pub async fn refill_all_free_credits(
    store: &dyn Store,
    settings: &PaymentSettings,
) -> Result<RefillReport> {
    let candidates = {
        let mut tx = store.begin().await?;
        let candidates = tx.list_refill_candidates().await?;
        tx.rollback().await?;
        candidates
    };

    let mut report = RefillReport {
        candidates: candidates.len(),
        ..RefillReport::default()
    };

    for account in candidates {
        let mut tx = match store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                report.failed += 1;
                tracing::error!(account_id = %account.id, error = %e, "Refill transaction failed to open");
                continue;
            }
        };
        match refill_free_credits_for_account(tx.as_mut(), settings, &account.id).await {
            Ok(Some(_)) => match tx.commit().await {
                Ok(()) => report.refilled += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(account_id = %account.id, error = %e, "Refill commit failed");
                }
            },
            Ok(None) => {
                if let Err(e) = tx.rollback().await {
                    tracing::warn!(account_id = %account.id, error = %e, "Rollback failed");
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(account_id = %account.id, error = %e, "Error refilling account");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(account_id = %account.id, error = %rollback_err, "Rollback failed");
                }
            }
        }
    }

    tracing::info!(
        candidates = report.candidates,
        refilled = report.refilled,
        failed = report.failed,
        "Refill run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_core::{CreditAccount, Credits};
    use credit_ledger_store::MemoryStore;

    #[tokio::test]
    async fn refill_stops_at_quota() {
        let store = MemoryStore::new();
        let settings = PaymentSettings::default();

        let mut account = CreditAccount::new(OwnerType::User, "u1")
            .with_quota(Credits::whole(10), Credits::whole(5));
        account.balance.free = Credits::whole(8);
        let mut tx = store.begin().await.unwrap();
        let account = tx.insert_account(&account).await.unwrap();

        let event = refill_free_credits_for_account(tx.as_mut(), &settings, &account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.total_amount, Credits::whole(2));
        assert_eq!(event.note.as_deref(), Some("Hourly free credits refill of 2.0000"));
        assert_eq!(event.upstream_type, UpstreamType::Scheduler);

        let again = refill_free_credits_for_account(tx.as_mut(), &settings, &account.id)
            .await
            .unwrap();
        assert!(again.is_none());

        let sink = tx
            .get_account(OwnerType::Platform, sinks::REFILL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sink.balance.free, Credits::whole(-2));
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = refill_free_credits_for_account(
            tx.as_mut(),
            &PaymentSettings::default(),
            &AccountId::generate(),
        )
        .await;
        assert!(matches!(result, Err(LedgerError::NotFound { entity: "account", .. })));
    }
}
