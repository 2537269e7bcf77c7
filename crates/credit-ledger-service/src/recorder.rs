//! Idempotency guard and event recording.

use credit_ledger_core::{
    CreditDebit, CreditEvent, CreditTransaction, Credits, LedgerError, Result, UpstreamType,
};
use credit_ledger_store::LedgerTx;

/// Reject a request whose idempotency key has already been used.
///
/// Runs inside the caller's transaction before any write. The unique index
/// on the key still catches a concurrent insert that slips past this check;
/// [`record`] reports it as the same error.
///
/// # Errors
///
/// Returns `DuplicateTransaction` if an event holds the key.
pub async fn ensure_unique(
    tx: &mut dyn LedgerTx,
    upstream_type: UpstreamType,
    upstream_tx_id: &str,
) -> Result<()> {
    if upstream_tx_id.trim().is_empty() {
        return Err(LedgerError::validation("upstream_tx_id must not be empty"));
    }
    if tx
        .find_event_by_upstream(upstream_type, upstream_tx_id)
        .await?
        .is_some()
    {
        tracing::warn!(
            upstream_type = %upstream_type,
            upstream_tx_id = %upstream_tx_id,
            "Rejected duplicate upstream transaction"
        );
        return Err(LedgerError::DuplicateTransaction {
            upstream_type,
            upstream_tx_id: upstream_tx_id.to_string(),
        });
    }
    Ok(())
}

/// Insert an event and its ledger lines.
///
/// # Errors
///
/// Returns `DuplicateTransaction` if the event's key was taken concurrently,
/// `Validation` if the lines do not balance, or an error if the store fails.
pub async fn record(
    tx: &mut dyn LedgerTx,
    event: &CreditEvent,
    transactions: &[CreditTransaction],
) -> Result<()> {
    check_balanced(transactions)?;
    tx.insert_event(event).await?;
    if !transactions.is_empty() {
        tx.insert_transactions(transactions).await?;
    }
    Ok(())
}

/// Debits and credits of one event must sum to the same amount.
fn check_balanced(transactions: &[CreditTransaction]) -> Result<()> {
    let (credit, debit) = transactions.iter().fold(
        (Credits::ZERO, Credits::ZERO),
        |(credit, debit), line| match line.credit_debit {
            CreditDebit::Credit => (credit + line.change_amount, debit),
            CreditDebit::Debit => (credit, debit + line.change_amount),
        },
    );
    if credit != debit {
        return Err(LedgerError::validation(format!(
            "unbalanced ledger lines: credit={credit}, debit={debit}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_core::{
        AccountId, CreditAccount, CreditKind, Direction, EventType, KindAmounts,
        OwnerType, TransactionType,
    };
    use credit_ledger_store::{MemoryStore, Store};

    #[tokio::test]
    async fn second_use_of_a_key_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let account = tx
            .insert_account(&CreditAccount::new(OwnerType::User, "u1"))
            .await
            .unwrap();

        ensure_unique(tx.as_mut(), UpstreamType::Api, "tx-1").await.unwrap();
        let mut event = CreditEvent::new(
            EventType::Recharge,
            Direction::Income,
            UpstreamType::Api,
            "tx-1",
            account.id,
        );
        event.set_transfer(CreditKind::Permanent, Credits::whole(1));
        record(tx.as_mut(), &event, &[]).await.unwrap();

        let again = ensure_unique(tx.as_mut(), UpstreamType::Api, "tx-1").await;
        assert!(matches!(again, Err(LedgerError::DuplicateTransaction { .. })));

        // Same id from another upstream is a different key.
        ensure_unique(tx.as_mut(), UpstreamType::Executor, "tx-1")
            .await
            .unwrap();

        let racing = CreditEvent::new(
            EventType::Recharge,
            Direction::Income,
            UpstreamType::Api,
            "tx-1",
            account.id,
        );
        let result = record(tx.as_mut(), &racing, &[]).await;
        assert!(matches!(result, Err(LedgerError::DuplicateTransaction { .. })));
    }

    #[test]
    fn unbalanced_lines_are_refused() {
        let event_id = credit_ledger_core::EventId::generate();
        let lines = [
            CreditTransaction::credit(
                AccountId::generate(),
                event_id,
                TransactionType::Recharge,
                Some(CreditKind::Permanent),
                KindAmounts::single(CreditKind::Permanent, Credits::whole(2)),
            ),
            CreditTransaction::debit(
                AccountId::generate(),
                event_id,
                TransactionType::Recharge,
                Some(CreditKind::Permanent),
                KindAmounts::single(CreditKind::Permanent, Credits::whole(1)),
            ),
        ];
        assert!(matches!(check_balanced(&lines), Err(LedgerError::Validation(_))));
        assert!(check_balanced(&lines[..0]).is_ok());
    }
}
