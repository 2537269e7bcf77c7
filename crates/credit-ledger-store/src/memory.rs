//! In-memory storage backend.
//!
//! A transaction takes the store-wide lock for its whole lifetime and works
//! on a copy of the state; commit swaps the copy in. Transactions therefore
//! run one at a time, which gives the same per-account serialization the
//! PostgreSQL backend gets from row locks.
//!
//! Every `begin` clones the whole state, events and ledger lines included, so
//! even a read-only listing costs O(total rows). Fine for tests and small
//! tools; use [`PgStore`](crate::PgStore) for anything that grows.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use credit_ledger_core::{
    AccountId, AgentId, CreditAccount, CreditEvent, CreditTransaction, Credits, EventId,
    OwnerType, TransactionId, UpstreamType,
};

use crate::error::{Result, StoreError};
use crate::query::{EventQuery, SortOrder, TransactionQuery};
use crate::{AgentQuota, LedgerTx, Store};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, CreditAccount>,
    owners: HashMap<(OwnerType, String), AccountId>,
    events: BTreeMap<EventId, CreditEvent>,
    upstream: HashMap<(UpstreamType, String), EventId>,
    transactions: BTreeMap<TransactionId, CreditTransaction>,
    agent_quotas: HashMap<AgentId, AgentQuota>,
}

/// In-memory store.
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn get_account(
        &mut self,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> Result<Option<CreditAccount>> {
        let state = &self.working;
        Ok(state
            .owners
            .get(&(owner_type, owner_id.to_string()))
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn get_account_by_id(&mut self, account_id: &AccountId) -> Result<Option<CreditAccount>> {
        Ok(self.working.accounts.get(account_id).cloned())
    }

    async fn insert_account(&mut self, account: &CreditAccount) -> Result<CreditAccount> {
        let key = (account.owner_type, account.owner_id.clone());
        if let Some(existing) = self
            .working
            .owners
            .get(&key)
            .and_then(|id| self.working.accounts.get(id))
        {
            return Ok(existing.clone());
        }

        self.working.owners.insert(key, account.id);
        self.working.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn update_account(&mut self, account: &CreditAccount) -> Result<()> {
        let stored = self
            .working
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account.id.to_string(),
            })?;
        *stored = account.clone();
        Ok(())
    }

    async fn list_refill_candidates(&mut self) -> Result<Vec<CreditAccount>> {
        let mut candidates: Vec<CreditAccount> = self
            .working
            .accounts
            .values()
            .filter(|a| a.refill_amount.is_positive() && a.balance.free < a.free_quota)
            .cloned()
            .collect();
        candidates.sort_by_key(|a| a.id);
        Ok(candidates)
    }

    async fn find_event_by_upstream(
        &mut self,
        upstream_type: UpstreamType,
        upstream_tx_id: &str,
    ) -> Result<Option<CreditEvent>> {
        let state = &self.working;
        Ok(state
            .upstream
            .get(&(upstream_type, upstream_tx_id.to_string()))
            .and_then(|id| state.events.get(id))
            .cloned())
    }

    async fn find_event_by_upstream_tx_id(
        &mut self,
        upstream_tx_id: &str,
    ) -> Result<Option<CreditEvent>> {
        Ok(self
            .working
            .events
            .values()
            .find(|e| e.upstream_tx_id == upstream_tx_id)
            .cloned())
    }

    async fn get_event(&mut self, event_id: &EventId) -> Result<Option<CreditEvent>> {
        Ok(self.working.events.get(event_id).cloned())
    }

    async fn get_events(&mut self, event_ids: &[EventId]) -> Result<Vec<CreditEvent>> {
        Ok(event_ids
            .iter()
            .filter_map(|id| self.working.events.get(id))
            .cloned()
            .collect())
    }

    async fn insert_event(&mut self, event: &CreditEvent) -> Result<()> {
        let key = (event.upstream_type, event.upstream_tx_id.clone());
        if self.working.upstream.contains_key(&key) {
            return Err(StoreError::DuplicateEvent {
                upstream_type: event.upstream_type,
                upstream_tx_id: event.upstream_tx_id.clone(),
            });
        }
        if !self.working.accounts.contains_key(&event.account_id) {
            return Err(StoreError::Database(format!(
                "event {} references unknown account {}",
                event.id, event.account_id
            )));
        }

        self.working.upstream.insert(key, event.id);
        self.working.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn update_event_note(
        &mut self,
        event_id: &EventId,
        note: Option<&str>,
    ) -> Result<CreditEvent> {
        let event = self
            .working
            .events
            .get_mut(event_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "event",
                id: event_id.to_string(),
            })?;
        event.note = note.map(str::to_string);
        Ok(event.clone())
    }

    async fn list_events(&mut self, query: &EventQuery) -> Result<Vec<CreditEvent>> {
        let matching = self.working.events.values().filter(|e| query.matches(e));
        let events: Vec<CreditEvent> = match query.order {
            SortOrder::Ascending => matching.take(query.limit).cloned().collect(),
            SortOrder::Descending => matching.rev().take(query.limit).cloned().collect(),
        };
        Ok(events)
    }

    async fn insert_transactions(&mut self, transactions: &[CreditTransaction]) -> Result<()> {
        for tx in transactions {
            if !self.working.events.contains_key(&tx.event_id) {
                return Err(StoreError::Database(format!(
                    "transaction {} references unknown event {}",
                    tx.id, tx.event_id
                )));
            }
            self.working.transactions.insert(tx.id, tx.clone());
        }
        Ok(())
    }

    async fn list_transactions(
        &mut self,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .rev()
            .filter(|tx| query.matches(tx))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn list_transactions_by_event(
        &mut self,
        event_id: &EventId,
    ) -> Result<Vec<CreditTransaction>> {
        Ok(self
            .working
            .transactions
            .values()
            .filter(|tx| tx.event_id == *event_id)
            .cloned()
            .collect())
    }

    async fn add_agent_free_income(
        &mut self,
        agent_id: &AgentId,
        amount: Credits,
        day: NaiveDate,
    ) -> Result<Credits> {
        let quota = self
            .working
            .agent_quotas
            .entry(agent_id.clone())
            .or_insert_with(|| AgentQuota {
                agent_id: agent_id.clone(),
                free_income_daily: Credits::ZERO,
                day,
            });
        if quota.day != day {
            quota.day = day;
            quota.free_income_daily = Credits::ZERO;
        }
        quota.free_income_daily += amount;
        Ok(quota.free_income_daily)
    }

    async fn get_agent_quota(&mut self, agent_id: &AgentId) -> Result<Option<AgentQuota>> {
        Ok(self.working.agent_quotas.get(agent_id).cloned())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_core::{CreditKind, Direction, EventType};

    fn event_for(account: &CreditAccount, upstream_tx_id: &str) -> CreditEvent {
        let mut event = CreditEvent::new(
            EventType::Recharge,
            Direction::Income,
            UpstreamType::Api,
            upstream_tx_id,
            account.id,
        );
        event.set_transfer(CreditKind::Permanent, Credits::whole(1));
        event
    }

    #[tokio::test]
    async fn insert_account_is_get_or_create() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        let first = tx
            .insert_account(&CreditAccount::new(OwnerType::User, "u1"))
            .await
            .unwrap();
        let second = tx
            .insert_account(&CreditAccount::new(OwnerType::User, "u1"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_account(&CreditAccount::new(OwnerType::User, "u1"))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_account(OwnerType::User, "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_account(&CreditAccount::new(OwnerType::Agent, "a1"))
                .await
                .unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_account(OwnerType::Agent, "a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_upstream_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let account = tx
            .insert_account(&CreditAccount::new(OwnerType::User, "u1"))
            .await
            .unwrap();

        tx.insert_event(&event_for(&account, "tx-1")).await.unwrap();
        let result = tx.insert_event(&event_for(&account, "tx-1")).await;

        assert!(matches!(result, Err(StoreError::DuplicateEvent { .. })));
    }

    #[tokio::test]
    async fn list_events_both_orders() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let account = tx
            .insert_account(&CreditAccount::new(OwnerType::User, "u1"))
            .await
            .unwrap();
        let events: Vec<CreditEvent> = (0..5)
            .map(|i| event_for(&account, &format!("tx-{i}")))
            .collect();
        for event in &events {
            tx.insert_event(event).await.unwrap();
        }

        let newest = tx
            .list_events(&EventQuery {
                account_id: Some(account.id),
                limit: 2,
                ..EventQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(newest.iter().map(|e| e.id).collect::<Vec<_>>(), vec![events[4].id, events[3].id]);

        let oldest = tx
            .list_events(&EventQuery {
                order: SortOrder::Ascending,
                cursor: Some(events[0].id),
                limit: 2,
                ..EventQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(oldest.iter().map(|e| e.id).collect::<Vec<_>>(), vec![events[1].id, events[2].id]);
    }

    #[tokio::test]
    async fn agent_free_income_resets_daily() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let agent = AgentId::new("a1");
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();

        tx.add_agent_free_income(&agent, Credits::whole(2), day).await.unwrap();
        let same_day = tx.add_agent_free_income(&agent, Credits::whole(3), day).await.unwrap();
        assert_eq!(same_day, Credits::whole(5));

        let reset = tx
            .add_agent_free_income(&agent, Credits::whole(1), next_day)
            .await
            .unwrap();
        assert_eq!(reset, Credits::whole(1));
    }
}
