//! Event and transaction listings.
//!
//! Owner listings run newest first and return a cursor only when another
//! page exists. The admin feed runs oldest first and always returns a cursor,
//! so a poller can resume from it even when a page comes back empty.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use credit_ledger_core::{
    AccountId, AgentId, CreditDebit, CreditEvent, CreditTransaction, Direction, EventId,
    EventType, LedgerError, OwnerType, Result, TransactionId, TransactionType, UserId,
};
use credit_ledger_store::{EventQuery, LedgerTx, SortOrder, StoreError, TransactionQuery};

/// Largest page a listing returns.
pub const MAX_PAGE_SIZE: usize = 100;

/// Optional event filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Income or expense.
    pub direction: Option<Direction>,
    /// Event type.
    pub event_type: Option<EventType>,
    /// Inclusive lower bound on creation time.
    pub start_at: Option<DateTime<Utc>>,
    /// Exclusive upper bound on creation time.
    pub end_at: Option<DateTime<Utc>>,
}

/// One page of a newest-first listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T, C> {
    /// Items, newest first.
    pub items: Vec<T>,
    /// Cursor for the next page, set only when `has_more`.
    pub next_cursor: Option<C>,
    /// Whether another page exists.
    pub has_more: bool,
}

impl<T, C> Page<T, C> {
    /// A page with nothing in it.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// One page of the admin event feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    /// Events, oldest first.
    pub items: Vec<CreditEvent>,
    /// Where to resume; never absent.
    pub next_cursor: EventId,
    /// Whether more events were already waiting past this page.
    pub has_more: bool,
}

/// A ledger line with the event that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWithEvent {
    /// The ledger line.
    pub transaction: CreditTransaction,
    /// Its event, if still present.
    pub event: Option<CreditEvent>,
}

/// Clamp a requested page size to `1..=MAX_PAGE_SIZE`.
#[must_use]
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_PAGE_SIZE)
}

/// A user's events, newest first.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_events_by_user(
    tx: &mut dyn LedgerTx,
    user_id: &UserId,
    filter: &EventFilter,
    cursor: Option<EventId>,
    limit: usize,
) -> Result<Page<CreditEvent, EventId>> {
    list_owner_events(tx, OwnerType::User, user_id.as_str(), filter, cursor, limit).await
}

/// An agent's own events (withdrawals), newest first.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_events_by_agent(
    tx: &mut dyn LedgerTx,
    agent_id: &AgentId,
    filter: &EventFilter,
    cursor: Option<EventId>,
    limit: usize,
) -> Result<Page<CreditEvent, EventId>> {
    list_owner_events(tx, OwnerType::Agent, agent_id.as_str(), filter, cursor, limit).await
}

/// Events in which an agent earned a fee, newest first.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_fee_events_by_agent(
    tx: &mut dyn LedgerTx,
    agent_id: &AgentId,
    cursor: Option<EventId>,
    limit: usize,
) -> Result<Page<CreditEvent, EventId>> {
    let Some(account) = tx.get_account(OwnerType::Agent, agent_id.as_str()).await? else {
        return Ok(Page::empty());
    };
    let limit = clamp_limit(limit);
    let query = EventQuery {
        fee_agent_account: Some(account.id),
        cursor,
        limit: limit + 1,
        ..EventQuery::default()
    };
    let events = tx.list_events(&query).await?;
    Ok(paginate(events, limit, |event| event.id))
}

/// Admin feed of all events, oldest first, continuing after `cursor`.
///
/// `filter.direction` defaults to expense. The returned cursor is the last
/// returned id, else the incoming cursor, else the zero id. `has_more` tells
/// a poller to fetch again right away instead of waiting.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_credit_events(
    tx: &mut dyn LedgerTx,
    filter: &EventFilter,
    cursor: Option<EventId>,
    limit: usize,
) -> Result<FeedPage> {
    let limit = clamp_limit(limit);
    let query = EventQuery {
        direction: Some(filter.direction.unwrap_or(Direction::Expense)),
        event_type: filter.event_type,
        start_at: filter.start_at,
        end_at: filter.end_at,
        cursor,
        order: SortOrder::Ascending,
        limit: limit + 1,
        ..EventQuery::default()
    };
    let mut items = tx.list_events(&query).await?;
    let has_more = items.len() > limit;
    items.truncate(limit);
    let next_cursor = items
        .last()
        .map(|event| event.id)
        .or(cursor)
        .unwrap_or_else(EventId::nil);
    Ok(FeedPage {
        items,
        next_cursor,
        has_more,
    })
}

/// A user's ledger lines, newest first, each paired with its event.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn list_transactions_by_user(
    tx: &mut dyn LedgerTx,
    user_id: &UserId,
    tx_types: &[TransactionType],
    credit_debit: Option<CreditDebit>,
    cursor: Option<TransactionId>,
    limit: usize,
) -> Result<Page<TransactionWithEvent, TransactionId>> {
    let Some(account) = tx.get_account(OwnerType::User, user_id.as_str()).await? else {
        return Ok(Page::empty());
    };
    let limit = clamp_limit(limit);
    let query = TransactionQuery {
        tx_types: tx_types.to_vec(),
        credit_debit,
        cursor,
        ..TransactionQuery::for_account(account.id, limit + 1)
    };
    let lines = tx.list_transactions(&query).await?;
    let page = paginate(lines, limit, |line| line.id);

    let event_ids: Vec<EventId> = page.items.iter().map(|line| line.event_id).collect();
    let events: HashMap<EventId, CreditEvent> = tx
        .get_events(&event_ids)
        .await?
        .into_iter()
        .map(|event| (event.id, event))
        .collect();

    let items = page
        .items
        .into_iter()
        .map(|transaction| TransactionWithEvent {
            event: events.get(&transaction.event_id).cloned(),
            transaction,
        })
        .collect();

    Ok(Page {
        items,
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    })
}

/// An event by id.
///
/// # Errors
///
/// Returns `NotFound` if no such event exists.
pub async fn fetch_event_by_id(tx: &mut dyn LedgerTx, event_id: &EventId) -> Result<CreditEvent> {
    tx.get_event(event_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", event_id))
}

/// The oldest event carrying `upstream_tx_id`, from any upstream.
///
/// # Errors
///
/// Returns `NotFound` if no such event exists.
pub async fn fetch_event_by_upstream_tx_id(
    tx: &mut dyn LedgerTx,
    upstream_tx_id: &str,
) -> Result<CreditEvent> {
    tx.find_event_by_upstream_tx_id(upstream_tx_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("event", upstream_tx_id))
}

/// Replace an event's note. `None` clears it.
///
/// # Errors
///
/// Returns `NotFound` if no such event exists.
pub async fn update_event_note(
    tx: &mut dyn LedgerTx,
    event_id: &EventId,
    note: Option<&str>,
) -> Result<CreditEvent> {
    let event = tx
        .update_event_note(event_id, note)
        .await
        .map_err(|e| match e {
            StoreError::NotFound { .. } => LedgerError::not_found("event", event_id),
            other => other.into(),
        })?;
    tracing::info!(event_id = %event_id, "Event note updated");
    Ok(event)
}

async fn list_owner_events(
    tx: &mut dyn LedgerTx,
    owner_type: OwnerType,
    owner_id: &str,
    filter: &EventFilter,
    cursor: Option<EventId>,
    limit: usize,
) -> Result<Page<CreditEvent, EventId>> {
    let Some(account) = tx.get_account(owner_type, owner_id).await? else {
        return Ok(Page::empty());
    };
    let limit = clamp_limit(limit);
    let events = tx.list_events(&owner_query(account.id, filter, cursor, limit + 1)).await?;
    Ok(paginate(events, limit, |event| event.id))
}

fn owner_query(
    account_id: AccountId,
    filter: &EventFilter,
    cursor: Option<EventId>,
    limit: usize,
) -> EventQuery {
    EventQuery {
        account_id: Some(account_id),
        direction: filter.direction,
        event_type: filter.event_type,
        start_at: filter.start_at,
        end_at: filter.end_at,
        cursor,
        order: SortOrder::Descending,
        limit,
        ..EventQuery::default()
    }
}

/// Cut a `limit + 1` fetch down to `limit` items.
fn paginate<T, C>(mut rows: Vec<T>, limit: usize, id: impl Fn(&T) -> C) -> Page<T, C> {
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    let next_cursor = if has_more { rows.last().map(id) } else { None };
    Page {
        items: rows,
        next_cursor,
        has_more,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(20), 20);
        assert_eq!(clamp_limit(1000), MAX_PAGE_SIZE);
    }

    #[test]
    fn paginate_sets_cursor_only_with_more() {
        let page = paginate(vec![5, 4, 3], 2, |n| *n);
        assert_eq!(page.items, vec![5, 4]);
        assert!(page.has_more);
        assert_eq!(page.next_cursor, Some(4));

        let last = paginate(vec![2, 1], 2, |n| *n);
        assert!(!last.has_more);
        assert_eq!(last.next_cursor, None);
    }
}
