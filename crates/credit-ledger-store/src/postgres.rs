//! PostgreSQL storage backend.
//!
//! Accounts are read with `SELECT ... FOR UPDATE`, so two transactions that
//! touch the same account run one after the other. The unique index on
//! `credit_events (upstream_type, upstream_tx_id)` backs the idempotency
//! check; a violation surfaces as [`StoreError::DuplicateEvent`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

use credit_ledger_core::{
    AccountId, AgentId, AmountSplit, CreditAccount, CreditEvent, CreditTransaction, Credits,
    EventId, KindAmounts, OwnerType, UpstreamType,
};

use crate::error::{Result, StoreError};
use crate::query::{EventQuery, SortOrder, TransactionQuery};
use crate::schema::MIGRATOR;
use crate::{AgentQuota, LedgerTx, Store};

/// Postgres error code for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

const INSERT_ACCOUNT: &str = r"
    INSERT INTO credit_accounts (
        id, owner_type, owner_id, free_credits, reward_credits, credits, free_quota,
        refill_amount, income_free, income_reward, income_permanent, expense_free,
        expense_reward, expense_permanent, last_event_id, income_at, expense_at,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
    ON CONFLICT (owner_type, owner_id) DO NOTHING
";

const UPDATE_ACCOUNT: &str = r"
    UPDATE credit_accounts
    SET free_credits = $2, reward_credits = $3, credits = $4, free_quota = $5,
        refill_amount = $6, income_free = $7, income_reward = $8, income_permanent = $9,
        expense_free = $10, expense_reward = $11, expense_permanent = $12,
        last_event_id = $13, income_at = $14, expense_at = $15, updated_at = $16
    WHERE id = $1
";

const INSERT_EVENT: &str = r"
    INSERT INTO credit_events (
        id, event_type, direction, upstream_type, upstream_tx_id, account_id, user_id,
        agent_id, start_message_id, message_id, model, skill_call_id, skill_name, total_amount,
        credit_type, credit_types, balance_after, base_amount, base_free_amount,
        base_reward_amount, base_permanent_amount, base_original_amount, base_discount_amount,
        base_llm_amount, base_skill_amount, fee_platform_amount, fee_platform_free_amount,
        fee_platform_reward_amount, fee_platform_permanent_amount, fee_dev_account,
        fee_dev_amount, fee_dev_free_amount, fee_dev_reward_amount, fee_dev_permanent_amount,
        fee_agent_account, fee_agent_amount, fee_agent_free_amount, fee_agent_reward_amount,
        fee_agent_permanent_amount, free_amount, reward_amount, permanent_amount, note,
        created_at
    )
    VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19,
        $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35, $36,
        $37, $38, $39, $40, $41, $42, $43, $44
    )
";

const LIST_EVENTS_ASC: &str = r"
    SELECT * FROM credit_events
    WHERE ($1::text IS NULL OR account_id = $1)
      AND ($2::text IS NULL OR (fee_agent_account = $2 AND fee_agent_amount > 0))
      AND ($3::text IS NULL OR direction = $3)
      AND ($4::text IS NULL OR event_type = $4)
      AND ($5::timestamptz IS NULL OR created_at >= $5)
      AND ($6::timestamptz IS NULL OR created_at < $6)
      AND ($7::text IS NULL OR id > $7)
    ORDER BY id ASC
    LIMIT $8
";

const LIST_EVENTS_DESC: &str = r"
    SELECT * FROM credit_events
    WHERE ($1::text IS NULL OR account_id = $1)
      AND ($2::text IS NULL OR (fee_agent_account = $2 AND fee_agent_amount > 0))
      AND ($3::text IS NULL OR direction = $3)
      AND ($4::text IS NULL OR event_type = $4)
      AND ($5::timestamptz IS NULL OR created_at >= $5)
      AND ($6::timestamptz IS NULL OR created_at < $6)
      AND ($7::text IS NULL OR id < $7)
    ORDER BY id DESC
    LIMIT $8
";

const INSERT_TRANSACTION: &str = r"
    INSERT INTO credit_transactions (
        id, account_id, event_id, tx_type, credit_debit, change_amount, credit_type,
        free_amount, reward_amount, permanent_amount, created_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
";

const LIST_TRANSACTIONS: &str = r"
    SELECT * FROM credit_transactions
    WHERE account_id = $1
      AND (cardinality($2::text[]) = 0 OR tx_type = ANY($2))
      AND ($3::text IS NULL OR credit_debit = $3)
      AND ($4::text IS NULL OR id < $4)
    ORDER BY id DESC
    LIMIT $5
";

const ADD_AGENT_FREE_INCOME: &str = r"
    INSERT INTO agent_quotas (agent_id, free_income_daily, free_income_day, updated_at)
    VALUES ($1, $2, $3, now())
    ON CONFLICT (agent_id) DO UPDATE
    SET free_income_daily = CASE
            WHEN agent_quotas.free_income_day = EXCLUDED.free_income_day
            THEN agent_quotas.free_income_daily + EXCLUDED.free_income_daily
            ELSE EXCLUDED.free_income_daily
        END,
        free_income_day = EXCLUDED.free_income_day,
        updated_at = now()
    RETURNING free_income_daily
";

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn get_account(
        &mut self,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> Result<Option<CreditAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM credit_accounts WHERE owner_type = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(owner_type.as_str())
        .bind(owner_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CreditAccount::try_from).transpose()
    }

    async fn get_account_by_id(&mut self, account_id: &AccountId) -> Result<Option<CreditAccount>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM credit_accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(account_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CreditAccount::try_from).transpose()
    }

    async fn insert_account(&mut self, account: &CreditAccount) -> Result<CreditAccount> {
        sqlx::query(INSERT_ACCOUNT)
            .bind(account.id.to_string())
            .bind(account.owner_type.as_str())
            .bind(&account.owner_id)
            .bind(account.balance.free.as_decimal())
            .bind(account.balance.reward.as_decimal())
            .bind(account.balance.permanent.as_decimal())
            .bind(account.free_quota.as_decimal())
            .bind(account.refill_amount.as_decimal())
            .bind(account.total_income.free.as_decimal())
            .bind(account.total_income.reward.as_decimal())
            .bind(account.total_income.permanent.as_decimal())
            .bind(account.total_expense.free.as_decimal())
            .bind(account.total_expense.reward.as_decimal())
            .bind(account.total_expense.permanent.as_decimal())
            .bind(account.last_event_id.map(|id| id.to_string()))
            .bind(account.income_at)
            .bind(account.expense_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .await?;

        self.get_account(account.owner_type, &account.owner_id)
            .await?
            .ok_or_else(|| {
                StoreError::Database(format!(
                    "account {}/{} missing after insert",
                    account.owner_type, account.owner_id
                ))
            })
    }

    async fn update_account(&mut self, account: &CreditAccount) -> Result<()> {
        let result = sqlx::query(UPDATE_ACCOUNT)
            .bind(account.id.to_string())
            .bind(account.balance.free.as_decimal())
            .bind(account.balance.reward.as_decimal())
            .bind(account.balance.permanent.as_decimal())
            .bind(account.free_quota.as_decimal())
            .bind(account.refill_amount.as_decimal())
            .bind(account.total_income.free.as_decimal())
            .bind(account.total_income.reward.as_decimal())
            .bind(account.total_income.permanent.as_decimal())
            .bind(account.total_expense.free.as_decimal())
            .bind(account.total_expense.reward.as_decimal())
            .bind(account.total_expense.permanent.as_decimal())
            .bind(account.last_event_id.map(|id| id.to_string()))
            .bind(account.income_at)
            .bind(account.expense_at)
            .bind(account.updated_at)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "account",
                id: account.id.to_string(),
            });
        }
        Ok(())
    }

    async fn list_refill_candidates(&mut self) -> Result<Vec<CreditAccount>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM credit_accounts \
             WHERE refill_amount > 0 AND free_credits < free_quota \
             ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(CreditAccount::try_from).collect()
    }

    async fn find_event_by_upstream(
        &mut self,
        upstream_type: UpstreamType,
        upstream_tx_id: &str,
    ) -> Result<Option<CreditEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM credit_events WHERE upstream_type = $1 AND upstream_tx_id = $2",
        )
        .bind(upstream_type.as_str())
        .bind(upstream_tx_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CreditEvent::try_from).transpose()
    }

    async fn find_event_by_upstream_tx_id(
        &mut self,
        upstream_tx_id: &str,
    ) -> Result<Option<CreditEvent>> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM credit_events WHERE upstream_tx_id = $1 ORDER BY id LIMIT 1",
        )
        .bind(upstream_tx_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CreditEvent::try_from).transpose()
    }

    async fn get_event(&mut self, event_id: &EventId) -> Result<Option<CreditEvent>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM credit_events WHERE id = $1")
            .bind(event_id.to_string())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(CreditEvent::try_from).transpose()
    }

    async fn get_events(&mut self, event_ids: &[EventId]) -> Result<Vec<CreditEvent>> {
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = event_ids.iter().map(ToString::to_string).collect();
        let rows = sqlx::query_as::<_, EventRow>("SELECT * FROM credit_events WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(CreditEvent::try_from).collect()
    }

    async fn insert_event(&mut self, event: &CreditEvent) -> Result<()> {
        let row = EventRow::from(event);
        sqlx::query(INSERT_EVENT)
            .bind(row.id)
            .bind(row.event_type)
            .bind(row.direction)
            .bind(row.upstream_type)
            .bind(row.upstream_tx_id)
            .bind(row.account_id)
            .bind(row.user_id)
            .bind(row.agent_id)
            .bind(row.start_message_id)
            .bind(row.message_id)
            .bind(row.model)
            .bind(row.skill_call_id)
            .bind(row.skill_name)
            .bind(row.total_amount)
            .bind(row.credit_type)
            .bind(row.credit_types)
            .bind(row.balance_after)
            .bind(row.base_amount)
            .bind(row.base_free_amount)
            .bind(row.base_reward_amount)
            .bind(row.base_permanent_amount)
            .bind(row.base_original_amount)
            .bind(row.base_discount_amount)
            .bind(row.base_llm_amount)
            .bind(row.base_skill_amount)
            .bind(row.fee_platform_amount)
            .bind(row.fee_platform_free_amount)
            .bind(row.fee_platform_reward_amount)
            .bind(row.fee_platform_permanent_amount)
            .bind(row.fee_dev_account)
            .bind(row.fee_dev_amount)
            .bind(row.fee_dev_free_amount)
            .bind(row.fee_dev_reward_amount)
            .bind(row.fee_dev_permanent_amount)
            .bind(row.fee_agent_account)
            .bind(row.fee_agent_amount)
            .bind(row.fee_agent_free_amount)
            .bind(row.fee_agent_reward_amount)
            .bind(row.fee_agent_permanent_amount)
            .bind(row.free_amount)
            .bind(row.reward_amount)
            .bind(row.permanent_amount)
            .bind(row.note)
            .bind(row.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                        return StoreError::DuplicateEvent {
                            upstream_type: event.upstream_type,
                            upstream_tx_id: event.upstream_tx_id.clone(),
                        };
                    }
                }
                StoreError::from(e)
            })?;
        Ok(())
    }

    async fn update_event_note(
        &mut self,
        event_id: &EventId,
        note: Option<&str>,
    ) -> Result<CreditEvent> {
        let row = sqlx::query_as::<_, EventRow>(
            "UPDATE credit_events SET note = $2 WHERE id = $1 RETURNING *",
        )
        .bind(event_id.to_string())
        .bind(note)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            entity: "event",
            id: event_id.to_string(),
        })?;
        CreditEvent::try_from(row)
    }

    async fn list_events(&mut self, query: &EventQuery) -> Result<Vec<CreditEvent>> {
        let sql = match query.order {
            SortOrder::Ascending => LIST_EVENTS_ASC,
            SortOrder::Descending => LIST_EVENTS_DESC,
        };
        let rows = sqlx::query_as::<_, EventRow>(sql)
            .bind(query.account_id.map(|id| id.to_string()))
            .bind(query.fee_agent_account.map(|id| id.to_string()))
            .bind(query.direction.map(|d| d.as_str()))
            .bind(query.event_type.map(|t| t.as_str()))
            .bind(query.start_at)
            .bind(query.end_at)
            .bind(query.cursor.map(|id| id.to_string()))
            .bind(limit_param(query.limit))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(CreditEvent::try_from).collect()
    }

    async fn insert_transactions(&mut self, transactions: &[CreditTransaction]) -> Result<()> {
        for tx in transactions {
            sqlx::query(INSERT_TRANSACTION)
                .bind(tx.id.to_string())
                .bind(tx.account_id.to_string())
                .bind(tx.event_id.to_string())
                .bind(tx.tx_type.as_str())
                .bind(tx.credit_debit.as_str())
                .bind(tx.change_amount.as_decimal())
                .bind(tx.credit_type.map(|k| k.as_str()))
                .bind(tx.by_kind.free.as_decimal())
                .bind(tx.by_kind.reward.as_decimal())
                .bind(tx.by_kind.permanent.as_decimal())
                .bind(tx.created_at)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn list_transactions(
        &mut self,
        query: &TransactionQuery,
    ) -> Result<Vec<CreditTransaction>> {
        let tx_types: Vec<String> = query.tx_types.iter().map(ToString::to_string).collect();
        let rows = sqlx::query_as::<_, TransactionRow>(LIST_TRANSACTIONS)
            .bind(query.account_id.to_string())
            .bind(tx_types)
            .bind(query.credit_debit.map(|side| side.as_str()))
            .bind(query.cursor.map(|id| id.to_string()))
            .bind(limit_param(query.limit))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(CreditTransaction::try_from).collect()
    }

    async fn list_transactions_by_event(
        &mut self,
        event_id: &EventId,
    ) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM credit_transactions WHERE event_id = $1 ORDER BY id",
        )
        .bind(event_id.to_string())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(CreditTransaction::try_from).collect()
    }

    async fn add_agent_free_income(
        &mut self,
        agent_id: &AgentId,
        amount: Credits,
        day: NaiveDate,
    ) -> Result<Credits> {
        let total: Decimal = sqlx::query_scalar(ADD_AGENT_FREE_INCOME)
            .bind(agent_id.as_str())
            .bind(amount.as_decimal())
            .bind(day)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(Credits::new(total))
    }

    async fn get_agent_quota(&mut self, agent_id: &AgentId) -> Result<Option<AgentQuota>> {
        let row: Option<(String, Decimal, NaiveDate)> = sqlx::query_as(
            "SELECT agent_id, free_income_daily, free_income_day FROM agent_quotas WHERE agent_id = $1",
        )
        .bind(agent_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|(agent_id, free_income_daily, day)| AgentQuota {
            agent_id: AgentId::new(agent_id),
            free_income_daily: Credits::new(free_income_daily),
            day,
        }))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Serialization(format!("{value}: {e}")))
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map(parse::<T>).transpose()
}

fn kinds(free: Decimal, reward: Decimal, permanent: Decimal) -> KindAmounts {
    KindAmounts {
        free: Credits::new(free),
        reward: Credits::new(reward),
        permanent: Credits::new(permanent),
    }
}

fn split(amount: Decimal, free: Decimal, reward: Decimal, permanent: Decimal) -> AmountSplit {
    AmountSplit {
        amount: Credits::new(amount),
        by_kind: kinds(free, reward, permanent),
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    owner_type: String,
    owner_id: String,
    free_credits: Decimal,
    reward_credits: Decimal,
    credits: Decimal,
    free_quota: Decimal,
    refill_amount: Decimal,
    income_free: Decimal,
    income_reward: Decimal,
    income_permanent: Decimal,
    expense_free: Decimal,
    expense_reward: Decimal,
    expense_permanent: Decimal,
    last_event_id: Option<String>,
    income_at: Option<DateTime<Utc>>,
    expense_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for CreditAccount {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Self {
            id: parse(&row.id)?,
            owner_type: parse(&row.owner_type)?,
            owner_id: row.owner_id,
            balance: kinds(row.free_credits, row.reward_credits, row.credits),
            free_quota: Credits::new(row.free_quota),
            refill_amount: Credits::new(row.refill_amount),
            total_income: kinds(row.income_free, row.income_reward, row.income_permanent),
            total_expense: kinds(row.expense_free, row.expense_reward, row.expense_permanent),
            last_event_id: parse_opt(row.last_event_id.as_deref())?,
            income_at: row.income_at,
            expense_at: row.expense_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    event_type: String,
    direction: String,
    upstream_type: String,
    upstream_tx_id: String,
    account_id: String,
    user_id: Option<String>,
    agent_id: Option<String>,
    start_message_id: Option<String>,
    message_id: Option<String>,
    model: Option<String>,
    skill_call_id: Option<String>,
    skill_name: Option<String>,
    total_amount: Decimal,
    credit_type: Option<String>,
    credit_types: Vec<String>,
    balance_after: Decimal,
    base_amount: Decimal,
    base_free_amount: Decimal,
    base_reward_amount: Decimal,
    base_permanent_amount: Decimal,
    base_original_amount: Decimal,
    base_discount_amount: Decimal,
    base_llm_amount: Decimal,
    base_skill_amount: Decimal,
    fee_platform_amount: Decimal,
    fee_platform_free_amount: Decimal,
    fee_platform_reward_amount: Decimal,
    fee_platform_permanent_amount: Decimal,
    fee_dev_account: Option<String>,
    fee_dev_amount: Decimal,
    fee_dev_free_amount: Decimal,
    fee_dev_reward_amount: Decimal,
    fee_dev_permanent_amount: Decimal,
    fee_agent_account: Option<String>,
    fee_agent_amount: Decimal,
    fee_agent_free_amount: Decimal,
    fee_agent_reward_amount: Decimal,
    fee_agent_permanent_amount: Decimal,
    free_amount: Decimal,
    reward_amount: Decimal,
    permanent_amount: Decimal,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&CreditEvent> for EventRow {
    fn from(event: &CreditEvent) -> Self {
        Self {
            id: event.id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            direction: event.direction.as_str().to_string(),
            upstream_type: event.upstream_type.as_str().to_string(),
            upstream_tx_id: event.upstream_tx_id.clone(),
            account_id: event.account_id.to_string(),
            user_id: event.user_id.as_ref().map(ToString::to_string),
            agent_id: event.agent_id.as_ref().map(ToString::to_string),
            start_message_id: event.start_message_id.clone(),
            message_id: event.message_id.clone(),
            model: event.model.clone(),
            skill_call_id: event.skill_call_id.clone(),
            skill_name: event.skill_name.clone(),
            total_amount: event.total_amount.as_decimal(),
            credit_type: event.credit_type.map(|k| k.as_str().to_string()),
            credit_types: event
                .credit_types
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
            balance_after: event.balance_after.as_decimal(),
            base_amount: event.base.amount.as_decimal(),
            base_free_amount: event.base.by_kind.free.as_decimal(),
            base_reward_amount: event.base.by_kind.reward.as_decimal(),
            base_permanent_amount: event.base.by_kind.permanent.as_decimal(),
            base_original_amount: event.base_original_amount.as_decimal(),
            base_discount_amount: event.base_discount_amount.as_decimal(),
            base_llm_amount: event.base_llm_amount.as_decimal(),
            base_skill_amount: event.base_skill_amount.as_decimal(),
            fee_platform_amount: event.fee_platform.amount.as_decimal(),
            fee_platform_free_amount: event.fee_platform.by_kind.free.as_decimal(),
            fee_platform_reward_amount: event.fee_platform.by_kind.reward.as_decimal(),
            fee_platform_permanent_amount: event.fee_platform.by_kind.permanent.as_decimal(),
            fee_dev_account: event.fee_dev_account.map(|id| id.to_string()),
            fee_dev_amount: event.fee_dev.amount.as_decimal(),
            fee_dev_free_amount: event.fee_dev.by_kind.free.as_decimal(),
            fee_dev_reward_amount: event.fee_dev.by_kind.reward.as_decimal(),
            fee_dev_permanent_amount: event.fee_dev.by_kind.permanent.as_decimal(),
            fee_agent_account: event.fee_agent_account.map(|id| id.to_string()),
            fee_agent_amount: event.fee_agent.amount.as_decimal(),
            fee_agent_free_amount: event.fee_agent.by_kind.free.as_decimal(),
            fee_agent_reward_amount: event.fee_agent.by_kind.reward.as_decimal(),
            fee_agent_permanent_amount: event.fee_agent.by_kind.permanent.as_decimal(),
            free_amount: event.paid.free.as_decimal(),
            reward_amount: event.paid.reward.as_decimal(),
            permanent_amount: event.paid.permanent.as_decimal(),
            note: event.note.clone(),
            created_at: event.created_at,
        }
    }
}

impl TryFrom<EventRow> for CreditEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self> {
        let credit_types = row
            .credit_types
            .iter()
            .map(|k| parse(k))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: parse(&row.id)?,
            event_type: parse(&row.event_type)?,
            direction: parse(&row.direction)?,
            upstream_type: parse(&row.upstream_type)?,
            upstream_tx_id: row.upstream_tx_id,
            account_id: parse(&row.account_id)?,
            user_id: row.user_id.map(Into::into),
            agent_id: row.agent_id.map(Into::into),
            start_message_id: row.start_message_id,
            message_id: row.message_id,
            model: row.model,
            skill_call_id: row.skill_call_id,
            skill_name: row.skill_name,
            total_amount: Credits::new(row.total_amount),
            credit_type: parse_opt(row.credit_type.as_deref())?,
            credit_types,
            balance_after: Credits::new(row.balance_after),
            base: split(
                row.base_amount,
                row.base_free_amount,
                row.base_reward_amount,
                row.base_permanent_amount,
            ),
            base_original_amount: Credits::new(row.base_original_amount),
            base_discount_amount: Credits::new(row.base_discount_amount),
            base_llm_amount: Credits::new(row.base_llm_amount),
            base_skill_amount: Credits::new(row.base_skill_amount),
            fee_platform: split(
                row.fee_platform_amount,
                row.fee_platform_free_amount,
                row.fee_platform_reward_amount,
                row.fee_platform_permanent_amount,
            ),
            fee_dev: split(
                row.fee_dev_amount,
                row.fee_dev_free_amount,
                row.fee_dev_reward_amount,
                row.fee_dev_permanent_amount,
            ),
            fee_dev_account: parse_opt(row.fee_dev_account.as_deref())?,
            fee_agent: split(
                row.fee_agent_amount,
                row.fee_agent_free_amount,
                row.fee_agent_reward_amount,
                row.fee_agent_permanent_amount,
            ),
            fee_agent_account: parse_opt(row.fee_agent_account.as_deref())?,
            paid: kinds(row.free_amount, row.reward_amount, row.permanent_amount),
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: String,
    account_id: String,
    event_id: String,
    tx_type: String,
    credit_debit: String,
    change_amount: Decimal,
    credit_type: Option<String>,
    free_amount: Decimal,
    reward_amount: Decimal,
    permanent_amount: Decimal,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for CreditTransaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: parse(&row.id)?,
            account_id: parse(&row.account_id)?,
            event_id: parse(&row.event_id)?,
            tx_type: parse(&row.tx_type)?,
            credit_debit: parse(&row.credit_debit)?,
            change_amount: Credits::new(row.change_amount),
            credit_type: parse_opt(row.credit_type.as_deref())?,
            by_kind: kinds(row.free_amount, row.reward_amount, row.permanent_amount),
            created_at: row.created_at,
        })
    }
}
