//! Manual balance operations: recharge, reward, withdraw and adjustment.
//!
//! Each one moves a single credit kind between an owner account and a
//! platform sink, records one event with upstream type `api`, and writes two
//! ledger lines of equal amount.

use serde::{Deserialize, Serialize};

use credit_ledger_core::{
    sinks, AgentId, CreditAccount, CreditEvent, CreditKind, CreditTransaction, Credits,
    DeductionPolicy, Direction, EventType, KindAmounts, LedgerError, OwnerType, PaymentSettings,
    Result, RewardType, TransactionType, UpstreamType, UserId,
};
use credit_ledger_store::LedgerTx;

use crate::accounts::Accounts;
use crate::agents::AgentDirectory;
use crate::recorder;

/// Outcome of a manual operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// The owner's account after the operation.
    pub account: CreditAccount,
    /// The recorded event.
    pub event: CreditEvent,
}

/// Add paid (permanent) credits to a user.
///
/// # Errors
///
/// Returns `Validation` unless `amount` is positive, `DuplicateTransaction`
/// for a reused key, or an error if the store fails.
pub async fn recharge(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    user_id: &UserId,
    amount: Credits,
    upstream_tx_id: &str,
    note: Option<&str>,
) -> Result<Settlement> {
    require_positive(amount, "recharge")?;
    recorder::ensure_unique(tx, UpstreamType::Api, upstream_tx_id).await?;

    let settlement = credit_user(
        tx,
        settings,
        UserCredit {
            user_id,
            kind: CreditKind::Permanent,
            amount,
            sink: sinks::RECHARGE,
            event_type: EventType::Recharge,
            tx_type: TransactionType::Recharge,
            upstream_tx_id,
            note,
        },
    )
    .await?;

    tracing::info!(
        user_id = %user_id,
        upstream_tx_id = %upstream_tx_id,
        amount = %amount,
        balance = %settlement.account.total_balance(),
        "Recharge recorded"
    );
    Ok(settlement)
}

/// Add reward credits to a user.
///
/// `reward_type` picks both the event type and the ledger line type.
///
/// # Errors
///
/// Returns `Validation` unless `amount` is positive, `DuplicateTransaction`
/// for a reused key, or an error if the store fails.
pub async fn reward(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    user_id: &UserId,
    amount: Credits,
    upstream_tx_id: &str,
    reward_type: RewardType,
    note: Option<&str>,
) -> Result<Settlement> {
    require_positive(amount, "reward")?;
    recorder::ensure_unique(tx, UpstreamType::Api, upstream_tx_id).await?;

    let settlement = credit_user(
        tx,
        settings,
        UserCredit {
            user_id,
            kind: CreditKind::Reward,
            amount,
            sink: sinks::REWARD,
            event_type: reward_type.into(),
            tx_type: reward_type.into(),
            upstream_tx_id,
            note,
        },
    )
    .await?;

    tracing::info!(
        user_id = %user_id,
        upstream_tx_id = %upstream_tx_id,
        reward_type = %reward_type,
        amount = %amount,
        "Reward recorded"
    );
    Ok(settlement)
}

/// Move an agent's permanent earnings out to the platform withdraw sink.
///
/// The event names the agent's owner as its user.
///
/// # Errors
///
/// Returns `NotFound` for an unknown agent, `Validation` for an agent
/// without owner or a non-positive amount, `InsufficientBalance` if the
/// agent's permanent balance is short, `DuplicateTransaction` for a reused
/// key, or an error if the store fails.
pub async fn withdraw(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    agents: &dyn AgentDirectory,
    agent_id: &AgentId,
    amount: Credits,
    upstream_tx_id: &str,
    note: Option<&str>,
) -> Result<Settlement> {
    require_positive(amount, "withdraw")?;
    recorder::ensure_unique(tx, UpstreamType::Api, upstream_tx_id).await?;

    let agent = agents
        .agent(agent_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("agent", agent_id))?;
    let owner = agent
        .owner
        .ok_or_else(|| LedgerError::validation(format!("agent {agent_id} has no owner")))?;

    let accounts = Accounts::new(settings);
    let agent_account = accounts
        .get_or_create(tx, OwnerType::Agent, agent_id.as_str())
        .await?;

    let mut event = CreditEvent::new(
        EventType::Withdraw,
        Direction::Expense,
        UpstreamType::Api,
        upstream_tx_id,
        agent_account.id,
    );
    let event_id = event.id;

    let agent_account = accounts
        .deduction(
            tx,
            OwnerType::Agent,
            agent_id.as_str(),
            CreditKind::Permanent,
            amount,
            event_id,
            DeductionPolicy::RequireFunds,
        )
        .await?;
    let by_kind = KindAmounts::single(CreditKind::Permanent, amount);
    let sink = accounts
        .income(tx, OwnerType::Platform, sinks::WITHDRAW, &by_kind, event_id)
        .await?;

    event.set_transfer(CreditKind::Permanent, amount);
    event.user_id = Some(owner.clone());
    event.agent_id = Some(agent_id.clone());
    event.balance_after = agent_account.total_balance();
    event.note = note.map(str::to_string);

    let transactions = [
        CreditTransaction::debit(
            agent_account.id,
            event_id,
            TransactionType::Withdraw,
            Some(CreditKind::Permanent),
            by_kind,
        ),
        CreditTransaction::credit(
            sink.id,
            event_id,
            TransactionType::Withdraw,
            Some(CreditKind::Permanent),
            by_kind,
        ),
    ];
    recorder::record(tx, &event, &transactions).await?;

    tracing::info!(
        agent_id = %agent_id,
        owner = %owner,
        upstream_tx_id = %upstream_tx_id,
        amount = %amount,
        balance = %agent_account.balance.permanent,
        "Withdraw recorded"
    );
    Ok(Settlement {
        account: agent_account,
        event,
    })
}

/// Correct a user's balance of one credit kind by a signed amount.
///
/// A positive amount credits the user and debits the adjustment sink; a
/// negative one does the reverse and may take the user's balance below zero.
///
/// # Errors
///
/// Returns `Validation` for a zero amount or an empty note,
/// `DuplicateTransaction` for a reused key, or an error if the store fails.
pub async fn adjustment(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    user_id: &UserId,
    kind: CreditKind,
    amount: Credits,
    upstream_tx_id: &str,
    note: &str,
) -> Result<Settlement> {
    if amount.is_zero() {
        return Err(LedgerError::validation("adjustment amount must not be zero"));
    }
    if note.trim().is_empty() {
        return Err(LedgerError::validation("adjustment requires a note"));
    }
    recorder::ensure_unique(tx, UpstreamType::Api, upstream_tx_id).await?;

    let settlement = if amount.is_positive() {
        credit_user(
            tx,
            settings,
            UserCredit {
                user_id,
                kind,
                amount,
                sink: sinks::ADJUSTMENT,
                event_type: EventType::Adjustment,
                tx_type: TransactionType::Adjustment,
                upstream_tx_id,
                note: Some(note),
            },
        )
        .await?
    } else {
        debit_user(tx, settings, user_id, kind, amount.abs(), upstream_tx_id, note).await?
    };

    tracing::info!(
        user_id = %user_id,
        upstream_tx_id = %upstream_tx_id,
        credit_type = %kind,
        amount = %amount,
        note = %note,
        "Adjustment recorded"
    );
    Ok(settlement)
}

fn require_positive(amount: Credits, operation: &str) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::validation(format!(
            "{operation} amount must be positive"
        )))
    }
}

struct UserCredit<'a> {
    user_id: &'a UserId,
    kind: CreditKind,
    amount: Credits,
    sink: &'static str,
    event_type: EventType,
    tx_type: TransactionType,
    upstream_tx_id: &'a str,
    note: Option<&'a str>,
}

/// User income from a sink that may go negative.
async fn credit_user(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    credit: UserCredit<'_>,
) -> Result<Settlement> {
    let accounts = Accounts::new(settings);
    let user_account = accounts
        .get_or_create(tx, OwnerType::User, credit.user_id.as_str())
        .await?;

    let mut event = CreditEvent::new(
        credit.event_type,
        Direction::Income,
        UpstreamType::Api,
        credit.upstream_tx_id,
        user_account.id,
    );
    let event_id = event.id;
    let by_kind = KindAmounts::single(credit.kind, credit.amount);

    let user_account = accounts
        .income(tx, OwnerType::User, credit.user_id.as_str(), &by_kind, event_id)
        .await?;
    let sink = accounts
        .deduction(
            tx,
            OwnerType::Platform,
            credit.sink,
            credit.kind,
            credit.amount,
            event_id,
            DeductionPolicy::AllowNegative,
        )
        .await?;

    event.set_transfer(credit.kind, credit.amount);
    event.user_id = Some(credit.user_id.clone());
    event.balance_after = user_account.total_balance();
    event.note = credit.note.map(str::to_string);

    let transactions = [
        CreditTransaction::credit(
            user_account.id,
            event_id,
            credit.tx_type,
            Some(credit.kind),
            by_kind,
        ),
        CreditTransaction::debit(sink.id, event_id, credit.tx_type, Some(credit.kind), by_kind),
    ];
    recorder::record(tx, &event, &transactions).await?;

    Ok(Settlement {
        account: user_account,
        event,
    })
}

/// Negative adjustment: user deduction into the adjustment sink.
async fn debit_user(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    user_id: &UserId,
    kind: CreditKind,
    amount: Credits,
    upstream_tx_id: &str,
    note: &str,
) -> Result<Settlement> {
    let accounts = Accounts::new(settings);
    let user_account = accounts
        .get_or_create(tx, OwnerType::User, user_id.as_str())
        .await?;

    let mut event = CreditEvent::new(
        EventType::Adjustment,
        Direction::Expense,
        UpstreamType::Api,
        upstream_tx_id,
        user_account.id,
    );
    let event_id = event.id;
    let by_kind = KindAmounts::single(kind, amount);

    let user_account = accounts
        .deduction(
            tx,
            OwnerType::User,
            user_id.as_str(),
            kind,
            amount,
            event_id,
            DeductionPolicy::AllowNegative,
        )
        .await?;
    let sink = accounts
        .income(tx, OwnerType::Platform, sinks::ADJUSTMENT, &by_kind, event_id)
        .await?;

    event.set_transfer(kind, amount);
    event.user_id = Some(user_id.clone());
    event.balance_after = user_account.total_balance();
    event.note = Some(note.to_string());

    let transactions = [
        CreditTransaction::debit(
            user_account.id,
            event_id,
            TransactionType::Adjustment,
            Some(kind),
            by_kind,
        ),
        CreditTransaction::credit(
            sink.id,
            event_id,
            TransactionType::Adjustment,
            Some(kind),
            by_kind,
        ),
    ];
    recorder::record(tx, &event, &transactions).await?;

    Ok(Settlement {
        account: user_account,
        event,
    })
}
