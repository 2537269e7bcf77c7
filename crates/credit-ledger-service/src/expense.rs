//! Usage charges: LLM messages, skill calls and memory summarization.
//!
//! All three share one flow. The payer is charged the base cost plus fees,
//! free credits first. The base goes to a platform sink for the charge type.
//! Each fee leg goes to its recipient. The event records the whole split and
//! one ledger line is written per account touched.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use credit_ledger_core::{
    sinks, AccountId, AgentBilling, AmountSplit, CreditEvent, CreditKind, CreditTransaction,
    Credits, Direction, EventType, FeeQuote, FeeSplit, KindAmounts, LedgerError, OwnerType,
    PaymentSettings, PricingConfig, Result, TransactionType, UpstreamType, UserId,
};
use credit_ledger_store::LedgerTx;

use crate::accounts::Accounts;
use crate::recorder;

// ============================================================================
// Requests
// ============================================================================

/// An LLM call (or memory summarization) to bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCharge {
    /// User who pays.
    pub payer: UserId,
    /// Message that incurred the cost; also the idempotency key.
    pub message_id: String,
    /// First message of the conversation turn.
    pub start_message_id: String,
    /// LLM cost before fees.
    pub base_llm_amount: Credits,
    /// Agent that served the call.
    pub agent: AgentBilling,
}

/// A skill call to bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCharge {
    /// User who pays.
    pub payer: UserId,
    /// Message that triggered the call.
    pub message_id: String,
    /// First message of the conversation turn.
    pub start_message_id: String,
    /// Call id within the message.
    pub skill_call_id: String,
    /// Priced skill name.
    pub skill_name: String,
    /// Agent that made the call.
    pub agent: AgentBilling,
}

impl SkillCharge {
    /// Idempotency key of the call.
    #[must_use]
    pub fn upstream_tx_id(&self) -> String {
        format!("{}_{}", self.message_id, self.skill_call_id)
    }
}

/// Price of one skill call for one payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCost {
    /// Base and fee legs.
    pub quote: FeeQuote,
    /// Catalogue price that applied (regular or self-key).
    pub base_skill_amount: Credits,
    /// Owner type of the developer fee recipient.
    pub fee_dev_owner_type: OwnerType,
    /// Owner id of the developer fee recipient.
    pub fee_dev_owner_id: String,
}

impl SkillCost {
    /// Amount the payer is charged.
    #[must_use]
    pub fn total_amount(&self) -> Credits {
        self.quote.total()
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Bill an LLM message.
///
/// # Errors
///
/// Returns `DuplicateTransaction` if the message was already billed,
/// `Validation` for a negative base amount, `InsufficientCredits` if the
/// payer cannot cover the total, or an error if the store fails.
pub async fn expense_message(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    charge: &MessageCharge,
) -> Result<CreditEvent> {
    expense_llm(tx, settings, charge, EventType::Message).await
}

/// Bill a memory summarization. Same pricing as a message.
///
/// # Errors
///
/// Same as [`expense_message`].
pub async fn expense_summarize(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    charge: &MessageCharge,
) -> Result<CreditEvent> {
    expense_llm(tx, settings, charge, EventType::Memory).await
}

/// Bill a skill call.
///
/// # Errors
///
/// Returns `DuplicateTransaction` if the call was already billed, `NotFound`
/// for an unpriced skill, `InsufficientCredits` if the payer cannot cover the
/// total, or an error if the store fails.
pub async fn expense_skill(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    pricing: &PricingConfig,
    charge: &SkillCharge,
) -> Result<CreditEvent> {
    let upstream_tx_id = charge.upstream_tx_id();
    recorder::ensure_unique(tx, UpstreamType::Executor, &upstream_tx_id).await?;

    let cost = skill_cost(settings, pricing, &charge.skill_name, &charge.payer, &charge.agent)?;

    let mut event = CreditEvent::new(
        EventType::SkillCall,
        Direction::Expense,
        UpstreamType::Executor,
        upstream_tx_id,
        AccountId::nil(),
    );
    event.message_id = Some(charge.message_id.clone());
    event.start_message_id = Some(charge.start_message_id.clone());
    event.skill_call_id = Some(charge.skill_call_id.clone());
    event.skill_name = Some(charge.skill_name.clone());
    event.base_skill_amount = cost.base_skill_amount;

    let plan = ChargePlan {
        payer: &charge.payer,
        agent: &charge.agent,
        quote: cost.quote,
        base_sink: sinks::SKILL,
        base_tx_type: TransactionType::ReceiveBaseSkill,
        fee_dev_recipient: Some((cost.fee_dev_owner_type, cost.fee_dev_owner_id.as_str())),
    };
    settle(tx, settings, plan, event).await
}

/// Price a skill call without charging it.
///
/// Uses the self-key price when the agent runs the skill's category on its
/// owner's API key. The developer fee goes to the skill's author, or to the
/// `platform_dev` sink for skills without one.
///
/// # Errors
///
/// Returns `NotFound` for an unpriced skill and `Validation` for a negative
/// price.
pub fn skill_cost(
    settings: &PaymentSettings,
    pricing: &PricingConfig,
    skill_name: &str,
    payer: &UserId,
    agent: &AgentBilling,
) -> Result<SkillCost> {
    let skill = pricing
        .skill(skill_name)
        .ok_or_else(|| LedgerError::not_found("skill", skill_name))?;

    let base_skill_amount = skill.base_price(agent);
    if base_skill_amount.is_negative() {
        return Err(LedgerError::validation(format!(
            "skill {skill_name} has a negative price"
        )));
    }

    let (fee_dev_owner_type, fee_dev_owner_id) = match &skill.author {
        Some(author) => (OwnerType::User, author.to_string()),
        None => (OwnerType::Platform, sinks::DEV.to_string()),
    };

    Ok(SkillCost {
        quote: FeeQuote::skill(base_skill_amount, settings, agent.fee_percentage_for(payer)),
        base_skill_amount,
        fee_dev_owner_type,
        fee_dev_owner_id,
    })
}

async fn expense_llm(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    charge: &MessageCharge,
    event_type: EventType,
) -> Result<CreditEvent> {
    recorder::ensure_unique(tx, UpstreamType::Executor, &charge.message_id).await?;

    if charge.base_llm_amount.is_negative() {
        return Err(LedgerError::validation("base LLM amount must not be negative"));
    }

    let (base_sink, base_tx_type) = match event_type {
        EventType::Memory => (sinks::MEMORY, TransactionType::ReceiveBaseMemory),
        _ => (sinks::MESSAGE, TransactionType::ReceiveBaseLlm),
    };

    let mut event = CreditEvent::new(
        event_type,
        Direction::Expense,
        UpstreamType::Executor,
        charge.message_id.clone(),
        AccountId::nil(),
    );
    event.message_id = Some(charge.message_id.clone());
    event.start_message_id = Some(charge.start_message_id.clone());
    event.model.clone_from(&charge.agent.model);
    event.base_llm_amount = charge.base_llm_amount;

    let plan = ChargePlan {
        payer: &charge.payer,
        agent: &charge.agent,
        quote: FeeQuote::message(
            charge.base_llm_amount,
            settings,
            charge.agent.fee_percentage_for(&charge.payer),
        ),
        base_sink,
        base_tx_type,
        fee_dev_recipient: None,
    };
    settle(tx, settings, plan, event).await
}

// ============================================================================
// Settlement
// ============================================================================

struct ChargePlan<'a> {
    payer: &'a UserId,
    agent: &'a AgentBilling,
    quote: FeeQuote,
    base_sink: &'static str,
    base_tx_type: TransactionType,
    fee_dev_recipient: Option<(OwnerType, &'a str)>,
}

/// Move the money for a priced charge and record it.
///
/// `event` arrives with its type, key and descriptive fields set; the
/// account, amounts and fee split are filled in here.
async fn settle(
    tx: &mut dyn LedgerTx,
    settings: &PaymentSettings,
    plan: ChargePlan<'_>,
    mut event: CreditEvent,
) -> Result<CreditEvent> {
    let accounts = Accounts::new(settings);
    let quote = plan.quote;
    let total = quote.total();
    let event_id = event.id;

    let (payer_account, paid) = if total.is_positive() {
        accounts
            .expense(tx, OwnerType::User, plan.payer.as_str(), total, event_id)
            .await?
    } else {
        let account = accounts
            .get_or_create(tx, OwnerType::User, plan.payer.as_str())
            .await?;
        (account, KindAmounts::ZERO)
    };
    let split = FeeSplit::new(&quote, &paid);
    let credit_type = paid.dominant_kind().unwrap_or(CreditKind::Free);

    let mut transactions = Vec::new();
    if total.is_positive() {
        transactions.push(CreditTransaction::debit(
            payer_account.id,
            event_id,
            TransactionType::Pay,
            Some(credit_type),
            paid,
        ));

        let base_account = accounts
            .income(tx, OwnerType::Platform, plan.base_sink, &split.base, event_id)
            .await?;
        transactions.push(CreditTransaction::credit(
            base_account.id,
            event_id,
            plan.base_tx_type,
            Some(credit_type),
            split.base,
        ));

        if quote.fee_platform.is_positive() {
            let fee_account = accounts
                .income(tx, OwnerType::Platform, sinks::FEE, &split.fee_platform, event_id)
                .await?;
            transactions.push(CreditTransaction::credit(
                fee_account.id,
                event_id,
                TransactionType::ReceiveFeePlatform,
                Some(credit_type),
                split.fee_platform,
            ));
        }

        if let Some((owner_type, owner_id)) = plan
            .fee_dev_recipient
            .filter(|_| quote.fee_dev.is_positive())
        {
            let dev_account = accounts
                .income(tx, owner_type, owner_id, &split.fee_dev, event_id)
                .await?;
            event.fee_dev_account = Some(dev_account.id);
            transactions.push(CreditTransaction::credit(
                dev_account.id,
                event_id,
                TransactionType::ReceiveFeeDev,
                Some(credit_type),
                split.fee_dev,
            ));
        }

        if quote.fee_agent.is_positive() {
            let agent_account = accounts
                .income(
                    tx,
                    OwnerType::Agent,
                    plan.agent.id.as_str(),
                    &split.fee_agent,
                    event_id,
                )
                .await?;
            event.fee_agent_account = Some(agent_account.id);
            transactions.push(CreditTransaction::credit(
                agent_account.id,
                event_id,
                TransactionType::ReceiveFeeAgent,
                Some(credit_type),
                split.fee_agent,
            ));
        }
    }

    event.account_id = payer_account.id;
    event.user_id = Some(plan.payer.clone());
    event.agent_id = Some(plan.agent.id.clone());
    event.total_amount = total;
    event.credit_type = Some(credit_type);
    event.credit_types = paid.kinds_used();
    event.balance_after = payer_account.total_balance();
    event.base = AmountSplit {
        amount: quote.base,
        by_kind: split.base,
    };
    event.base_original_amount = quote.base_original;
    event.base_discount_amount = quote.base_discount;
    event.fee_platform = AmountSplit {
        amount: quote.fee_platform,
        by_kind: split.fee_platform,
    };
    event.fee_dev = AmountSplit {
        amount: quote.fee_dev,
        by_kind: split.fee_dev,
    };
    event.fee_agent = AmountSplit {
        amount: quote.fee_agent,
        by_kind: split.fee_agent,
    };
    event.paid = paid;

    recorder::record(tx, &event, &transactions).await?;

    if paid.free.is_positive() {
        tx.add_agent_free_income(&plan.agent.id, paid.free, Utc::now().date_naive())
            .await?;
    }

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        upstream_tx_id = %event.upstream_tx_id,
        user_id = %plan.payer,
        agent_id = %plan.agent.id,
        total = %total,
        fee_platform = %quote.fee_platform,
        fee_dev = %quote.fee_dev,
        fee_agent = %quote.fee_agent,
        balance_after = %event.balance_after,
        "Expense recorded"
    );
    Ok(event)
}
