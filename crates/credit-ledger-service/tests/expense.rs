//! Usage charge integration tests.

mod common;

use chrono::Utc;
use rust_decimal_macros::dec;

use common::{credits, TestHarness, AGENT, FREE_AGENT, OWNER, SKILL_AUTHOR};
use credit_ledger_core::{
    sinks, AgentBilling, AgentId, CreditDebit, CreditKind, Credits, EventType, LedgerError,
    OwnerType, PaymentSettings, RewardType, TransactionType, UpstreamType, UserId,
};
use credit_ledger_store::{LedgerTx as _, Store};

// ============================================================================
// Messages
// ============================================================================

#[tokio::test]
async fn message_charges_base_and_platform_fee() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let event = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.event_type, EventType::Message);
    assert_eq!(event.upstream_type, UpstreamType::Executor);
    assert_eq!(event.upstream_tx_id, "m1");
    assert_eq!(event.total_amount, credits(dec!(1.1)));
    assert_eq!(event.base.amount, Credits::whole(1));
    assert_eq!(event.fee_platform.amount, credits(dec!(0.1)));
    assert!(event.fee_agent.amount.is_zero());
    assert_eq!(event.credit_type, Some(CreditKind::Permanent));
    assert_eq!(event.balance_after, credits(dec!(98.9)));
    assert!(event.is_balanced());

    let payer = harness.balance(OwnerType::User, "u1").await;
    assert_eq!(payer.permanent, credits(dec!(98.9)));
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::MESSAGE).await.permanent,
        Credits::whole(1)
    );
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::FEE).await.permanent,
        credits(dec!(0.1))
    );

    let lines = harness.transactions(&event.id).await;
    assert_eq!(lines.len(), 3);
    let pay = lines
        .iter()
        .find(|line| line.tx_type == TransactionType::Pay)
        .unwrap();
    assert_eq!(pay.credit_debit, CreditDebit::Debit);
    assert_eq!(pay.change_amount, credits(dec!(1.1)));
    assert!(lines
        .iter()
        .any(|line| line.tx_type == TransactionType::ReceiveBaseLlm));
    assert!(lines
        .iter()
        .any(|line| line.tx_type == TransactionType::ReceiveFeePlatform));
}

#[tokio::test]
async fn message_pays_agent_fee_on_base_plus_platform_fee() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let event = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(10), AGENT))
        .await
        .unwrap();

    assert_eq!(event.fee_platform.amount, Credits::whole(1));
    assert_eq!(event.fee_agent.amount, credits(dec!(1.1)));
    assert_eq!(event.total_amount, credits(dec!(12.1)));
    assert_eq!(event.model.as_deref(), Some("gpt-4o"));
    assert!(event.is_balanced());

    let agent = harness.account(OwnerType::Agent, AGENT).await.unwrap();
    assert_eq!(agent.balance.permanent, credits(dec!(1.1)));
    assert_eq!(event.fee_agent_account, Some(agent.id));
    assert_eq!(harness.transactions(&event.id).await.len(), 4);
}

#[tokio::test]
async fn owner_pays_no_agent_fee() {
    let harness = TestHarness::new();
    harness.fund(OWNER, 100).await;

    let event = harness
        .ledger
        .expense_message(&TestHarness::message(OWNER, "m1", Credits::whole(10), AGENT))
        .await
        .unwrap();

    assert_eq!(event.total_amount, Credits::whole(11));
    assert!(event.fee_agent.amount.is_zero());
    assert!(event.fee_agent_account.is_none());
    assert!(harness.account(OwnerType::Agent, AGENT).await.is_none());
}

#[tokio::test]
async fn free_credits_are_spent_first() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;
    harness
        .ledger
        .adjustment(&UserId::new("u1"), CreditKind::Free, Credits::whole(5), "grant-1", "welcome")
        .await
        .unwrap();

    let event = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.paid.free, credits(dec!(1.1)));
    assert!(event.paid.permanent.is_zero());
    assert_eq!(event.credit_type, Some(CreditKind::Free));
    assert_eq!(event.credit_types, vec![CreditKind::Free]);

    let payer = harness.balance(OwnerType::User, "u1").await;
    assert_eq!(payer.free, credits(dec!(3.9)));
    assert_eq!(payer.permanent, Credits::whole(100));

    let mut tx = harness.store.begin().await.unwrap();
    let quota = tx
        .get_agent_quota(&AgentId::new(FREE_AGENT))
        .await
        .unwrap()
        .unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(quota.free_income_daily, credits(dec!(1.1)));
    assert_eq!(quota.day, Utc::now().date_naive());
}

#[tokio::test]
async fn mixed_payment_splits_every_leg_by_kind() {
    let harness = TestHarness::new();
    harness
        .ledger
        .adjustment(&UserId::new("u1"), CreditKind::Free, credits(dec!(0.5)), "grant-1", "welcome")
        .await
        .unwrap();
    harness.fund("u1", 100).await;

    let event = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.paid.free, credits(dec!(0.5)));
    assert_eq!(event.paid.permanent, credits(dec!(0.6)));
    assert_eq!(event.credit_type, Some(CreditKind::Permanent));
    assert_eq!(event.credit_types, vec![CreditKind::Free, CreditKind::Permanent]);

    assert_eq!(event.fee_platform.by_kind.free, credits(dec!(0.0455)));
    assert_eq!(event.fee_platform.by_kind.permanent, credits(dec!(0.0545)));
    assert_eq!(event.base.by_kind.free, credits(dec!(0.4545)));
    assert_eq!(event.base.by_kind.permanent, credits(dec!(0.5455)));
    assert!(event.is_balanced());
}

#[tokio::test]
async fn free_and_reward_payment_rounds_into_reward() {
    let harness = TestHarness::with_settings(PaymentSettings {
        fee_platform_percentage: dec!(20),
        ..PaymentSettings::default()
    });
    let user = UserId::new("u1");
    harness
        .ledger
        .adjustment(&user, CreditKind::Free, credits(dec!(0.0003)), "grant-1", "welcome")
        .await
        .unwrap();
    harness
        .ledger
        .reward(&user, Credits::whole(100), "reward-1", RewardType::Reward, None)
        .await
        .unwrap();

    let event = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.paid.free, credits(dec!(0.0003)));
    assert_eq!(event.paid.reward, credits(dec!(1.1997)));
    assert_eq!(event.fee_platform.by_kind.free, credits(dec!(0.0001)));
    assert_eq!(event.fee_platform.by_kind.reward, credits(dec!(0.1999)));
    assert!(event.fee_platform.by_kind.permanent.is_zero());
    assert!(event.base.by_kind.permanent.is_zero());
    assert!(event.is_balanced());

    let fee_sink = harness.balance(OwnerType::Platform, sinks::FEE).await;
    assert_eq!(fee_sink.total(), credits(dec!(0.2)));
    assert!(fee_sink.permanent.is_zero());
}

#[tokio::test]
async fn negative_kind_counts_against_the_charge() {
    let harness = TestHarness::new();
    let user = UserId::new("u1");
    harness.fund("u1", 10).await;
    harness
        .ledger
        .adjustment(&user, CreditKind::Free, Credits::whole(-5), "debt-1", "clawback")
        .await
        .unwrap();

    let result = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", credits(dec!(7.2)), FREE_AGENT))
        .await;

    match result {
        Err(LedgerError::InsufficientCredits {
            available,
            required,
        }) => {
            assert_eq!(available, Credits::whole(5));
            assert_eq!(required, credits(dec!(7.92)));
        }
        other => panic!("Expected InsufficientCredits, got {other:?}"),
    }
    let payer = harness.balance(OwnerType::User, "u1").await;
    assert_eq!(payer.free, Credits::whole(-5));
    assert_eq!(payer.permanent, Credits::whole(10));
}

#[tokio::test]
async fn duplicate_message_is_rejected() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;
    let charge = TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT);

    harness.ledger.expense_message(&charge).await.unwrap();
    let result = harness.ledger.expense_message(&charge).await;

    assert!(matches!(
        result,
        Err(LedgerError::DuplicateTransaction { .. })
    ));
    assert_eq!(
        harness.balance(OwnerType::User, "u1").await.permanent,
        credits(dec!(98.9))
    );
}

#[tokio::test]
async fn insufficient_credits_leave_nothing_behind() {
    let harness = TestHarness::new();
    harness.fund("u1", 1).await;

    let result = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT))
        .await;

    match result {
        Err(LedgerError::InsufficientCredits {
            available,
            required,
        }) => {
            assert_eq!(available, Credits::whole(1));
            assert_eq!(required, credits(dec!(1.1)));
        }
        other => panic!("Expected InsufficientCredits, got {other:?}"),
    }
    assert_eq!(
        harness.balance(OwnerType::User, "u1").await.permanent,
        Credits::whole(1)
    );
    assert!(matches!(
        harness.ledger.fetch_event_by_upstream_tx_id("m1").await,
        Err(LedgerError::NotFound { .. })
    ));
    assert!(harness.account(OwnerType::Platform, sinks::MESSAGE).await.is_none());
}

#[tokio::test]
async fn negative_base_is_rejected() {
    let harness = TestHarness::new();

    let result = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(-1), FREE_AGENT))
        .await;

    assert!(matches!(result, Err(LedgerError::Validation(_))));
}

#[tokio::test]
async fn disabled_payment_records_a_free_event() {
    let harness = TestHarness::with_settings(PaymentSettings {
        payment_enabled: false,
        ..PaymentSettings::default()
    });

    let event = harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(5), AGENT))
        .await
        .unwrap();

    assert!(event.total_amount.is_zero());
    assert_eq!(event.base_original_amount, Credits::whole(5));
    assert_eq!(event.base_discount_amount, Credits::whole(5));
    assert!(event.fee_agent.amount.is_zero());
    assert!(harness.transactions(&event.id).await.is_empty());
    assert!(harness.account(OwnerType::User, "u1").await.is_some());
}

// ============================================================================
// Skills
// ============================================================================

#[tokio::test]
async fn skill_pays_developer_fee_to_author() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let event = harness
        .ledger
        .expense_skill(&TestHarness::skill("u1", "m1", "c1", "web_search", FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.event_type, EventType::SkillCall);
    assert_eq!(event.upstream_tx_id, "m1_c1");
    assert_eq!(event.skill_name.as_deref(), Some("web_search"));
    assert_eq!(event.base_skill_amount, Credits::whole(10));
    assert_eq!(event.fee_dev.amount, Credits::whole(1));
    assert_eq!(event.total_amount, Credits::whole(12));
    assert!(event.is_balanced());

    let author = harness.account(OwnerType::User, SKILL_AUTHOR).await.unwrap();
    assert_eq!(author.balance.permanent, Credits::whole(1));
    assert_eq!(event.fee_dev_account, Some(author.id));
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::SKILL).await.permanent,
        Credits::whole(10)
    );

    let lines = harness.transactions(&event.id).await;
    assert_eq!(lines.len(), 4);
    assert!(lines
        .iter()
        .any(|line| line.tx_type == TransactionType::ReceiveFeeDev));
}

#[tokio::test]
async fn skill_on_owner_key_uses_self_key_price() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let mut charge = TestHarness::skill("u1", "m1", "c1", "web_search", FREE_AGENT);
    charge.agent = AgentBilling::new(FREE_AGENT)
        .with_owner(OWNER)
        .with_owner_key("search");

    let event = harness.ledger.expense_skill(&charge).await.unwrap();

    assert_eq!(event.base_skill_amount, Credits::whole(5));
    assert_eq!(event.total_amount, Credits::whole(6));
}

#[tokio::test]
async fn skill_without_author_pays_platform_dev_sink() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let event = harness
        .ledger
        .expense_skill(&TestHarness::skill("u1", "m1", "c1", "calculator", FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.total_amount, Credits::whole(12));
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::DEV).await.permanent,
        Credits::whole(1)
    );
}

#[tokio::test]
async fn unknown_skill_is_not_found() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let result = harness
        .ledger
        .expense_skill(&TestHarness::skill("u1", "m1", "c1", "teleport", FREE_AGENT))
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::NotFound { entity: "skill", .. })
    ));
    assert_eq!(
        harness.balance(OwnerType::User, "u1").await.permanent,
        Credits::whole(100)
    );
}

#[tokio::test]
async fn skill_cost_matches_charge() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;
    let agent = TestHarness::agent(AGENT);

    let cost = harness
        .ledger
        .skill_cost("web_search", &UserId::new("u1"), &agent)
        .unwrap();
    let event = harness
        .ledger
        .expense_skill(&TestHarness::skill("u1", "m1", "c1", "web_search", AGENT))
        .await
        .unwrap();

    assert_eq!(cost.total_amount(), credits(dec!(13.2)));
    assert_eq!(event.total_amount, cost.total_amount());
    assert_eq!(event.fee_agent.amount, credits(dec!(1.2)));
}

// ============================================================================
// Memory
// ============================================================================

#[tokio::test]
async fn summarize_bills_the_memory_sink() {
    let harness = TestHarness::new();
    harness.fund("u1", 100).await;

    let event = harness
        .ledger
        .expense_summarize(&TestHarness::message("u1", "m1", Credits::whole(1), FREE_AGENT))
        .await
        .unwrap();

    assert_eq!(event.event_type, EventType::Memory);
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::MEMORY).await.permanent,
        Credits::whole(1)
    );
    assert!(harness
        .transactions(&event.id)
        .await
        .iter()
        .any(|line| line.tx_type == TransactionType::ReceiveBaseMemory));
}
