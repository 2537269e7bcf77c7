//! Recharge, reward, withdraw and adjustment integration tests.

mod common;

use rust_decimal_macros::dec;

use common::{credits, TestHarness, AGENT, ORPHAN, OWNER};
use credit_ledger_core::{
    sinks, AgentId, CreditDebit, CreditKind, Credits, Direction, EventType, LedgerError,
    OwnerType, RewardType, TransactionType, UserId,
};

async fn earn_agent_fee(harness: &TestHarness) {
    harness.fund("u1", 100).await;
    harness
        .ledger
        .expense_message(&TestHarness::message("u1", "m1", Credits::whole(10), AGENT))
        .await
        .unwrap();
}

// ============================================================================
// Recharge
// ============================================================================

#[tokio::test]
async fn recharge_moves_permanent_credits_from_sink() {
    let harness = TestHarness::new();

    let settlement = harness
        .ledger
        .recharge(&UserId::new("u1"), Credits::whole(100), "tx-1", Some("card"))
        .await
        .unwrap();

    let event = &settlement.event;
    assert_eq!(event.event_type, EventType::Recharge);
    assert_eq!(event.direction, Direction::Income);
    assert_eq!(event.total_amount, Credits::whole(100));
    assert_eq!(event.credit_type, Some(CreditKind::Permanent));
    assert_eq!(event.note.as_deref(), Some("card"));
    assert_eq!(event.balance_after, Credits::whole(100));
    assert!(event.is_balanced());
    assert_eq!(settlement.account.balance.permanent, Credits::whole(100));
    assert_eq!(settlement.account.free_quota, Credits::whole(480));

    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::RECHARGE).await.permanent,
        Credits::whole(-100)
    );

    let lines = harness.transactions(&event.id).await;
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.change_amount == Credits::whole(100)));
    assert!(lines.iter().all(|line| line.tx_type == TransactionType::Recharge));
    assert!(lines
        .iter()
        .any(|line| line.credit_debit == CreditDebit::Credit && line.account_id == settlement.account.id));
}

#[tokio::test]
async fn recharge_rejects_non_positive_amount() {
    let harness = TestHarness::new();

    for amount in [Credits::ZERO, Credits::whole(-5)] {
        let result = harness
            .ledger
            .recharge(&UserId::new("u1"), amount, "tx-1", None)
            .await;
        assert!(matches!(result, Err(LedgerError::Validation(_))));
    }
    assert!(harness.account(OwnerType::User, "u1").await.is_none());
}

#[tokio::test]
async fn recharge_rejects_reused_key() {
    let harness = TestHarness::new();
    let user = UserId::new("u1");

    harness
        .ledger
        .recharge(&user, Credits::whole(10), "tx-1", None)
        .await
        .unwrap();
    let result = harness
        .ledger
        .recharge(&user, Credits::whole(10), "tx-1", None)
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::DuplicateTransaction { ref upstream_tx_id, .. }) if upstream_tx_id == "tx-1"
    ));
    assert_eq!(
        harness.balance(OwnerType::User, "u1").await.permanent,
        Credits::whole(10)
    );
}

#[tokio::test]
async fn empty_key_is_rejected() {
    let harness = TestHarness::new();

    let result = harness
        .ledger
        .recharge(&UserId::new("u1"), Credits::whole(10), "", None)
        .await;

    assert!(matches!(result, Err(LedgerError::Validation(_))));
}

// ============================================================================
// Reward
// ============================================================================

#[tokio::test]
async fn reward_types_set_event_and_line_type() {
    let harness = TestHarness::new();
    let user = UserId::new("u1");

    let cases = [
        (RewardType::Reward, EventType::Reward, TransactionType::Reward),
        (RewardType::EventReward, EventType::EventReward, TransactionType::EventReward),
        (RewardType::RechargeBonus, EventType::RechargeBonus, TransactionType::RechargeBonus),
    ];
    for (i, (reward_type, event_type, tx_type)) in cases.into_iter().enumerate() {
        let settlement = harness
            .ledger
            .reward(&user, Credits::whole(5), &format!("reward-{i}"), reward_type, None)
            .await
            .unwrap();
        assert_eq!(settlement.event.event_type, event_type);
        assert_eq!(settlement.event.credit_type, Some(CreditKind::Reward));
        let lines = harness.transactions(&settlement.event.id).await;
        assert!(lines.iter().all(|line| line.tx_type == tx_type));
    }

    assert_eq!(
        harness.balance(OwnerType::User, "u1").await.reward,
        Credits::whole(15)
    );
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::REWARD).await.reward,
        Credits::whole(-15)
    );
}

// ============================================================================
// Withdraw
// ============================================================================

#[tokio::test]
async fn withdraw_pays_out_agent_earnings() {
    let harness = TestHarness::new();
    earn_agent_fee(&harness).await;

    let settlement = harness
        .ledger
        .withdraw(&AgentId::new(AGENT), Credits::whole(1), "wd-1", Some("payout"))
        .await
        .unwrap();

    let agent = harness.account(OwnerType::Agent, AGENT).await.unwrap();
    assert_eq!(agent.balance.permanent, credits(dec!(0.1)));
    assert_eq!(settlement.account.id, agent.id);

    let event = &settlement.event;
    assert_eq!(event.event_type, EventType::Withdraw);
    assert_eq!(event.direction, Direction::Expense);
    assert_eq!(event.account_id, agent.id);
    assert_eq!(event.user_id, Some(UserId::new(OWNER)));
    assert_eq!(event.agent_id, Some(AgentId::new(AGENT)));
    assert_eq!(event.balance_after, credits(dec!(0.1)));

    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::WITHDRAW).await.permanent,
        Credits::whole(1)
    );
}

#[tokio::test]
async fn withdraw_requires_permanent_balance() {
    let harness = TestHarness::new();
    earn_agent_fee(&harness).await;

    let result = harness
        .ledger
        .withdraw(&AgentId::new(AGENT), Credits::whole(5), "wd-1", None)
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::InsufficientBalance {
            kind: CreditKind::Permanent,
            ..
        })
    ));
    assert_eq!(
        harness.balance(OwnerType::Agent, AGENT).await.permanent,
        credits(dec!(1.1))
    );
}

#[tokio::test]
async fn withdraw_rejects_agent_without_owner() {
    let harness = TestHarness::new();

    let result = harness
        .ledger
        .withdraw(&AgentId::new(ORPHAN), Credits::whole(1), "wd-1", None)
        .await;

    assert!(matches!(result, Err(LedgerError::Validation(_))));
}

#[tokio::test]
async fn withdraw_rejects_unknown_agent() {
    let harness = TestHarness::new();

    let result = harness
        .ledger
        .withdraw(&AgentId::new("ghost"), Credits::whole(1), "wd-1", None)
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::NotFound { entity: "agent", .. })
    ));
}

// ============================================================================
// Adjustment
// ============================================================================

#[tokio::test]
async fn positive_adjustment_credits_user() {
    let harness = TestHarness::new();

    let settlement = harness
        .ledger
        .adjustment(&UserId::new("u1"), CreditKind::Free, Credits::whole(7), "adj-1", "support")
        .await
        .unwrap();

    assert_eq!(settlement.event.direction, Direction::Income);
    assert_eq!(settlement.event.note.as_deref(), Some("support"));
    assert_eq!(settlement.account.balance.free, Credits::whole(7));
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::ADJUSTMENT).await.free,
        Credits::whole(-7)
    );
}

#[tokio::test]
async fn negative_adjustment_may_overdraw() {
    let harness = TestHarness::new();

    let settlement = harness
        .ledger
        .adjustment(&UserId::new("u1"), CreditKind::Reward, Credits::whole(-3), "adj-1", "clawback")
        .await
        .unwrap();

    assert_eq!(settlement.event.direction, Direction::Expense);
    assert_eq!(settlement.event.total_amount, Credits::whole(3));
    assert_eq!(settlement.account.balance.reward, Credits::whole(-3));
    assert_eq!(
        harness.balance(OwnerType::Platform, sinks::ADJUSTMENT).await.reward,
        Credits::whole(3)
    );

    let lines = harness.transactions(&settlement.event.id).await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].change_amount, lines[1].change_amount);
}

#[tokio::test]
async fn adjustment_requires_amount_and_note() {
    let harness = TestHarness::new();
    let user = UserId::new("u1");

    let zero = harness
        .ledger
        .adjustment(&user, CreditKind::Free, Credits::ZERO, "adj-1", "note")
        .await;
    assert!(matches!(zero, Err(LedgerError::Validation(_))));

    let no_note = harness
        .ledger
        .adjustment(&user, CreditKind::Free, Credits::whole(1), "adj-1", "  ")
        .await;
    assert!(matches!(no_note, Err(LedgerError::Validation(_))));

    assert!(harness.account(OwnerType::User, "u1").await.is_none());
}

// ============================================================================
// Quota
// ============================================================================

#[tokio::test]
async fn update_daily_quota_changes_only_given_values() {
    let harness = TestHarness::new();
    let user = UserId::new("u1");

    let account = harness
        .ledger
        .update_daily_quota(&user, Some(Credits::whole(100)), None, "quota-1", "vip")
        .await
        .unwrap();

    assert_eq!(account.free_quota, Credits::whole(100));
    assert_eq!(account.refill_amount, Credits::whole(20));
    assert!(account.balance.total().is_zero());

    let missing = harness
        .ledger
        .update_daily_quota(&user, None, None, "quota-2", "vip")
        .await;
    assert!(matches!(missing, Err(LedgerError::Validation(_))));
}
