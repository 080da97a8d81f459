use super::super::*;
use super::{connected_broker, mission_task, sample_hunt, standard_tiers};
use crate::models::{LedgerCategory, WalletKind};
use geohunt_broker::{BrokerConnection, InMemoryBroker, QueueMessage};
use geohunt_proto::wallet::{token_debit_key, RewardEvent, TokenDebitEvent};
use std::sync::Arc;

const REWARD_QUEUE: &str = "gh.test.wallet.reward.credit";
const DEBIT_QUEUE: &str = "gh.test.wallet.token.debit";

struct Pipeline {
    hunt_store: Arc<InMemoryHuntStore>,
    wallet_store: Arc<InMemoryWalletStore>,
    broker: InMemoryBroker,
    connection: Arc<BrokerConnection>,
    audit: WalletAuditTrail,
    flow: CompletionFlow,
    ledger: WalletLedger,
    publisher: WalletEventPublisher,
    credit_consumer: WalletConsumer,
    debit_consumer: WalletConsumer,
}

fn pipeline() -> Pipeline {
    let hunt_store = Arc::new(InMemoryHuntStore::new());
    let mut hunt = sample_hunt("hunt-1", "zone-1");
    hunt.task_ids = vec!["task-1".to_string()];
    hunt_store.upsert_hunt(hunt);
    hunt_store.upsert_task(mission_task("task-1", "hunt-1", standard_tiers()));

    let (broker, connection) = connected_broker();
    let audit = WalletAuditTrail::new();
    let policy = PublishRetryPolicy {
        max_attempts: 3,
        base_delay_ms: 0,
    };
    let publisher =
        WalletEventPublisher::with_policy(connection.clone(), "test", audit.clone(), policy)
            .expect("valid policy");
    publisher.declare_queues().expect("declare queues");
    let flow = CompletionFlow::new(hunt_store.clone(), publisher.clone());

    let wallet_store = Arc::new(InMemoryWalletStore::new());
    let ledger = WalletLedger::new(wallet_store.clone(), audit.clone());
    let credit_consumer = WalletConsumer::new(
        connection.clone(),
        ledger.clone(),
        "test",
        ConsumerKind::RewardCredit,
    );
    let debit_consumer = WalletConsumer::new(
        connection.clone(),
        ledger.clone(),
        "test",
        ConsumerKind::TokenDebit,
    );
    Pipeline {
        hunt_store,
        wallet_store,
        broker,
        connection,
        audit,
        flow,
        ledger,
        publisher,
        credit_consumer,
        debit_consumer,
    }
}

fn complete_for(pipeline: &Pipeline, user_id: &str, now_ms: i64) -> CompleteTaskOutcome {
    pipeline
        .hunt_store
        .insert_claim(user_id, "hunt-1", now_ms - 1_000, now_ms + 600_000)
        .expect("insert claim");
    pipeline
        .flow
        .complete_task("hunt-1", "task-1", user_id, &[], now_ms)
        .expect("complete task")
}

#[test]
fn a_reward_flows_from_completion_to_the_coin_wallet() {
    let pipeline = pipeline();

    let outcome = complete_for(&pipeline, "user-1", 20_000);
    let report = outcome.publish.expect("reward published");
    assert!(report.delivered);
    assert_eq!(pipeline.broker.queue_depth(REWARD_QUEUE), 1);

    let tick = pipeline.credit_consumer.tick(21_000).expect("consume");
    assert!(tick.pulled);
    assert!(tick.applied);
    assert!(!tick.redelivered);

    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Coin), 100);
    let entries = pipeline.wallet_store.entries_for("user-1");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].category, LedgerCategory::Task);
    assert_eq!(
        entries[0].event_key.as_deref(),
        Some(report.message_id.as_str())
    );
    assert_eq!(pipeline.audit.count_of_kind(AuditKind::CreditApplied), 1);

    // Queue drained; the next tick pulls nothing.
    let idle = pipeline.credit_consumer.tick(22_000).expect("idle tick");
    assert!(!idle.pulled);
}

#[test]
fn redelivery_after_a_consumer_crash_credits_exactly_once() {
    let pipeline = pipeline();
    complete_for(&pipeline, "user-1", 20_000);

    // The consumer applies the credit but dies before acking.
    let channel = pipeline.connection.channel().expect("channel");
    let delivery = channel
        .pull(REWARD_QUEUE)
        .expect("pull")
        .expect("one delivery");
    let event =
        RewardEvent::from_json_bytes(&delivery.message.payload).expect("decode reward event");
    pipeline
        .ledger
        .apply_credit_event(&event, 21_000)
        .expect("apply credit");
    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Coin), 100);

    // Session teardown returns the unacked delivery to the queue.
    pipeline.connection.close().expect("close");
    pipeline.connection.connect().expect("reconnect");
    assert_eq!(pipeline.broker.queue_depth(REWARD_QUEUE), 1);

    let tick = pipeline.credit_consumer.tick(22_000).expect("redelivery");
    assert!(tick.pulled);
    assert!(tick.redelivered);
    assert!(tick.duplicate);
    assert!(!tick.applied);

    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Coin), 100);
    assert_eq!(pipeline.wallet_store.entries_for("user-1").len(), 1);
    assert_eq!(
        pipeline.audit.count_of_kind(AuditKind::DuplicateEventSkipped),
        1
    );
}

#[test]
fn malformed_payloads_are_requeued_not_dropped() {
    let pipeline = pipeline();
    let channel = pipeline.connection.channel().expect("channel");
    channel
        .publish(
            REWARD_QUEUE,
            &QueueMessage::persistent("poison", b"not json".to_vec()),
        )
        .expect("publish poison");

    let tick = pipeline.credit_consumer.tick(20_000).expect("tick");
    assert!(tick.pulled);
    assert!(tick.requeued);
    assert!(tick.error.is_some());
    assert_eq!(pipeline.broker.queue_depth(REWARD_QUEUE), 1);

    // The message comes back flagged as redelivered and stays in the queue.
    let again = pipeline.credit_consumer.tick(21_000).expect("tick again");
    assert!(again.redelivered);
    assert!(again.requeued);
    assert_eq!(pipeline.broker.queue_depth(REWARD_QUEUE), 1);
    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Coin), 0);
}

#[test]
fn token_debits_flow_through_their_own_queue() {
    let pipeline = pipeline();
    pipeline
        .ledger
        .credit(
            "user-1",
            WalletKind::Token,
            50,
            LedgerCategory::Payment,
            "token pack",
            None,
            None,
            10_000,
        )
        .expect("seed tokens");

    let event = TokenDebitEvent {
        user_id: "user-1".to_string(),
        amount: 30,
        hunt_id: Some("hunt-1".to_string()),
        clue_id: Some("clue-1".to_string()),
        reason: "hint unlock".to_string(),
        timestamp_ms: 20_000,
        idempotency_key: token_debit_key("user-1", "clue-1", 20_000),
    };
    let report = pipeline.publisher.publish_debit(&event).expect("publish");
    assert!(report.delivered);
    assert_eq!(pipeline.broker.queue_depth(DEBIT_QUEUE), 1);

    let tick = pipeline.debit_consumer.tick(21_000).expect("consume debit");
    assert!(tick.applied);
    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Token), 20);
    assert_eq!(pipeline.audit.count_of_kind(AuditKind::DebitApplied), 1);

    // The coin wallet is untouched by a token debit.
    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Coin), 0);
}

#[test]
fn a_closed_connection_surfaces_as_transient_infrastructure() {
    let pipeline = pipeline();
    pipeline.connection.close().expect("close");

    let err = pipeline
        .credit_consumer
        .tick(20_000)
        .expect_err("no session");
    assert!(matches!(err, HuntError::TransientInfra { .. }));
    assert_eq!(err.http_status(), 503);
}

#[test]
fn consumed_rewards_leave_no_unacked_deliveries_behind() {
    let pipeline = pipeline();
    complete_for(&pipeline, "user-1", 20_000);
    complete_for(&pipeline, "user-2", 20_500);
    assert_eq!(pipeline.broker.queue_depth(REWARD_QUEUE), 2);

    let first = pipeline.credit_consumer.tick(21_000).expect("first");
    let second = pipeline.credit_consumer.tick(21_100).expect("second");
    assert!(first.applied && second.applied);
    assert_eq!(pipeline.broker.queue_depth(REWARD_QUEUE), 0);
    assert_eq!(pipeline.broker.unacked_count(REWARD_QUEUE), 0);

    assert_eq!(pipeline.ledger.balance("user-1", WalletKind::Coin), 100);
    assert_eq!(pipeline.ledger.balance("user-2", WalletKind::Coin), 100);
}
