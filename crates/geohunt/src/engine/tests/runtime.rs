use super::super::*;
use super::{connected_broker, mission_task, sample_hunt, standard_tiers};
use crate::models::WalletKind;
use geohunt_broker::{DurableBroker, InMemoryBroker, QueueMessage};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const REWARD_QUEUE: &str = "gh.test.wallet.reward.credit";

struct RuntimeHarness {
    hunt_store: Arc<InMemoryHuntStore>,
    broker: InMemoryBroker,
    flow: CompletionFlow,
    ledger: WalletLedger,
    consumer: WalletConsumer,
}

fn runtime_harness() -> RuntimeHarness {
    let hunt_store = Arc::new(InMemoryHuntStore::new());
    let mut hunt = sample_hunt("hunt-1", "zone-1");
    hunt.task_ids = vec!["task-1".to_string()];
    hunt_store.upsert_hunt(hunt);
    hunt_store.upsert_task(mission_task("task-1", "hunt-1", standard_tiers()));

    let (broker, connection) = connected_broker();
    let audit = WalletAuditTrail::new();
    let publisher = WalletEventPublisher::new(connection.clone(), "test", audit.clone());
    publisher.declare_queues().expect("declare queues");
    let flow = CompletionFlow::new(hunt_store.clone(), publisher);

    let ledger = WalletLedger::new(Arc::new(InMemoryWalletStore::new()), audit);
    let consumer = WalletConsumer::new(connection, ledger.clone(), "test", ConsumerKind::RewardCredit);
    RuntimeHarness {
        hunt_store,
        broker,
        flow,
        ledger,
        consumer,
    }
}

fn complete_for(harness: &RuntimeHarness, user_id: &str, now_ms: i64) {
    harness
        .hunt_store
        .insert_claim(user_id, "hunt-1", now_ms - 1_000, now_ms + 600_000)
        .expect("insert claim");
    harness
        .flow
        .complete_task("hunt-1", "task-1", user_id, &[], now_ms)
        .expect("complete task");
}

#[test]
fn runtime_drains_queued_rewards_in_the_background() {
    let harness = runtime_harness();
    complete_for(&harness, "user-1", 20_000);
    complete_for(&harness, "user-2", 20_500);
    assert_eq!(harness.broker.queue_depth(REWARD_QUEUE), 2);

    let config = ConsumerRuntimeConfig {
        tick_interval_ms: 10,
    };
    let mut runtime =
        WalletConsumerRuntime::new(harness.consumer.clone(), config).expect("runtime");
    runtime.start().expect("start");
    thread::sleep(Duration::from_millis(60));

    let running = runtime.snapshot();
    assert!(running.running);
    assert_eq!(running.queue, REWARD_QUEUE);
    assert!(running.ticks >= 2);
    assert_eq!(running.applied, 2);
    assert!(running.last_tick_unix_ms.is_some());
    assert!(running.last_error.is_none());

    runtime.stop().expect("stop");
    let stopped = runtime.snapshot();
    assert!(!stopped.running);
    assert_eq!(stopped.applied, 2);
    assert_eq!(harness.broker.queue_depth(REWARD_QUEUE), 0);
    assert_eq!(harness.ledger.balance("user-1", WalletKind::Coin), 100);
    assert_eq!(harness.ledger.balance("user-2", WalletKind::Coin), 100);
}

#[test]
fn runtime_rejects_double_start() {
    let harness = runtime_harness();
    let mut runtime = WalletConsumerRuntime::new(harness.consumer.clone(), Default::default())
        .expect("runtime");
    runtime.start().expect("first start");
    let err = runtime.start().expect_err("second start must fail");
    assert!(matches!(err, HuntError::Conflict { .. }));
    runtime.stop().expect("stop");
}

#[test]
fn stopping_a_runtime_that_never_started_is_a_conflict() {
    let harness = runtime_harness();
    let mut runtime = WalletConsumerRuntime::new(harness.consumer.clone(), Default::default())
        .expect("runtime");
    let err = runtime.stop().expect_err("nothing to stop");
    assert!(matches!(err, HuntError::Conflict { .. }));
}

#[test]
fn restart_resets_the_tick_counters() {
    let harness = runtime_harness();
    let config = ConsumerRuntimeConfig {
        tick_interval_ms: 200,
    };
    let mut runtime =
        WalletConsumerRuntime::new(harness.consumer.clone(), config).expect("runtime");

    runtime.start().expect("first start");
    thread::sleep(Duration::from_millis(450));
    runtime.stop().expect("stop");
    let first_run = runtime.snapshot();
    assert!(first_run.ticks >= 2);

    runtime.start().expect("second start");
    let fresh = runtime.snapshot();
    assert!(fresh.ticks <= 1);
    runtime.stop().expect("stop again");
}

#[test]
fn runtime_counts_requeues_without_spinning_on_poison() {
    let harness = runtime_harness();
    harness
        .broker
        .publish(
            REWARD_QUEUE,
            &QueueMessage::persistent("poison", b"not json".to_vec()),
        )
        .expect("publish poison");

    let config = ConsumerRuntimeConfig {
        tick_interval_ms: 10,
    };
    let mut runtime =
        WalletConsumerRuntime::new(harness.consumer.clone(), config).expect("runtime");
    runtime.start().expect("start");
    thread::sleep(Duration::from_millis(60));
    runtime.stop().expect("stop");

    let snapshot = runtime.snapshot();
    assert!(snapshot.requeues >= 1);
    assert!(snapshot.last_error.is_some());
    // The message is still there for a fixed build to pick up.
    assert_eq!(harness.broker.queue_depth(REWARD_QUEUE), 1);
    assert_eq!(harness.ledger.balance("user-1", WalletKind::Coin), 0);
}

#[test]
fn zero_tick_interval_is_rejected() {
    let harness = runtime_harness();
    let config = ConsumerRuntimeConfig {
        tick_interval_ms: 0,
    };
    let err = WalletConsumerRuntime::new(harness.consumer.clone(), config)
        .err()
        .expect("invalid interval");
    assert!(matches!(err, HuntError::Validation { .. }));
}
