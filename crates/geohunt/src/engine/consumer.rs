//! Queue consumption into the ledger, one message at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use geohunt_broker::BrokerConnection;
use geohunt_proto::queues;
use geohunt_proto::wallet::{RewardEvent, TokenDebitEvent};

use super::error::HuntError;
use super::ledger::{Applied, WalletLedger};
use super::util::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerKind {
    RewardCredit,
    TokenDebit,
}

impl ConsumerKind {
    pub fn queue(self, env_id: &str) -> String {
        match self {
            ConsumerKind::RewardCredit => queues::queue_reward_credit(env_id),
            ConsumerKind::TokenDebit => queues::queue_token_debit(env_id),
        }
    }

    fn worker_name(self) -> &'static str {
        match self {
            ConsumerKind::RewardCredit => "gh-consumer-credit",
            ConsumerKind::TokenDebit => "gh-consumer-debit",
        }
    }
}

/// What one tick did. At most one message is pulled per tick; the insert
/// commits before the ack, and any processing error requeues the message
/// rather than discarding it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsumerTickReport {
    pub pulled: bool,
    pub redelivered: bool,
    pub applied: bool,
    pub duplicate: bool,
    pub requeued: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct WalletConsumer {
    connection: Arc<BrokerConnection>,
    ledger: WalletLedger,
    kind: ConsumerKind,
    queue: String,
}

impl WalletConsumer {
    pub fn new(
        connection: Arc<BrokerConnection>,
        ledger: WalletLedger,
        env_id: &str,
        kind: ConsumerKind,
    ) -> Self {
        let queue = kind.queue(env_id);
        Self {
            connection,
            ledger,
            kind,
            queue,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Pull and process at most one delivery. Duplicates (event key already in
    /// the ledger) are acked as successful no-ops; decode and apply errors
    /// negatively acknowledge so the broker redelivers.
    pub fn tick(&self, now_ms: i64) -> Result<ConsumerTickReport, HuntError> {
        let channel = self.connection.channel()?;
        let Some(delivery) = channel.pull(&self.queue)? else {
            return Ok(ConsumerTickReport::default());
        };
        let mut report = ConsumerTickReport {
            pulled: true,
            redelivered: delivery.redelivered,
            message_id: Some(delivery.message.message_id.clone()),
            ..ConsumerTickReport::default()
        };

        let applied = self.apply(&delivery.message.payload, now_ms);
        match applied {
            Ok(Applied::Inserted(_)) => {
                channel.ack(&self.queue, delivery.delivery_tag)?;
                report.applied = true;
            }
            Ok(Applied::Duplicate(_)) => {
                channel.ack(&self.queue, delivery.delivery_tag)?;
                report.duplicate = true;
            }
            Err(err) => {
                channel.nack_requeue(&self.queue, delivery.delivery_tag)?;
                report.requeued = true;
                report.error = Some(err.to_string());
            }
        }
        Ok(report)
    }

    fn apply(&self, payload: &[u8], now_ms: i64) -> Result<Applied, HuntError> {
        match self.kind {
            ConsumerKind::RewardCredit => {
                let event = RewardEvent::from_json_bytes(payload)?;
                self.ledger.apply_credit_event(&event, now_ms)
            }
            ConsumerKind::TokenDebit => {
                let event = TokenDebitEvent::from_json_bytes(payload)?;
                self.ledger.apply_debit_event(&event, now_ms)
            }
        }
    }
}

pub const DEFAULT_CONSUMER_TICK_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRuntimeConfig {
    pub tick_interval_ms: u64,
}

impl Default for ConsumerRuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_CONSUMER_TICK_INTERVAL_MS,
        }
    }
}

impl ConsumerRuntimeConfig {
    pub fn validate(&self) -> Result<(), HuntError> {
        if self.tick_interval_ms == 0 {
            return Err(HuntError::Validation {
                field: "tick_interval_ms".to_string(),
                reason: "consumer tick interval must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerRuntimeSnapshot {
    pub queue: String,
    pub running: bool,
    pub ticks: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub requeues: u64,
    pub errors: u64,
    pub last_tick_unix_ms: Option<i64>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct RuntimeState {
    ticks: u64,
    applied: u64,
    duplicates: u64,
    requeues: u64,
    errors: u64,
    last_tick_unix_ms: Option<i64>,
    last_error: Option<String>,
}

fn lock_state(state: &Arc<Mutex<RuntimeState>>) -> MutexGuard<'_, RuntimeState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Long-lived worker draining one wallet queue off the request path. One
/// thread per queue; the stop channel doubles as the tick timer.
pub struct WalletConsumerRuntime {
    consumer: Arc<WalletConsumer>,
    config: ConsumerRuntimeConfig,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<RuntimeState>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl WalletConsumerRuntime {
    pub fn new(consumer: WalletConsumer, config: ConsumerRuntimeConfig) -> Result<Self, HuntError> {
        config.validate()?;
        Ok(Self {
            consumer: Arc::new(consumer),
            config,
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(RuntimeState::default())),
            stop_tx: None,
            worker: None,
        })
    }

    pub fn start(&mut self) -> Result<(), HuntError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HuntError::Conflict {
                reason: format!(
                    "consumer runtime for {} is already running",
                    self.consumer.queue()
                ),
            });
        }
        {
            let mut state = lock_state(&self.state);
            *state = RuntimeState::default();
        }

        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);
        let consumer = Arc::clone(&self.consumer);
        let running = Arc::clone(&self.running);
        let state = Arc::clone(&self.state);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name(consumer.kind.worker_name().to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(tick_interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            // Drain whatever is queued, then go back to sleep.
                            loop {
                                if !running.load(Ordering::SeqCst) {
                                    break;
                                }
                                let now = now_ms();
                                let tick_result = consumer.tick(now);
                                let mut current = lock_state(&state);
                                current.ticks = current.ticks.saturating_add(1);
                                current.last_tick_unix_ms = Some(now);
                                match tick_result {
                                    Ok(report) => {
                                        if report.applied {
                                            current.applied = current.applied.saturating_add(1);
                                        }
                                        if report.duplicate {
                                            current.duplicates =
                                                current.duplicates.saturating_add(1);
                                        }
                                        if report.requeued {
                                            current.requeues = current.requeues.saturating_add(1);
                                            current.last_error = report.error.clone();
                                            // A requeued message sits at the
                                            // queue head; draining further
                                            // would spin on it.
                                            break;
                                        }
                                        current.last_error = None;
                                        if !report.pulled {
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        current.errors = current.errors.saturating_add(1);
                                        current.last_error = Some(err.to_string());
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|err| {
                self.running.store(false, Ordering::SeqCst);
                HuntError::Io(format!("failed to spawn consumer worker: {err}"))
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), HuntError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(HuntError::Conflict {
                reason: format!(
                    "consumer runtime for {} is not running",
                    self.consumer.queue()
                ),
            });
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| HuntError::FatalInvariant {
                reason: "consumer worker thread panicked".to_string(),
            })?;
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn snapshot(&self) -> ConsumerRuntimeSnapshot {
        let state = lock_state(&self.state);
        ConsumerRuntimeSnapshot {
            queue: self.consumer.queue().to_string(),
            running: self.running.load(Ordering::SeqCst),
            ticks: state.ticks,
            applied: state.applied,
            duplicates: state.duplicates,
            requeues: state.requeues,
            errors: state.errors,
            last_tick_unix_ms: state.last_tick_unix_ms,
            last_error: state.last_error.clone(),
        }
    }
}

impl Drop for WalletConsumerRuntime {
    fn drop(&mut self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.running.store(false, Ordering::SeqCst);
    }
}
