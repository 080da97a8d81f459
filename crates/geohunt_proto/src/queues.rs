//! Queue and exchange naming conventions.
//!
//! Both wallet queues are durable and bound to one direct-routed exchange; the
//! routing key of each queue is the queue name itself. Names are scoped by the
//! deployment environment so staging and production brokers never collide.

pub const QUEUE_PREFIX: &str = "gh";
pub const WALLET_EXCHANGE_SUFFIX: &str = "wallet.direct";
pub const QUEUE_REWARD_CREDIT_SUFFIX: &str = "wallet.reward.credit";
pub const QUEUE_TOKEN_DEBIT_SUFFIX: &str = "wallet.token.debit";

pub fn scoped_name(env_id: &str, suffix: &str) -> String {
    format!("{QUEUE_PREFIX}.{env_id}.{suffix}")
}

pub fn wallet_exchange(env_id: &str) -> String {
    scoped_name(env_id, WALLET_EXCHANGE_SUFFIX)
}

pub fn queue_reward_credit(env_id: &str) -> String {
    scoped_name(env_id, QUEUE_REWARD_CREDIT_SUFFIX)
}

pub fn queue_token_debit(env_id: &str) -> String {
    scoped_name(env_id, QUEUE_TOKEN_DEBIT_SUFFIX)
}
