//! Task completion: verify, rank, persist, then publish the reward.

use std::sync::Arc;

use geohunt_proto::wallet::{reward_event_key, RewardEvent};

use super::error::HuntError;
use super::publisher::{PublishReport, WalletEventPublisher};
use super::quiz::{verify_quiz, QuizAnswer, QuizVerdict};
use super::store::HuntStore;
use crate::models::{CompletedTask, TaskKind};

/// Everything a completion attempt produced. `publish` is `None` when the
/// completion earned nothing; a report with `delivered == false` means the
/// reward event could not be handed to the broker and reconciliation will
/// pick the credit up later.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTaskOutcome {
    pub completion: CompletedTask,
    pub verdict: Option<QuizVerdict>,
    pub claim_completed: bool,
    pub publish: Option<PublishReport>,
}

#[derive(Clone)]
pub struct CompletionFlow {
    store: Arc<dyn HuntStore>,
    publisher: WalletEventPublisher,
}

impl CompletionFlow {
    pub fn new(store: Arc<dyn HuntStore>, publisher: WalletEventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Complete one task for one user.
    ///
    /// The completion row (and the rank it consumed) commits before any
    /// publish attempt, and a publish failure never rolls it back: the row is
    /// the source of truth for what the user earned. A failed quiz still
    /// records a completion so the task cannot be retried for a better rank;
    /// it just records no rank and no reward.
    pub fn complete_task(
        &self,
        hunt_id: &str,
        task_id: &str,
        user_id: &str,
        answers: &[QuizAnswer],
        now_ms: i64,
    ) -> Result<CompleteTaskOutcome, HuntError> {
        let hunt = self.store.hunt(hunt_id).ok_or_else(|| HuntError::NotFound {
            entity: "hunt".to_string(),
            id: hunt_id.to_string(),
        })?;
        let task = self.store.task(task_id).ok_or_else(|| HuntError::NotFound {
            entity: "task".to_string(),
            id: task_id.to_string(),
        })?;
        if task.hunt_id != hunt.hunt_id {
            return Err(HuntError::Validation {
                field: "task_id".to_string(),
                reason: format!("task {task_id} does not belong to hunt {hunt_id}"),
            });
        }
        let claim = self
            .store
            .claim_for(hunt_id, user_id)
            .ok_or_else(|| HuntError::NotFound {
                entity: "claim".to_string(),
                id: format!("{hunt_id}/{user_id}"),
            })?;
        if claim.is_expired(now_ms) {
            return Err(HuntError::Conflict {
                reason: format!("claim on hunt {hunt_id} expired; the task can no longer be completed"),
            });
        }

        let (verdict, ranked) = match task.kind {
            TaskKind::Quiz => {
                let verdict = verify_quiz(&task, answers);
                let ranked = verdict.is_pass && task.is_tiered();
                (Some(verdict), ranked)
            }
            TaskKind::Mission => (None, task.is_tiered()),
        };

        let completion = if ranked {
            self.store.insert_ranked_completion(
                hunt_id,
                task_id,
                user_id,
                Some(claim.id),
                &task.tiers,
                now_ms,
            )?
        } else {
            self.store
                .insert_unranked_completion(hunt_id, task_id, user_id, Some(claim.id), now_ms)?
        };

        // Failed attempts count too: the claim closes once every task has a
        // completion row, rewarded or not.
        let completed = self.store.completed_task_ids(hunt_id, user_id);
        let all_done = hunt.task_ids.iter().all(|id| completed.contains(id));
        let claim_completed = if all_done {
            let closed = self.store.complete_claim(hunt_id, user_id, now_ms)?;
            closed.completed_at_ms.is_some()
        } else {
            false
        };

        let publish = if completion.reward > 0 {
            let Some(rank) = completion.rank else {
                return Err(HuntError::FatalInvariant {
                    reason: format!(
                        "completion {} carries a reward but no rank",
                        completion.id
                    ),
                });
            };
            let event = RewardEvent {
                user_id: user_id.to_string(),
                hunt_id: hunt_id.to_string(),
                task_id: task_id.to_string(),
                amount: completion.reward,
                rank,
                claim_id: Some(claim.id),
                task_name: task.name.clone(),
                hunt_name: hunt.name.clone(),
                timestamp_ms: now_ms,
                idempotency_key: reward_event_key(user_id, hunt_id, task_id, now_ms),
            };
            Some(self.publisher.publish_reward(&event)?)
        } else {
            None
        };

        Ok(CompleteTaskOutcome {
            completion,
            verdict,
            claim_completed,
            publish,
        })
    }
}
