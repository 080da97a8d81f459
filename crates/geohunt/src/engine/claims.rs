//! Hunt-claim lifecycle and nearby-hunt discovery.

use std::sync::Arc;

use crate::geometry::GeoPoint;
use crate::models::{ClaimStatus, Hunt, HuntClaim};

use super::error::HuntError;
use super::store::HuntStore;
use super::zones::ZoneDirectory;

pub const DEFAULT_NEARBY_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub page_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_NEARBY_PAGE_SIZE,
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), HuntError> {
        if self.page_size == 0 {
            return Err(HuntError::Validation {
                field: "page_size".to_string(),
                reason: "discovery page size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

pub struct ClaimManager {
    store: Arc<dyn HuntStore>,
    zones: Arc<ZoneDirectory>,
    config: DiscoveryConfig,
}

impl ClaimManager {
    pub fn new(store: Arc<dyn HuntStore>, zones: Arc<ZoneDirectory>) -> Self {
        Self {
            store,
            zones,
            config: DiscoveryConfig::default(),
        }
    }

    pub fn with_config(
        store: Arc<dyn HuntStore>,
        zones: Arc<ZoneDirectory>,
        config: DiscoveryConfig,
    ) -> Result<Self, HuntError> {
        config.validate()?;
        Ok(Self {
            store,
            zones,
            config,
        })
    }

    /// The claim call: `search -> claimed`. Guards, in order: the hunt exists,
    /// its window is active, its location actually sits in its zone, it has a
    /// configured duration, and this user has not claimed it before. The
    /// created claim carries `expire_at = now + duration`.
    pub fn claim_hunt(
        &self,
        hunt_id: &str,
        user_id: &str,
        now_ms: i64,
    ) -> Result<HuntClaim, HuntError> {
        let hunt = self.store.hunt(hunt_id).ok_or_else(|| HuntError::NotFound {
            entity: "hunt".to_string(),
            id: hunt_id.to_string(),
        })?;
        if !hunt.window_contains(now_ms) {
            return Err(HuntError::Validation {
                field: "hunt_id".to_string(),
                reason: format!("hunt {hunt_id} is not active"),
            });
        }
        if !self.zones.hunt_in_zone(&hunt) {
            return Err(HuntError::FatalInvariant {
                reason: format!(
                    "hunt {hunt_id} location is outside its zone {}",
                    hunt.zone_id
                ),
            });
        }
        let Some(duration_ms) = hunt.duration_ms else {
            return Err(HuntError::Conflict {
                reason: format!("hunt {hunt_id} has no configured duration"),
            });
        };
        self.store
            .insert_claim(user_id, hunt_id, now_ms, now_ms + duration_ms)
    }

    /// Explicit status updates along `claimed -> started -> arrived`. There is
    /// no business gating beyond "the claim exists and the edge is forward";
    /// `completed` is reachable only through the task-completion flow.
    pub fn advance_status(
        &self,
        hunt_id: &str,
        user_id: &str,
        to: ClaimStatus,
    ) -> Result<HuntClaim, HuntError> {
        if to == ClaimStatus::Completed {
            return Err(HuntError::Conflict {
                reason: "completed is set by the task-completion flow, not a status update"
                    .to_string(),
            });
        }
        self.store.advance_claim(hunt_id, user_id, to)
    }

    pub fn find_my_hunt_claim(&self, hunt_id: &str, user_id: &str) -> Result<HuntClaim, HuntError> {
        self.store
            .claim_for(hunt_id, user_id)
            .ok_or_else(|| HuntError::NotFound {
                entity: "claim".to_string(),
                id: format!("{hunt_id}/{user_id}"),
            })
    }

    /// Up to one page of hunts the user could claim right now: hunts of the
    /// zone containing `point`, inside their active window, minus hunts the
    /// user already claimed. Read-only, and no ordering is promised.
    pub fn nearby_hunts(&self, user_id: &str, point: GeoPoint, now_ms: i64) -> Vec<Hunt> {
        let Some(zone) = self.zones.locate(point) else {
            return Vec::new();
        };
        let claimed = self.store.claimed_hunt_ids(user_id);
        let mut hunts: Vec<Hunt> = self
            .store
            .hunts_in_zone(&zone.zone_id)
            .into_iter()
            .filter(|hunt| hunt.window_contains(now_ms))
            .filter(|hunt| !claimed.contains(&hunt.hunt_id))
            .collect();
        hunts.truncate(self.config.page_size);
        hunts
    }
}
