//! Tiered reward lookup.

use crate::models::RewardTier;

/// Reward for a 1-based completion rank: scan the tier list (ascending by
/// level) accumulating `user_count`, and pay the first tier whose cumulative
/// count reaches the rank. Ranks past every tier earn 0.
pub fn reward_for_rank(tiers: &[RewardTier], rank: u32) -> u64 {
    let mut cumulative: u64 = 0;
    for tier in tiers {
        cumulative += u64::from(tier.user_count);
        if u64::from(rank) <= cumulative {
            return tier.rewards;
        }
    }
    0
}
