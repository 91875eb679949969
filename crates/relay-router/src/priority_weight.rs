use async_trait::async_trait;
use rand::Rng;

use crate::{healthy_candidates, ErrNoProviders, ProviderInfo, ProviderRouter};

/// Restricts to the highest-priority tier of healthy candidates (lowest
/// `priority` number wins, matching common "0 = primary" conventions), then
/// picks among that tier with probability proportional to `weight`.
pub struct PriorityWeightRouter;

impl PriorityWeightRouter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PriorityWeightRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderRouter for PriorityWeightRouter {
    async fn select(&self, candidates: &[ProviderInfo]) -> Result<ProviderInfo, ErrNoProviders> {
        let healthy = healthy_candidates(candidates);
        if healthy.is_empty() {
            return Err(ErrNoProviders);
        }

        let top_priority = healthy.iter().map(|c| c.priority).min().unwrap();
        let tier: Vec<&ProviderInfo> = healthy.into_iter().filter(|c| c.priority == top_priority).collect();

        let total_weight: u64 = tier.iter().map(|c| c.weight.max(1) as u64).sum();
        let mut pick = rand::thread_rng().gen_range(0..total_weight);

        for candidate in &tier {
            let w = candidate.weight.max(1) as u64;
            if pick < w {
                return Ok((*candidate).clone());
            }
            pick -= w;
        }

        // Unreachable given the weights sum to total_weight, but keep a
        // fallback rather than panicking on a candidate set.
        Ok(tier[0].clone())
    }

    fn name(&self) -> &'static str {
        "priority_weight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::candidate;

    #[tokio::test]
    async fn prefers_lowest_priority_number() {
        let router = PriorityWeightRouter::new();
        let mut low = candidate("primary", true);
        low.priority = 0;
        let mut high = candidate("backup", true);
        high.priority = 1;

        for _ in 0..10 {
            let picked = router.select(&[low.clone(), high.clone()]).await.unwrap();
            assert_eq!(picked.provider.name(), "primary");
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_tier_when_top_tier_unhealthy() {
        let router = PriorityWeightRouter::new();
        let mut low = candidate("primary", false);
        low.priority = 0;
        let mut high = candidate("backup", true);
        high.priority = 1;

        let picked = router.select(&[low, high]).await.unwrap();
        assert_eq!(picked.provider.name(), "backup");
    }

    #[tokio::test]
    async fn weight_zero_candidates_can_still_be_selected() {
        // weight.max(1) guards against a zero-weight candidate becoming
        // permanently unreachable.
        let router = PriorityWeightRouter::new();
        let mut only = candidate("solo", true);
        only.weight = 0;
        let picked = router.select(&[only]).await.unwrap();
        assert_eq!(picked.provider.name(), "solo");
    }

    #[tokio::test]
    async fn distributes_across_same_tier_weighted_candidates() {
        let router = PriorityWeightRouter::new();
        let a = candidate("a", true);
        let b = candidate("b", true);

        let mut saw_a = false;
        let mut saw_b = false;
        for _ in 0..50 {
            match router.select(&[a.clone(), b.clone()]).await.unwrap().provider.name() {
                "a" => saw_a = true,
                "b" => saw_b = true,
                _ => {}
            }
        }
        assert!(saw_a && saw_b, "expected both candidates to be picked across 50 draws");
    }
}
