use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{healthy_candidates, ErrNoProviders, ProviderInfo, ProviderRouter};

/// Cycles through healthy candidates in order. The cursor is shared across
/// calls (not per-candidate-set), so repeated calls with the same filtered
/// set fan requests out evenly rather than always picking index 0.
pub struct RoundRobinRouter {
    cursor: AtomicUsize,
}

impl RoundRobinRouter {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderRouter for RoundRobinRouter {
    async fn select(&self, candidates: &[ProviderInfo]) -> Result<ProviderInfo, ErrNoProviders> {
        let healthy = healthy_candidates(candidates);
        if healthy.is_empty() {
            return Err(ErrNoProviders);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Ok(healthy[idx].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::candidate;

    #[tokio::test]
    async fn cycles_through_all_healthy_candidates() {
        let router = RoundRobinRouter::new();
        let candidates = vec![candidate("a", true), candidate("b", true), candidate("c", true)];

        let mut seen = Vec::new();
        for _ in 0..6 {
            let picked = router.select(&candidates).await.unwrap();
            seen.push(picked.provider.name().to_string());
        }
        assert_eq!(seen, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn skips_unhealthy_candidates() {
        let router = RoundRobinRouter::new();
        let candidates = vec![candidate("a", false), candidate("b", true)];
        for _ in 0..4 {
            let picked = router.select(&candidates).await.unwrap();
            assert_eq!(picked.provider.name(), "b");
        }
    }
}
