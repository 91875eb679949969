//! Model-based provider filter (§4.4): narrows a candidate set down to the
//! providers configured for a request's model, before a [`crate::ProviderRouter`]
//! picks among them.

use std::collections::BTreeMap;

use crate::ProviderInfo;

/// Longest-prefix match over `prefixes` (`model prefix -> provider name`),
/// falling back to `default_provider` when nothing matches.
pub fn target_provider_name(model: &str, prefixes: &BTreeMap<String, String>, default_provider: &str) -> String {
    let mut best: Option<&str> = None;
    for prefix in prefixes.keys() {
        if model.starts_with(prefix.as_str()) && best.map_or(true, |b| prefix.len() > b.len()) {
            best = Some(prefix.as_str());
        }
    }
    match best {
        Some(prefix) => prefixes[prefix].clone(),
        None => default_provider.to_string(),
    }
}

/// Returns the subset of `candidates` whose provider name equals `target`.
/// Falls back to the full candidate set when that subset is empty, since an
/// empty set here means the target name is misconfigured (doesn't match any
/// live provider) rather than that no provider should serve the request
/// (§8 "graceful degradation").
pub fn filter_by_target(target: &str, candidates: &[ProviderInfo]) -> Vec<ProviderInfo> {
    let matched: Vec<ProviderInfo> = candidates
        .iter()
        .filter(|c| c.provider.name() == target)
        .cloned()
        .collect();
    if matched.is_empty() {
        candidates.to_vec()
    } else {
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::candidate;

    fn prefixes() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("claude-opus".to_string(), "opus-provider".to_string());
        m.insert("claude-opus-special".to_string(), "special-provider".to_string());
        m.insert("claude".to_string(), "catch-all".to_string());
        m
    }

    #[test]
    fn longest_prefix_wins() {
        let target = target_provider_name("claude-opus-special-4", &prefixes(), "default");
        assert_eq!(target, "special-provider");
    }

    #[test]
    fn shorter_prefix_used_when_longer_does_not_match() {
        let target = target_provider_name("claude-opus-4", &prefixes(), "default");
        assert_eq!(target, "opus-provider");
    }

    #[test]
    fn falls_back_to_default_when_nothing_matches() {
        let target = target_provider_name("gpt-4", &prefixes(), "default");
        assert_eq!(target, "default");
    }

    #[test]
    fn filter_returns_matching_subset() {
        let candidates = vec![candidate("a", true), candidate("b", true)];
        let filtered = filter_by_target("a", &candidates);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].provider.name(), "a");
    }

    #[test]
    fn misconfigured_target_falls_back_to_full_candidate_set() {
        let candidates = vec![candidate("a", true), candidate("b", true)];
        let filtered = filter_by_target("nonexistent", &candidates);
        assert_eq!(filtered.len(), 2);
    }
}
