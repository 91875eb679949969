//! Model-group classification (§3 "Signature cache entry", §4.1 "Model
//! grouping rule").

/// Coarse family label shared by related model names so a thinking
/// signature issued for one can be re-signed for another in the same
/// family. Case-insensitive substring search, first match wins; anything
/// that matches none of the known families groups by its own literal name.
pub fn model_group(model: &str) -> String {
    let lower = model.to_lowercase();
    if lower.contains("claude") {
        "claude".to_string()
    } else if lower.contains("gpt") {
        "gpt".to_string()
    } else if lower.contains("gemini") {
        "gemini".to_string()
    } else {
        model.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_family() {
        assert_eq!(model_group("claude-opus-4-6"), "claude");
        assert_eq!(model_group("CLAUDE-SONNET"), "claude");
    }

    #[test]
    fn gpt_family() {
        assert_eq!(model_group("gpt-4o"), "gpt");
    }

    #[test]
    fn gemini_family() {
        assert_eq!(model_group("gemini-2.5-pro"), "gemini");
    }

    #[test]
    fn unknown_model_groups_by_its_own_name() {
        assert_eq!(model_group("llama-3-70b"), "llama-3-70b");
    }

    #[test]
    fn cache_key_stability_property() {
        // CacheKey(m1, t) == CacheKey(m2, t) iff ModelGroup(m1) == ModelGroup(m2).
        assert_eq!(model_group("claude-opus-4-6"), model_group("claude-sonnet-4-5"));
        assert_ne!(model_group("claude-opus-4-6"), model_group("gpt-4o"));
    }
}
