//! Prefixed-signature wire form (§3 "Prefixed signature", §6).

/// Render the wire form clients echo back: `"<model-group>#<raw-signature>"`.
pub fn format_prefixed(group: &str, raw: &str) -> String {
    format!("{group}#{raw}")
}

/// Split a client-supplied signature on its first `#`. Returns `None` if
/// there is no `#` in `s` at all.
pub fn parse_prefixed(s: &str) -> Option<(String, String)> {
    s.split_once('#').map(|(group, raw)| (group.to_string(), raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_for_any_nonempty_raw_signature() {
        for raw in ["short", "a-much-longer-signature-value-here", "x"] {
            let wire = format_prefixed("claude", raw);
            let (group, parsed_raw) = parse_prefixed(&wire).unwrap();
            assert_eq!(group, "claude");
            assert_eq!(parsed_raw, raw);
        }
    }

    #[test]
    fn parse_fails_only_when_no_hash_present() {
        assert!(parse_prefixed("no-hash-here").is_none());
        assert!(parse_prefixed("claude#raw").is_some());
        assert!(parse_prefixed("#raw").is_some());
        assert!(parse_prefixed("claude#").is_some());
    }

    #[test]
    fn splits_on_first_hash_only() {
        let (group, raw) = parse_prefixed("claude#raw#with#hashes").unwrap();
        assert_eq!(group, "claude");
        assert_eq!(raw, "raw#with#hashes");
    }
}
