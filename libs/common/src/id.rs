use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = ensemble_common::id::prefixed_ulid("ses");
/// assert!(id.starts_with("ses_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    /// Ephemeral per-connection session token. Never persisted.
    pub const SESSION: &str = "ses";
}

/// Generate a fresh session token for one live connection.
pub fn session_token() -> String {
    prefixed_ulid(prefix::SESSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid("ses");
        assert!(id.starts_with("ses_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 4 + 26);
    }

    #[test]
    fn test_session_tokens_are_unique() {
        let a = session_token();
        let b = session_token();
        assert_ne!(a, b);
        assert!(a.starts_with("ses_"));
    }
}
