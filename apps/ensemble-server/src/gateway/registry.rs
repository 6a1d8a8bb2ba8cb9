//! Identity → live session registry enforcing one connection per identity.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Shared registry of admitted sessions, keyed by `stable_id`.
///
/// Admission is a single atomic register-if-absent on a `DashMap` shard, so
/// two connections racing for the same identity cannot both be admitted.
pub struct SessionRegistry {
    sessions: DashMap<String, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Admit `token` under `stable_id` unless another session already holds it.
    ///
    /// On conflict the existing session's token is returned and nothing changes.
    pub fn try_register(&self, stable_id: &str, token: &str) -> Result<(), String> {
        match self.sessions.entry(stable_id.to_string()) {
            Entry::Occupied(existing) => Err(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(token.to_string());
                Ok(())
            }
        }
    }

    /// Release `stable_id` if it is still held by `token`.
    pub fn release(&self, stable_id: &str, token: &str) -> bool {
        self.sessions
            .remove_if(stable_id, |_, held| held == token)
            .is_some()
    }

    pub fn contains(&self, stable_id: &str) -> bool {
        self.sessions.contains_key(stable_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn second_registration_is_rejected() {
        let registry = SessionRegistry::new();
        assert!(registry.try_register("abc", "ses_1").is_ok());
        assert_eq!(registry.try_register("abc", "ses_2"), Err("ses_1".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn release_requires_matching_token() {
        let registry = SessionRegistry::new();
        registry.try_register("abc", "ses_1").unwrap();

        assert!(!registry.release("abc", "ses_2"));
        assert!(registry.contains("abc"));

        assert!(registry.release("abc", "ses_1"));
        assert!(!registry.contains("abc"));
        assert!(registry.try_register("abc", "ses_2").is_ok());
    }

    #[test]
    fn distinct_identities_coexist() {
        let registry = SessionRegistry::new();
        registry.try_register("abc", "ses_1").unwrap();
        registry.try_register("def", "ses_2").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn concurrent_admission_admits_exactly_one() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.try_register("abc", &format!("ses_{i}")).is_ok())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }
}
