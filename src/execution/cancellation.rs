use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Request id to cancellation token, shared by the service and its callers
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Token for a request, created on first use
    pub fn register(&self, request_id: &str) -> CancellationToken {
        self.tokens()
            .entry(request_id.to_string())
            .or_default()
            .clone()
    }

    /// Signals cancellation; false when the request is unknown or already finished
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.tokens().get(request_id) {
            Some(token) => {
                info!(request_id, "Cancelling request");
                token.cancel();
                true
            }
            None => {
                debug!(request_id, "Cancel for unknown request ignored");
                false
            }
        }
    }

    pub fn remove(&self, request_id: &str) {
        self.tokens().remove(request_id);
    }

    pub fn active(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tokens().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_cancel_remove() {
        let registry = CancellationRegistry::new();
        let token = registry.register("r1");
        assert!(!token.is_cancelled());
        assert_eq!(registry.active(), vec!["r1"]);

        assert!(registry.cancel("r1"));
        assert!(token.is_cancelled());

        registry.remove("r1");
        assert!(!registry.cancel("r1"));
        assert!(registry.active().is_empty());
    }

    #[test]
    fn test_register_twice_shares_token() {
        let registry = CancellationRegistry::new();
        let first = registry.register("r2");
        let second = registry.register("r2");

        second.cancel();
        assert!(first.is_cancelled());
    }

    #[test]
    fn test_requests_are_independent() {
        let registry = CancellationRegistry::new();
        let a = registry.register("a");
        let b = registry.register("b");

        registry.cancel("a");
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
