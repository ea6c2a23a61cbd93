use std::sync::{Arc, RwLock};

use log::debug;

use super::Transport;

/// Holds the active transport and an optional fallback.
///
/// The switch is one-way and sticky: once [`fall_back`](Self::fall_back)
/// has swapped the fallback in, the primary is never restored for the rest
/// of the session.
pub struct TransportSelector {
    current: RwLock<Arc<dyn Transport>>,
    fallback: RwLock<Option<Arc<dyn Transport>>>,
}

impl TransportSelector {
    pub fn new(primary: Arc<dyn Transport>, fallback: Option<Arc<dyn Transport>>) -> Self {
        Self {
            current: RwLock::new(primary),
            fallback: RwLock::new(fallback),
        }
    }

    pub fn current(&self) -> Arc<dyn Transport> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn current_name(&self) -> String {
        self.current().name().to_string()
    }

    /// True once the fallback has been swapped in (or none was ever available).
    pub fn has_fallen_back(&self) -> bool {
        self.fallback
            .read()
            .map(|f| f.is_none())
            .unwrap_or(true)
    }

    /// Swap in the fallback transport. Returns false when there is nothing
    /// left to fall back to.
    pub fn fall_back(&self, reason: &str) -> bool {
        let next = match self.fallback.write() {
            Ok(mut slot) => slot.take(),
            Err(p) => p.into_inner().take(),
        };
        match next {
            Some(next) => {
                let mut current = self.current.write().unwrap_or_else(|p| p.into_inner());
                debug!(
                    "Reverted to {} transport from {}: {}",
                    next.name(),
                    current.name(),
                    reason
                );
                *current = next;
                true
            }
            None => false,
        }
    }
}
