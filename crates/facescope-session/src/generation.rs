//! Session generations.
//!
//! Every render session is stamped with a generation number. Work that
//! outlives its session (a late inference result) carries a [`SessionToken`]
//! and checks it before touching shared state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic generation counter shared with every token it issues.
#[derive(Debug, Clone, Default)]
pub struct SessionGenerations {
    current: Arc<AtomicU64>,
}

impl SessionGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, invalidating every outstanding token.
    pub fn advance(&self) -> SessionToken {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        SessionToken {
            generation,
            current: self.current.clone(),
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SessionToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SessionToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` while no newer generation has started.
    pub fn is_live(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}
