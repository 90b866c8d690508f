//! Gateway node identity and lifecycle state.

use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// The running gateway instance.
#[derive(Debug)]
pub struct Node {
    id: String,
    shutting_down: AtomicBool,
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl Node {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Flag the node as stopping; responses then ask clients to close
    /// their connections.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
