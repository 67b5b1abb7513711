//! Cooperative cancellation.
//!
//! A run can only be cancelled while it is still armed. Staging locks the
//! token first, after which cancel requests are refused instead of being left
//! to fire halfway through privileged writes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const ARMED: u8 = 0;
const CANCELLED: u8 = 1;
const LOCKED: u8 = 2;

#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<AtomicU8>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(ARMED)),
        }
    }

    /// Request cancellation. Returns `false` when the token is locked.
    pub fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(current) => current == CANCELLED,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Stop accepting cancel requests. Fails if one already got through.
    pub fn lock(&self) -> bool {
        match self
            .state
            .compare_exchange(ARMED, LOCKED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(current) => current == LOCKED,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::SeqCst) == LOCKED
    }
}
