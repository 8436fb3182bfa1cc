use std::sync::atomic::{AtomicBool, Ordering};

/// A thread safe token that can be set to flag some condition.
///
/// Once set, the token stays set so that every concurrent poller observes it.
#[derive(Default)]
pub struct Token(AtomicBool);

impl Token {
    /// Create a new token.
    pub const fn new() -> Token {
        Token(AtomicBool::new(false))
    }

    /// Set the token.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Test if the token is set.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
