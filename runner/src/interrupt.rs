//! Ctrl-C handling.
//!
//! The running child shares trainctl's process group, so the terminal delivers
//! SIGINT to it directly. trainctl itself only records that an interrupt happened
//! and stops starting new steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a Ctrl-C listener that sets the flag.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn listen() -> Self {
        let interrupt = Self::new();
        let flag = Arc::clone(&interrupt.flag);
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for Ctrl-C: {e}");
                    return;
                }
                flag.store(true, Ordering::SeqCst);
                tracing::warn!("Interrupt received; waiting for the running step to exit");
            }
        });
        interrupt
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
