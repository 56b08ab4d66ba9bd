//! Operator interrupt (Ctrl-C) as a shared flag.
//!
//! The handler only raises the flag. A prompt that sees it raised while it
//! waits takes it and answers "no"; anywhere else the pipeline stops at the
//! next step boundary.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route SIGINT to a new flag instead of terminating the process
    pub fn install() -> Result<Self> {
        let flag = Self::new();
        let handler = flag.clone();
        ctrlc::set_handler(move || handler.raise())?;
        debug!("Interrupt handler installed");
        Ok(flag)
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag, reporting whether it was raised
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
