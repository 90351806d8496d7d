use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global gate over every paper fill. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    #[must_use]
    pub fn new(trading_enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(trading_enabled)))
    }

    pub fn enable(&self) {
        self.0.store(true, Ordering::SeqCst);
        tracing::warn!("paper trading enabled");
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::SeqCst);
        tracing::warn!("paper trading disabled");
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
