use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared stop flag for a running engine.
///
/// The engine checks it between supersteps and before submitting I/O; a
/// cancelled run stops without waiting for quiescence.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
