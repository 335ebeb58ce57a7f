use std::{future::Future, time::Instant};

/// The two timer capabilities the scheduler needs from its runtime.
///
/// The virtual clock never sleeps; it only needs (1) a zero-delay
/// macrotask that resumes *after* all currently scheduled work has had a
/// chance to run (the drain sentinel), and (2) a monotonic time source for
/// the wall-clock watchdog. The sentinel must round-trip through the
/// runtime's task queue, not resolve inline, or microtasks queued during
/// the current turn would be missed.
pub trait Host {
    /// Suspend until the runtime has cycled its task queue once.
    fn macrotask(&self) -> impl Future<Output = ()>;

    /// Monotonic wall-clock time for the safety-timeout watchdog.
    fn now(&self) -> Instant;
}

/// [`Host`] backed by the ambient tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioHost;

impl Host for TokioHost {
    async fn macrotask(&self) {
        tokio::task::yield_now().await;
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}
