use std::time::Duration;

/// Runtime configuration for one harness.
///
/// Controls the virtual-time budget and the safety limits that turn a hung
/// test into a diagnostic instead of a stuck process. Use the builder
/// pattern to customize, or use [`Default`] for sensible defaults.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use tidemark::Config;
///
/// let config = Config::default()
///     .with_max_ticks(10_000)                    // Longer timelines
///     .with_timeout(Duration::from_secs(30));    // Patient wall clock
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Duration one virtual tick stands for in host time units.
    /// Only affects reporting (virtual elapsed time); the scheduler never
    /// sleeps for it. Default: 100ms.
    tick_time: Duration,

    /// Upper bound on test length in ticks; exceeding it aborts the test.
    /// Default: 1000.
    max_ticks: u64,

    /// Maximum consecutive microtask drains without quiescence before the
    /// scheduler reports a deadlock. Default: 1000.
    max_drain_iterations: usize,

    /// Wall-clock safety timeout for a whole `run` call.
    /// Default: 5s.
    timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tick_time: Duration::from_millis(100),
            max_ticks: 1000,
            max_drain_iterations: 1000,
            timeout: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Set the duration one tick stands for.
    pub fn with_tick_time(mut self, tick_time: Duration) -> Self {
        self.tick_time = tick_time;
        self
    }

    /// Returns the duration one tick stands for.
    pub fn tick_time(&self) -> Duration {
        self.tick_time
    }

    /// Set the upper bound on test length in ticks.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Returns the upper bound on test length in ticks.
    pub fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Set the scheduler's drain safety bound.
    ///
    /// Each virtual tick alternates microtask drains with firing due
    /// actions. User code that schedules work faster than it settles will
    /// hit this bound and surface as a deadlock diagnostic rather than
    /// spinning forever.
    pub fn with_max_drain_iterations(mut self, limit: usize) -> Self {
        self.max_drain_iterations = limit;
        self
    }

    /// Returns the scheduler's drain safety bound.
    pub fn max_drain_iterations(&self) -> usize {
        self.max_drain_iterations
    }

    /// Set the wall-clock safety timeout for a whole `run` call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the wall-clock safety timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
