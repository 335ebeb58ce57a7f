//! The deterministic virtual-time scheduler.
//!
//! One scheduler drives everything inside a harness: stream adapters
//! register one action per frame, recorders register their observation
//! windows, and [`run_all`](Scheduler::run_all) advances the clock. Time
//! moves only when the host's task queue has fully drained, so user code
//! observes a reproducible timeline.
//!
//! Handles are `Rc`-based and `!Send` by design; a harness is a
//! single-threaded cooperative world.

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use crate::{Config, Error, Host, Result, Tick};

type Action = Box<dyn FnOnce()>;

/// Shared handle to the tick queue. Cloning is cheap; all clones drive the
/// same clock.
#[derive(Clone)]
pub(crate) struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

struct Inner {
    tick: Tick,
    seq: u64,
    queue: BTreeMap<Tick, Vec<(u64, Action)>>,
    /// Bumped by every observable stream operation; the drain loop reads
    /// it to decide when the current turn has settled.
    activity: u64,
    running: bool,
    config: Config,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("tick", &inner.tick)
            .field("pending", &inner.queue.values().map(Vec::len).sum::<usize>())
            .field("running", &inner.running)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                tick: Tick::ZERO,
                seq: 0,
                queue: BTreeMap::new(),
                activity: 0,
                running: false,
                config,
            })),
        }
    }

    /// The clock's current position.
    pub(crate) fn current_tick(&self) -> Tick {
        self.inner.borrow().tick
    }

    /// Total actions still waiting to fire.
    pub(crate) fn pending(&self) -> usize {
        self.inner.borrow().queue.values().map(Vec::len).sum()
    }

    /// Record that something observable happened this turn (a value was
    /// delivered, a write completed, a signal fired). Keeps the drain loop
    /// going until cascades settle.
    pub(crate) fn note_activity(&self) {
        self.inner.borrow_mut().activity += 1;
    }

    /// Queue `action` to fire at `tick`. Same-tick actions fire in
    /// insertion order; rescheduling from inside a firing action is
    /// allowed, including at the current tick.
    pub(crate) fn schedule_at(&self, tick: Tick, action: impl FnOnce() + 'static) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if tick < inner.tick {
            return Err(Error::TickInPast {
                requested: tick,
                current: inner.tick,
            });
        }
        let seq = inner.seq;
        inner.seq += 1;
        inner.queue.entry(tick).or_default().push((seq, Box::new(action)));
        Ok(())
    }

    /// Advance the clock until no actions remain.
    ///
    /// For each occupied tick, alternates a microtask drain with firing
    /// every action due at that tick, until a full drain passes with no
    /// due actions and no new activity. Only then does the clock jump to
    /// the next occupied tick. `max_drain_iterations` bounds each tick's
    /// drains; `max_ticks` bounds the whole timeline.
    pub(crate) async fn run_all<H: Host>(&self, host: &H) -> Result<()> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.running {
                return Err(Error::NestedRun);
            }
            inner.running = true;
        }
        let result = self.advance_loop(host).await;
        self.inner.borrow_mut().running = false;
        result
    }

    async fn advance_loop<H: Host>(&self, host: &H) -> Result<()> {
        let (max_ticks, drain_limit) = {
            let inner = self.inner.borrow();
            (inner.config.max_ticks(), inner.config.max_drain_iterations())
        };
        loop {
            // Settle the current tick completely before looking ahead:
            // drain lets concurrently polled user code progress, and any
            // action due now (including ones it schedules at the current
            // tick) fires in the same turn.
            let current = self.current_tick();
            let mut rounds = 0;
            loop {
                self.drain(host).await?;
                let due = self.take_due(current);
                if due.is_empty() {
                    break;
                }
                rounds += 1;
                if rounds >= drain_limit {
                    return Err(Error::DrainLimit {
                        limit: drain_limit,
                        tick: current,
                        pending: due.len() + self.pending(),
                    });
                }
                for (_seq, action) in due {
                    action();
                }
            }

            let Some(next) = self.next_occupied_tick() else {
                return Ok(());
            };
            if next.value() >= max_ticks {
                return Err(Error::MaxTicksExceeded { limit: max_ticks });
            }
            tracing::trace!(tick = %next, "advancing virtual clock");
            self.inner.borrow_mut().tick = next;
        }
    }

    /// Drain the host's task queue to quiescence: yield through the
    /// macrotask sentinel until a full round passes with no new activity.
    async fn drain<H: Host>(&self, host: &H) -> Result<()> {
        let limit = self.inner.borrow().config.max_drain_iterations();
        let mut iterations = 0;
        loop {
            let before = self.inner.borrow().activity;
            host.macrotask().await;
            if self.inner.borrow().activity == before {
                return Ok(());
            }
            iterations += 1;
            if iterations >= limit {
                let inner = self.inner.borrow();
                return Err(Error::DrainLimit {
                    limit,
                    tick: inner.tick,
                    pending: inner.queue.values().map(Vec::len).sum(),
                });
            }
        }
    }

    fn next_occupied_tick(&self) -> Option<Tick> {
        self.inner.borrow().queue.keys().next().copied()
    }

    fn take_due(&self, tick: Tick) -> Vec<(u64, Action)> {
        self.inner.borrow_mut().queue.remove(&tick).unwrap_or_default()
    }
}
