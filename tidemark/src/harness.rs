//! The per-test façade: stream factories, assertion registration, and the
//! `run` loop that drives everything on the virtual clock.

use std::{fmt, future::Future, time::Duration};

use futures_util::{
    future::{join3, join_all, LocalBoxFuture},
    FutureExt,
};

use crate::{
    diff,
    readable::{readable_pair, Readable, ReadableSource},
    recorder::{record, Recording, Window},
    scheduler::Scheduler,
    writable, Config, Error, Frame, Host, Reason, Result, SeriesMode, SeriesProgram, Signal,
    TimedFrame, TokioHost, Value, Values, Writable,
};

/// Test harness for one marble-stream scenario.
///
/// A harness owns a private virtual clock. Factory helpers turn series
/// strings into live streams whose frames are scheduled on that clock;
/// assertion helpers register expected series; [`run`](Self::run) drives
/// the clock, the recorders, and your test body together, then evaluates
/// every registered assertion.
///
/// # Example
///
/// ```ignore
/// let mut test = Harness::<String>::new();
/// let values = Values::new();
///
/// let stream = test.readable("a--b--|", &values, None)?;
/// test.assert_readable(stream, "a--b--|", &values, None)?;
/// test.run(async { Ok(()) }).await?;
/// ```
///
/// # Lifecycle
///
/// Helpers are valid only before `run`; a harness runs once and is then
/// finished (further use returns [`Error::HarnessFinished`]). Each test
/// creates its own harness; nothing is shared between harnesses, so
/// independent tests are fully isolated.
///
/// # Note
///
/// Streams and the scheduler use `Rc` internally and are `!Send`. This is
/// intentional; the harness is a single-threaded cooperative world, and
/// tests run it on a current-thread runtime (`#[tokio::test]` default).
pub struct Harness<V: Value, H: Host = TokioHost> {
    scheduler: Scheduler,
    config: Config,
    host: H,
    recorders: Vec<LocalBoxFuture<'static, ()>>,
    assertions: Vec<Assertion<V>>,
    finished: bool,
}

struct Assertion<V: Value> {
    expected: SeriesProgram<V>,
    values: Values<V>,
    observed: FrameSource<V>,
}

enum FrameSource<V: Value> {
    Recording(Recording<V>),
    Sink(Writable<V>),
}

impl<V: Value> Harness<V> {
    /// Create a harness with default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a harness with the given configuration.
    pub fn with_config(config: Config) -> Self {
        Self::with_host(config, TokioHost)
    }
}

impl<V: Value> Default for Harness<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Value, H: Host> Harness<V, H> {
    /// Create a harness on a custom [`Host`].
    pub fn with_host(config: Config, host: H) -> Self {
        Self {
            scheduler: Scheduler::new(config.clone()),
            config,
            host,
            recorders: Vec::new(),
            assertions: Vec::new(),
            finished: false,
        }
    }

    // ==================== Stream factories ====================

    /// Build a readable stream that plays `series` on the virtual clock.
    ///
    /// `reason` is attached to a `!` or `#` terminal the series holds. If
    /// the consumer cancels the stream before the series ends, the
    /// remaining frames are dropped.
    pub fn readable(
        &mut self,
        series: &str,
        values: &Values<V>,
        reason: Option<Reason>,
    ) -> Result<Readable<V>> {
        self.ensure_open()?;
        let program =
            SeriesProgram::parse(series, values, reason.as_ref(), SeriesMode::Readable)?;
        let (source, stream) = readable_pair(self.scheduler.clone());
        for TimedFrame { tick, frame } in program.frames {
            let source = source.clone();
            self.scheduler
                .schedule_at(tick, move || apply_readable_frame(&source, frame))?;
        }
        Ok(stream)
    }

    /// Build a writable stream whose backpressure gate and lifetime follow
    /// `series` (writable grammar: `-`, `<`, `>`, `#`).
    pub fn writable(&mut self, series: &str, reason: Option<Reason>) -> Result<Writable<V>> {
        self.ensure_open()?;
        let program = SeriesProgram::<V>::parse(
            series,
            &Values::new(),
            reason.as_ref(),
            SeriesMode::Writable,
        )?;
        let dest = writable::writable(self.scheduler.clone());
        for TimedFrame { tick, frame } in program.frames {
            let dest = dest.clone();
            self.scheduler
                .schedule_at(tick, move || apply_writable_frame(&dest, frame))?;
        }
        Ok(dest)
    }

    /// Build an abort signal that fires at the series' sole `!` tick.
    pub fn signal(&mut self, series: &str, reason: Option<Reason>) -> Result<Signal> {
        self.ensure_open()?;
        let program = SeriesProgram::<V>::parse(
            series,
            &Values::new(),
            reason.as_ref(),
            SeriesMode::Signal,
        )?;
        let signal = Signal::new(self.scheduler.clone());
        for TimedFrame { tick, frame } in program.frames {
            if let Frame::Cancel(reason) = frame {
                let signal = signal.clone();
                self.scheduler
                    .schedule_at(tick, move || signal.fire(reason))?;
            }
        }
        Ok(signal)
    }

    /// A hand-driven producer/consumer pair on this harness's clock.
    ///
    /// The extension point for transforms: read from a harness stream,
    /// process, `enqueue` into the source half, and assert on the
    /// consumer half.
    pub fn source(&mut self) -> Result<(ReadableSource<V>, Readable<V>)> {
        self.ensure_open()?;
        Ok(readable_pair(self.scheduler.clone()))
    }

    // ==================== Assertions ====================

    /// Assert that `stream` plays out as `expected`.
    ///
    /// Consumes the stream; a recorder becomes its consumer and observes
    /// it until the first terminal or until `expected`'s extent, whichever
    /// comes first. The comparison happens at the end of
    /// [`run`](Self::run): emits must match by `==` under `values`, and a
    /// `None` `reason` matches any observed terminal reason. On mismatch,
    /// `run` fails with a tick-aligned diff.
    pub fn assert_readable(
        &mut self,
        stream: Readable<V>,
        expected: &str,
        values: &Values<V>,
        reason: Option<Reason>,
    ) -> Result<()> {
        self.ensure_open()?;
        let program =
            SeriesProgram::parse(expected, values, reason.as_ref(), SeriesMode::Readable)?;
        let recording = Recording::new();
        let window = Window::new();

        let closer = window.clone();
        self.scheduler
            .schedule_at(program.extent, move || closer.close())?;
        self.recorders
            .push(record(stream, recording.clone(), window, self.scheduler.clone()).boxed_local());
        self.assertions.push(Assertion {
            expected: program,
            values: values.clone(),
            observed: FrameSource::Recording(recording),
        });
        Ok(())
    }

    /// Assert that the writes `dest`'s sink observed play out as
    /// `expected`.
    ///
    /// The expected series uses the readable grammar: writes appear as
    /// emits at the tick the sink received them, a series-driven `#`
    /// appears as `!` (the producer saw downstream cancellation), and a
    /// writer-side [`abort`](Writable::abort) as `#`.
    pub fn assert_writable(
        &mut self,
        dest: &Writable<V>,
        expected: &str,
        values: &Values<V>,
        reason: Option<Reason>,
    ) -> Result<()> {
        self.ensure_open()?;
        let program =
            SeriesProgram::parse(expected, values, reason.as_ref(), SeriesMode::Readable)?;
        self.assertions.push(Assertion {
            expected: program,
            values: values.clone(),
            observed: FrameSource::Sink(dest.clone()),
        });
        Ok(())
    }

    // ==================== Running ====================

    /// Drive the virtual clock and `body` to completion, then evaluate
    /// every registered assertion.
    ///
    /// The scheduler advances one tick at a time, draining the host's
    /// task queue to quiescence between frames, so `body` observes the
    /// reproducible timeline the series describe. Failures surface in
    /// order: scheduler diagnostics (deadlock, tick budget), then `body`'s
    /// own error, then the first assertion mismatch. A wall-clock timeout
    /// ([`Config::with_timeout`]) bounds the whole call.
    pub async fn run<Fut>(&mut self, body: Fut) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        self.ensure_open()?;
        self.finished = true;

        let recorders = std::mem::take(&mut self.recorders);
        let started = self.host.now();
        let drive = async {
            let (sched, _records, body) = join3(
                self.scheduler.run_all(&self.host),
                join_all(recorders),
                body,
            )
            .await;
            (sched, body)
        };

        let (sched_result, body_result) =
            match tokio::time::timeout(self.config.timeout(), drive).await {
                Ok(results) => results,
                Err(_) => {
                    return Err(Error::Timeout {
                        elapsed: self.host.now().duration_since(started),
                        tick: self.scheduler.current_tick(),
                        pending: self.scheduler.pending(),
                    });
                }
            };
        sched_result?;
        body_result?;

        for assertion in &self.assertions {
            let observed = match &assertion.observed {
                FrameSource::Recording(recording) => recording.frames(),
                FrameSource::Sink(dest) => dest.recorded(),
            };
            if let Some(diff) = diff::compare(&assertion.expected, &observed, &assertion.values) {
                return Err(Error::Assertion(diff));
            }
        }
        Ok(())
    }

    /// Virtual time elapsed so far, as ticks scaled by
    /// [`Config::tick_time`].
    pub fn virtual_elapsed(&self) -> Duration {
        let ticks = u32::try_from(self.scheduler.current_tick().value()).unwrap_or(u32::MAX);
        self.config.tick_time().saturating_mul(ticks)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::HarnessFinished);
        }
        Ok(())
    }
}

fn apply_readable_frame<V: Value>(source: &ReadableSource<V>, frame: Frame<V>) {
    // A consumer-side cancel may have landed before this frame's tick;
    // the remaining program is simply dropped.
    match frame {
        Frame::Emit(value) => {
            if source.is_live() {
                let _ = source.enqueue(value);
            }
        }
        Frame::Close => {
            if source.is_live() {
                let _ = source.close();
            }
        }
        Frame::Cancel(reason) => {
            source.cancel(reason.unwrap_or_else(|| Reason::new("cancelled")));
        }
        Frame::Abort(reason) => {
            if source.is_live() {
                let _ = source.error(reason.unwrap_or_else(|| Reason::new("aborted")));
            }
        }
        Frame::BackpressureOn | Frame::BackpressureOff => {}
    }
}

fn apply_writable_frame<V: Value>(dest: &Writable<V>, frame: Frame<V>) {
    match frame {
        Frame::BackpressureOn => dest.set_gate(false),
        Frame::BackpressureOff => dest.set_gate(true),
        Frame::Abort(reason) => {
            dest.abort_downstream(reason.unwrap_or_else(|| Reason::new("aborted")));
        }
        Frame::Emit(_) | Frame::Close | Frame::Cancel(_) => {}
    }
}

impl<V: Value, H: Host> fmt::Debug for Harness<V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("scheduler", &self.scheduler)
            .field("assertions", &self.assertions.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tick;

    fn no_values() -> Values<String> {
        Values::new()
    }

    #[tokio::test]
    async fn emit_and_close_round_trip() {
        let mut test = Harness::<String>::new();
        let stream = test.readable("a--b--|", &no_values(), None).unwrap();
        test.assert_readable(stream, "a--b--|", &no_values(), None)
            .unwrap();
        test.run(async { Ok(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn value_tables_name_arbitrary_values() {
        let values = Values::new()
            .bind('A', "foo")
            .and_then(|v| v.bind('B', "bar"))
            .and_then(|v| v.bind('C', "baz"))
            .unwrap();

        let mut test = Harness::<String>::new();
        let stream = test.readable("---A--B--(C|)", &values, None).unwrap();
        test.assert_readable(stream, "---A--B--(C|)", &values, None)
            .unwrap();
        test.run(async { Ok(()) }).await.unwrap();
    }

    #[tokio::test]
    async fn backpressure_holds_values_until_the_gate_lifts() {
        let halt = Reason::new("sink gone");
        let mut test = Harness::<String>::new();

        let source = test
            .readable("---a---b---c---d----------|", &no_values(), None)
            .unwrap();
        let dest = test
            .writable("-----<-------------->--#", Some(halt.clone()))
            .unwrap();
        test.assert_writable(
            &dest,
            "---a---b------------(cd)--!",
            &no_values(),
            Some(halt),
        )
        .unwrap();

        test.run(async move {
            // The destination dies before the source closes; the pipe
            // surfaces that abort, which is the scenario's point.
            let _ = source.pipe_to(&dest).await;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn abort_frames_error_the_stream() {
        let boom = Reason::new("E");
        let mut test = Harness::<String>::new();
        let mut stream = test
            .readable("012#", &no_values(), Some(boom.clone()))
            .unwrap();

        test.run(async move {
            for expected in ["0", "1", "2"] {
                assert_eq!(stream.read().await?, Some(expected.to_string()));
            }
            let err = Error::Aborted(boom);
            assert_eq!(stream.read().await.unwrap_err(), err);
            assert_eq!(stream.read().await.unwrap_err(), err);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn signals_fire_at_their_tick_with_their_reason() {
        let mut test = Harness::<String>::new();
        let signal = test
            .signal("---!", Some(Reason::new("R")))
            .unwrap();

        test.run(async move {
            assert!(!signal.is_aborted());
            assert_eq!(signal.reason(), None);
            signal.aborted().await;
            assert!(signal.is_aborted());
            assert_eq!(signal.reason(), Some(Reason::new("R")));
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn mismatches_fail_with_a_tick_aligned_diff() {
        let mut test = Harness::<String>::new();
        let stream = test.readable("--a--b--c--|", &no_values(), None).unwrap();
        test.assert_readable(stream, "--a--b--x--|", &no_values(), None)
            .unwrap();

        let err = test.run(async { Ok(()) }).await.unwrap_err();
        let Error::Assertion(diff) = err else {
            panic!("expected an assertion failure, got: {err:?}");
        };
        assert_eq!(diff.mismatch_tick, Some(Tick::new(8)));
        assert_eq!(diff.expected, "--a--b--x--|");
        assert_eq!(diff.observed, "--a--b--c--|");
    }

    #[tokio::test]
    async fn consumer_cancel_drops_the_rest_of_the_program() {
        let mut test = Harness::<String>::new();
        let mut stream = test.readable("a--b--c--|", &no_values(), None).unwrap();

        test.run(async move {
            assert_eq!(stream.read().await?, Some("a".to_string()));
            stream.cancel("enough");
            // Later frames (b, c, the close) are dropped, so the stream
            // just reports its cancelled end.
            assert_eq!(stream.read().await?, None);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn helpers_are_invalid_after_run() {
        let mut test = Harness::<String>::new();
        test.run(async { Ok(()) }).await.unwrap();

        assert_eq!(
            test.readable("a|", &no_values(), None).unwrap_err(),
            Error::HarnessFinished
        );
        assert_eq!(
            test.run(async { Ok(()) }).await.unwrap_err(),
            Error::HarnessFinished
        );
    }

    #[tokio::test]
    async fn hung_bodies_hit_the_wall_clock_timeout() {
        let config = Config::default().with_timeout(Duration::from_millis(50));
        let mut test = Harness::<String>::with_config(config);

        let err = test
            .run(async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn body_errors_surface_unchanged() {
        let mut test = Harness::<String>::new();
        let marker = Error::external(std::io::Error::other("user failure"));
        let returned = marker.clone();

        let err = test.run(async move { Err(returned) }).await.unwrap_err();
        assert_eq!(err, marker);
    }

    #[tokio::test]
    async fn transforms_compose_through_a_manual_source() {
        let mut test = Harness::<String>::new();
        let mut input = test.readable("a-b-|", &no_values(), None).unwrap();
        let (out_source, out_stream) = test.source().unwrap();
        test.assert_readable(out_stream, "A-B-|", &no_values(), None)
            .unwrap();

        test.run(async move {
            while let Some(value) = input.read().await? {
                out_source.enqueue(value.to_uppercase())?;
            }
            out_source.close()?;
            Ok(())
        })
        .await
        .unwrap();
    }
}
