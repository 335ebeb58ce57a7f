//! The writable half of the stream model: a sink that records everything
//! written to it, with a backpressure gate the series can toggle.

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::poll_fn,
    rc::Rc,
    task::{Poll, Waker},
};

use crate::{scheduler::Scheduler, Error, Frame, Reason, Result, TimedFrame, Value};

/// A writable stream under test.
///
/// The sink records each chunk as an emit frame at the tick it receives
/// it; close and abort are recorded the same way, which is what
/// [`Harness::assert_writable`](crate::Harness::assert_writable) compares
/// against.
///
/// Backpressure stalls *completions*, not receipt: with the gate down the
/// first in-flight chunk is received (and recorded) but its [`write`]
/// future stays pending, and later writes queue unreceived behind it.
/// When the gate lifts, every stalled write is received and completed in
/// insertion order at the gate-open tick.
///
/// [`write`]: Self::write
#[derive(Clone)]
pub struct Writable<V: Value> {
    shared: Rc<RefCell<Shared<V>>>,
}

enum State {
    Open,
    Closed,
    Errored(Reason),
}

struct StallEntry<V> {
    /// Taken (and recorded) when the sink receives the chunk.
    value: Option<V>,
    result: Option<Result<()>>,
    waker: Option<Waker>,
}

struct Shared<V> {
    gate_open: bool,
    stalled: VecDeque<Rc<RefCell<StallEntry<V>>>>,
    state: State,
    recording: Vec<TimedFrame<V>>,
    /// Parked `close` calls waiting for the stall queue to drain.
    flush_wakers: Vec<Waker>,
    scheduler: Scheduler,
}

impl<V: Value> Shared<V> {
    fn record(&mut self, frame: Frame<V>) {
        let tick = self.scheduler.current_tick();
        self.recording.push(TimedFrame::new(tick, frame));
        self.scheduler.note_activity();
    }

    fn reject_stalled(&mut self, reason: &Reason) {
        while let Some(entry) = self.stalled.pop_front() {
            let mut entry = entry.borrow_mut();
            entry.result = Some(Err(Error::Aborted(reason.clone())));
            if let Some(waker) = entry.waker.take() {
                waker.wake();
            }
        }
    }

    fn wake_flush(&mut self) {
        for waker in self.flush_wakers.drain(..) {
            waker.wake();
        }
    }
}

pub(crate) fn writable<V: Value>(scheduler: Scheduler) -> Writable<V> {
    Writable {
        shared: Rc::new(RefCell::new(Shared {
            gate_open: true,
            stalled: VecDeque::new(),
            state: State::Open,
            recording: Vec::new(),
            flush_wakers: Vec::new(),
            scheduler,
        })),
    }
}

impl<V: Value> Writable<V> {
    /// Write a chunk.
    ///
    /// With the gate up and nothing in flight, the chunk is received and
    /// the write completes immediately. Otherwise the completion stalls
    /// until the gate lifts; an abort in the meantime rejects it with the
    /// abort reason.
    pub async fn write(&self, value: V) -> Result<()> {
        let entry = {
            let mut shared = self.shared.borrow_mut();
            match &shared.state {
                State::Errored(reason) => return Err(Error::Aborted(reason.clone())),
                State::Closed => return Err(Error::Closed),
                State::Open => {}
            }
            if shared.gate_open && shared.stalled.is_empty() {
                shared.record(Frame::Emit(value));
                return Ok(());
            }
            // The sink takes one chunk in flight; the rest queue unreceived.
            let mut value = Some(value);
            if shared.stalled.is_empty() {
                if let Some(chunk) = value.take() {
                    shared.record(Frame::Emit(chunk));
                }
            }
            let entry = Rc::new(RefCell::new(StallEntry {
                value,
                result: None,
                waker: None,
            }));
            shared.stalled.push_back(entry.clone());
            entry
        };

        poll_fn(move |cx| {
            let mut entry = entry.borrow_mut();
            match entry.result.take() {
                Some(result) => Poll::Ready(result),
                None => {
                    entry.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Close the stream once every stalled write has resolved.
    pub async fn close(&self) -> Result<()> {
        let shared = self.shared.clone();
        poll_fn(move |cx| {
            let mut shared = shared.borrow_mut();
            match &shared.state {
                State::Errored(reason) => Poll::Ready(Err(Error::Aborted(reason.clone()))),
                State::Closed => Poll::Ready(Err(Error::Closed)),
                State::Open if shared.stalled.is_empty() => {
                    shared.record(Frame::Close);
                    shared.state = State::Closed;
                    Poll::Ready(Ok(()))
                }
                State::Open => {
                    shared.flush_wakers.push(cx.waker().clone());
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Abort from the writer side: the queue is discarded and stalled
    /// writes reject with `reason`.
    pub fn abort(&self, reason: impl Into<Reason>) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        match &shared.state {
            State::Errored(existing) => Err(Error::Aborted(existing.clone())),
            State::Closed => Err(Error::Closed),
            State::Open => {
                let reason = reason.into();
                shared.record(Frame::Abort(Some(reason.clone())));
                shared.state = State::Errored(reason.clone());
                shared.reject_stalled(&reason);
                shared.wake_flush();
                Ok(())
            }
        }
    }

    /// Raise or drop the backpressure gate (`<` / `>` frames).
    ///
    /// Lifting the gate receives and completes every stalled write in
    /// insertion order at the current tick.
    pub(crate) fn set_gate(&self, open: bool) {
        let mut shared = self.shared.borrow_mut();
        if !matches!(shared.state, State::Open) {
            return;
        }
        shared.gate_open = open;
        if !open {
            return;
        }
        while let Some(entry) = shared.stalled.pop_front() {
            let mut entry = entry.borrow_mut();
            if let Some(value) = entry.value.take() {
                shared.record(Frame::Emit(value));
            }
            entry.result = Some(Ok(()));
            if let Some(waker) = entry.waker.take() {
                waker.wake();
            }
        }
        shared.scheduler.note_activity();
        shared.wake_flush();
    }

    /// Downstream termination applied by the adapter (`#` frame): the
    /// producer-facing recording logs a cancel carrying the abort reason.
    pub(crate) fn abort_downstream(&self, reason: Reason) {
        let mut shared = self.shared.borrow_mut();
        if !matches!(shared.state, State::Open) {
            return;
        }
        shared.record(Frame::Cancel(Some(reason.clone())));
        shared.state = State::Errored(reason.clone());
        shared.reject_stalled(&reason);
        shared.wake_flush();
    }

    pub(crate) fn recorded(&self) -> Vec<TimedFrame<V>> {
        self.shared.borrow().recording.clone()
    }
}

impl<V: Value> fmt::Debug for Writable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("Writable")
            .field("gate_open", &shared.gate_open)
            .field("stalled", &shared.stalled.len())
            .field("recorded", &shared.recording.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::join;

    use super::*;
    use crate::{Config, Tick, TokioHost};

    fn sink() -> (Scheduler, Writable<String>) {
        let sched = Scheduler::new(Config::default());
        let dest = writable(sched.clone());
        (sched, dest)
    }

    fn emits(dest: &Writable<String>) -> Vec<(u64, String)> {
        dest.recorded()
            .into_iter()
            .filter_map(|tf| match tf.frame {
                Frame::Emit(v) => Some((tf.tick.value(), v)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn pass_through_writes_complete_immediately() {
        let (_sched, dest) = sink();
        dest.write("a".to_string()).await.unwrap();
        dest.close().await.unwrap();

        assert_eq!(emits(&dest), vec![(0, "a".to_string())]);
        assert_eq!(
            dest.recorded().last().unwrap().frame,
            Frame::<String>::Close
        );
        assert_eq!(
            dest.write("b".to_string()).await.unwrap_err(),
            Error::Closed
        );
    }

    #[tokio::test]
    async fn gate_stalls_completions_and_releases_in_order() {
        let (sched, dest) = sink();
        dest.set_gate(false);

        let opener = dest.clone();
        sched
            .schedule_at(Tick::new(4), move || opener.set_gate(true))
            .unwrap();

        let writer = async {
            // First chunk is received (recorded) right away but its
            // completion stalls until the gate lifts.
            dest.write("a".to_string()).await.unwrap();
            dest.write("b".to_string()).await.unwrap();
            dest.close().await.unwrap();
        };
        let (run, ()) = join(sched.run_all(&TokioHost), writer).await;
        run.unwrap();

        assert_eq!(
            emits(&dest),
            vec![(0, "a".to_string()), (4, "b".to_string())]
        );
    }

    #[tokio::test]
    async fn downstream_abort_rejects_stalled_writes_with_the_reason() {
        let (sched, dest) = sink();
        dest.set_gate(false);

        let aborter = dest.clone();
        sched
            .schedule_at(Tick::new(2), move || {
                aborter.abort_downstream(Reason::new("sink died"));
            })
            .unwrap();

        let writer = async {
            let died = Error::Aborted(Reason::new("sink died"));
            assert_eq!(dest.write("a".to_string()).await.unwrap_err(), died);
            assert_eq!(dest.write("b".to_string()).await.unwrap_err(), died);
        };
        let (run, ()) = join(sched.run_all(&TokioHost), writer).await;
        run.unwrap();

        let frames = dest.recorded();
        assert_eq!(
            frames.last().unwrap().frame,
            Frame::Cancel(Some(Reason::new("sink died")))
        );
        assert_eq!(frames.last().unwrap().tick, Tick::new(2));
    }

    #[tokio::test]
    async fn writer_abort_is_recorded_as_an_abort_frame() {
        let (_sched, dest) = sink();
        dest.write("a".to_string()).await.unwrap();
        dest.abort("changed my mind").unwrap();

        assert_eq!(
            dest.recorded().last().unwrap().frame,
            Frame::Abort(Some(Reason::new("changed my mind")))
        );
        assert_eq!(
            dest.write("b".to_string()).await.unwrap_err(),
            Error::Aborted(Reason::new("changed my mind"))
        );
    }

    #[tokio::test]
    async fn close_waits_for_the_stall_queue_to_drain() {
        let (sched, dest) = sink();
        dest.set_gate(false);

        let opener = dest.clone();
        sched
            .schedule_at(Tick::new(3), move || opener.set_gate(true))
            .unwrap();

        let writer = dest.clone();
        let body = async move {
            let write = writer.write("a".to_string());
            let close = async {
                writer.close().await.unwrap();
                writer.recorded().last().unwrap().tick
            };
            let (write_result, closed_at) = join(write, close).await;
            write_result.unwrap();
            assert_eq!(closed_at, Tick::new(3));
        };
        let (run, ()) = join(sched.run_all(&TokioHost), body).await;
        run.unwrap();
    }
}
