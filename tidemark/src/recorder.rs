//! Tick-stamped observation of a stream under test.
//!
//! A recorder consumes a [`Readable`] and captures every observation as a
//! frame at the current virtual tick: values as emits, completion,
//! consumer cancellation, and upstream error as the matching terminal.
//! Recording stops at the first terminal or when the observation window
//! (the expected series' extent) closes, whichever comes first.

use std::{
    cell::{Cell, RefCell},
    future::poll_fn,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use crate::{
    readable::ReadEvent, scheduler::Scheduler, Frame, Readable, TimedFrame, Value,
};

/// Shared frame sink one recorder writes and one assertion later reads.
#[derive(Clone)]
pub(crate) struct Recording<V> {
    frames: Rc<RefCell<Vec<TimedFrame<V>>>>,
}

impl<V: Value> Recording<V> {
    pub(crate) fn new() -> Self {
        Self {
            frames: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn push(&self, tick: crate::Tick, frame: Frame<V>) {
        self.frames.borrow_mut().push(TimedFrame::new(tick, frame));
    }

    pub(crate) fn frames(&self) -> Vec<TimedFrame<V>> {
        self.frames.borrow().clone()
    }
}

/// The observation window. Closed by a scheduled action at the expected
/// series' extent; a waiting recorder wakes and stops.
#[derive(Clone)]
pub(crate) struct Window {
    closed: Rc<Cell<bool>>,
    wakers: Rc<RefCell<Vec<Waker>>>,
}

impl Window {
    pub(crate) fn new() -> Self {
        Self {
            closed: Rc::new(Cell::new(false)),
            wakers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn close(&self) {
        self.closed.set(true);
        for waker in self.wakers.borrow_mut().drain(..) {
            waker.wake();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }

    fn park(&self, cx: &mut Context<'_>) {
        self.wakers.borrow_mut().push(cx.waker().clone());
    }
}

/// Consume `stream`, filling `recording` until a terminal or the window
/// close.
pub(crate) async fn record<V: Value>(
    stream: Readable<V>,
    recording: Recording<V>,
    window: Window,
    scheduler: Scheduler,
) {
    loop {
        let event = poll_fn(|cx| {
            // Window first: observations at or past the extent are outside
            // the assertion's timeline.
            if window.is_closed() {
                return Poll::Ready(None);
            }
            match stream.poll_event(cx) {
                Poll::Ready(event) => Poll::Ready(Some(event)),
                Poll::Pending => {
                    window.park(cx);
                    Poll::Pending
                }
            }
        })
        .await;

        let tick = scheduler.current_tick();
        match event {
            None => break,
            Some(ReadEvent::Value(value)) => recording.push(tick, Frame::Emit(value)),
            Some(ReadEvent::Closed) => {
                recording.push(tick, Frame::Close);
                break;
            }
            Some(ReadEvent::Cancelled(reason)) => {
                recording.push(tick, Frame::Cancel(Some(reason)));
                break;
            }
            Some(ReadEvent::Errored(reason)) => {
                recording.push(tick, Frame::Abort(Some(reason)));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::join;

    use super::*;
    use crate::{readable::readable_pair, Config, Tick, TokioHost};

    #[tokio::test]
    async fn stamps_observations_with_the_current_tick() {
        let sched = Scheduler::new(Config::default());
        let (source, stream) = readable_pair::<String>(sched.clone());

        for (tick, value) in [(0u64, "a"), (3, "b")] {
            let source = source.clone();
            sched
                .schedule_at(Tick::new(tick), move || {
                    source.enqueue(value.to_string()).unwrap();
                })
                .unwrap();
        }
        let closer = source.clone();
        sched
            .schedule_at(Tick::new(6), move || closer.close().unwrap())
            .unwrap();

        let recording = Recording::new();
        let window = Window::new();
        let closer = window.clone();
        sched
            .schedule_at(Tick::new(7), move || closer.close())
            .unwrap();

        let recorder = record(stream, recording.clone(), window, sched.clone());
        let (run, ()) = join(sched.run_all(&TokioHost), recorder).await;
        run.unwrap();

        assert_eq!(
            recording.frames(),
            vec![
                TimedFrame::new(0, Frame::Emit("a".to_string())),
                TimedFrame::new(3, Frame::Emit("b".to_string())),
                TimedFrame::new(6, Frame::Close),
            ]
        );
    }

    #[tokio::test]
    async fn the_window_bounds_observation_of_a_quiet_stream() {
        let sched = Scheduler::new(Config::default());
        let (source, stream) = readable_pair::<String>(sched.clone());

        let recording = Recording::new();
        let window = Window::new();
        let closer = window.clone();
        sched
            .schedule_at(Tick::new(4), move || closer.close())
            .unwrap();

        let recorder = record(stream, recording.clone(), window, sched.clone());
        let (run, ()) = join(sched.run_all(&TokioHost), recorder).await;
        run.unwrap();

        assert!(recording.frames().is_empty());
        // The producer outlives the window; nothing more is recorded.
        source.enqueue("late".to_string()).unwrap();
        assert!(recording.frames().is_empty());
    }
}
