//! The readable half of the stream model: a single-consumer value stream
//! with web-readable semantics (enqueue, close, error, cancel-with-reason).

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    future::poll_fn,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures_util::Stream;

use crate::{scheduler::Scheduler, Error, Reason, Result, Value, Writable};

/// A readable stream under test.
///
/// Values arrive on the virtual timeline, so `read` suspends until the
/// scheduler fires the frame that produces the next value. A `Readable` is
/// single-consumer: reading requires `&mut self`, and handing the stream
/// to [`Harness::assert_readable`](crate::Harness::assert_readable)
/// consumes it (the recorder becomes the consumer).
///
/// Also usable as a [`futures_util::Stream`] of `Result<V>`: values yield
/// `Ok`, an abort yields one `Err` and then ends, close and cancel end the
/// stream directly.
pub struct Readable<V: Value> {
    shared: Rc<RefCell<Shared<V>>>,
    done: bool,
}

/// The producer half of a readable stream.
///
/// This is what the harness adapter drives, and the extension point for
/// hand-built transforms: read from one stream, `enqueue` into another.
/// All methods report a terminated stream instead of panicking, so a
/// producer that raced a consumer-side cancel can notice and stop.
#[derive(Clone)]
pub struct ReadableSource<V: Value> {
    shared: Rc<RefCell<Shared<V>>>,
}

/// What a single observation of the stream produced.
pub(crate) enum ReadEvent<V> {
    Value(V),
    Closed,
    Cancelled(Reason),
    Errored(Reason),
}

enum State {
    Open,
    Closed,
    Cancelled(Reason),
    Errored(Reason),
}

struct Shared<V> {
    queue: VecDeque<V>,
    state: State,
    wakers: Vec<Waker>,
    scheduler: Scheduler,
}

impl<V> Shared<V> {
    fn wake_all(&mut self) {
        for waker in self.wakers.drain(..) {
            waker.wake();
        }
    }

    fn terminate(&mut self, state: State) {
        self.state = state;
        self.queue.clear();
        self.scheduler.note_activity();
        self.wake_all();
    }
}

/// Create a connected producer/consumer pair on the given clock.
pub(crate) fn readable_pair<V: Value>(scheduler: Scheduler) -> (ReadableSource<V>, Readable<V>) {
    let shared = Rc::new(RefCell::new(Shared {
        queue: VecDeque::new(),
        state: State::Open,
        wakers: Vec::new(),
        scheduler,
    }));
    (
        ReadableSource {
            shared: shared.clone(),
        },
        Readable {
            shared,
            done: false,
        },
    )
}

impl<V: Value> ReadableSource<V> {
    /// Enqueue a value for the consumer.
    pub fn enqueue(&self, value: V) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        match &shared.state {
            State::Open => {
                shared.queue.push_back(value);
                shared.scheduler.note_activity();
                shared.wake_all();
                Ok(())
            }
            State::Errored(reason) => Err(Error::Aborted(reason.clone())),
            State::Closed | State::Cancelled(_) => Err(Error::Closed),
        }
    }

    /// Close the stream gracefully. Already-queued values remain readable.
    pub fn close(&self) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        match &shared.state {
            State::Open => {
                shared.state = State::Closed;
                shared.scheduler.note_activity();
                shared.wake_all();
                Ok(())
            }
            State::Errored(reason) => Err(Error::Aborted(reason.clone())),
            State::Closed | State::Cancelled(_) => Err(Error::Closed),
        }
    }

    /// Error the stream. Pending and future reads reject with `reason`.
    pub fn error(&self, reason: impl Into<Reason>) -> Result<()> {
        let mut shared = self.shared.borrow_mut();
        match &shared.state {
            State::Open => {
                shared.terminate(State::Errored(reason.into()));
                Ok(())
            }
            State::Errored(existing) => Err(Error::Aborted(existing.clone())),
            State::Closed | State::Cancelled(_) => Err(Error::Closed),
        }
    }

    /// True while the stream can still accept frames.
    pub(crate) fn is_live(&self) -> bool {
        matches!(self.shared.borrow().state, State::Open)
    }

    /// Consumer-side cancellation applied by the adapter (`!` frame).
    pub(crate) fn cancel(&self, reason: Reason) {
        let mut shared = self.shared.borrow_mut();
        if matches!(shared.state, State::Open) {
            shared.terminate(State::Cancelled(reason));
        }
    }

    /// True once the consumer cancelled the stream.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.shared.borrow().state, State::Cancelled(_))
    }

    /// The consumer's cancellation reason, once cancelled.
    pub fn cancel_reason(&self) -> Option<Reason> {
        match &self.shared.borrow().state {
            State::Cancelled(reason) => Some(reason.clone()),
            _ => None,
        }
    }
}

impl<V: Value> Readable<V> {
    /// Read the next value.
    ///
    /// Resolves `Ok(Some(value))` per emitted value, `Ok(None)` once the
    /// stream closed or was cancelled, and `Err(Error::Aborted)` once it
    /// errored. The error is sticky: every later read rejects with the
    /// same reason.
    pub async fn read(&mut self) -> Result<Option<V>> {
        let shared = self.shared.clone();
        let event = poll_fn(|cx| poll_event(&shared, cx)).await;
        match event {
            ReadEvent::Value(value) => Ok(Some(value)),
            ReadEvent::Closed | ReadEvent::Cancelled(_) => Ok(None),
            ReadEvent::Errored(reason) => Err(Error::Aborted(reason)),
        }
    }

    /// Cancel the stream from the consumer side.
    ///
    /// Takes effect immediately: queued values are discarded, the producer
    /// observes the cancellation, and any frames the adapter had scheduled
    /// after this point are dropped.
    pub fn cancel(&mut self, reason: impl Into<Reason>) {
        let mut shared = self.shared.borrow_mut();
        if matches!(shared.state, State::Open) {
            shared.terminate(State::Cancelled(reason.into()));
        }
    }

    pub(crate) fn poll_event(&self, cx: &mut Context<'_>) -> Poll<ReadEvent<V>> {
        poll_event(&self.shared, cx)
    }

    /// Pump this stream into a writable until one side terminates.
    ///
    /// Each value is written and its completion awaited before the next
    /// read, so destination backpressure propagates to this stream's
    /// consumption rate. An aborted destination cancels this stream with
    /// the abort reason; an errored source aborts the destination; a
    /// closed source closes the destination.
    pub async fn pipe_to(mut self, dest: &Writable<V>) -> Result<()> {
        loop {
            match self.read().await {
                Ok(Some(value)) => {
                    if let Err(e) = dest.write(value).await {
                        if let Error::Aborted(reason) = &e {
                            self.cancel(reason.clone());
                        }
                        return Err(e);
                    }
                }
                Ok(None) => return dest.close().await,
                Err(e) => {
                    if let Error::Aborted(reason) = &e {
                        let _ = dest.abort(reason.clone());
                    }
                    return Err(e);
                }
            }
        }
    }
}

fn poll_event<V: Value>(
    shared: &Rc<RefCell<Shared<V>>>,
    cx: &mut Context<'_>,
) -> Poll<ReadEvent<V>> {
    let mut shared = shared.borrow_mut();
    if let Some(value) = shared.queue.pop_front() {
        shared.scheduler.note_activity();
        return Poll::Ready(ReadEvent::Value(value));
    }
    match &shared.state {
        State::Open => {
            shared.wakers.push(cx.waker().clone());
            Poll::Pending
        }
        State::Closed => Poll::Ready(ReadEvent::Closed),
        State::Cancelled(reason) => Poll::Ready(ReadEvent::Cancelled(reason.clone())),
        State::Errored(reason) => Poll::Ready(ReadEvent::Errored(reason.clone())),
    }
}

impl<V: Value> Stream for Readable<V> {
    type Item = Result<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match poll_event(&this.shared, cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(ReadEvent::Value(value)) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(ReadEvent::Closed | ReadEvent::Cancelled(_)) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(ReadEvent::Errored(reason)) => {
                this.done = true;
                Poll::Ready(Some(Err(Error::Aborted(reason))))
            }
        }
    }
}

impl<V: Value> fmt::Debug for Readable<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("Readable")
            .field("queued", &shared.queue.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<V: Value> fmt::Debug for ReadableSource<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableSource")
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}
