use std::fmt;

use crate::{Reason, Value};

/// One unit of virtual time.
///
/// A nonnegative counter; tick 0 is the starting time of every series in a
/// given test. How long a tick stands for in host time is configured via
/// [`Config::with_tick_time`](crate::Config::with_tick_time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    #[must_use]
    pub fn new(tick: u64) -> Self {
        Tick(tick)
    }

    /// Returns the raw counter value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    pub(crate) fn advanced(self, by: u64) -> Self {
        Tick(self.0 + by)
    }
}

impl From<u64> for Tick {
    fn from(tick: u64) -> Self {
        Tick(tick)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single stream event.
///
/// The five series characters with fixed meaning map onto the non-`Emit`
/// variants: `|` close, `!` cancel, `#` abort, `<`/`>` backpressure.
/// Cancel and abort optionally carry a [`Reason`]; a `None` reason on an
/// *expected* frame matches any observed reason.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "V: serde::Serialize",
        deserialize = "V: serde::de::DeserializeOwned"
    ))
)]
pub enum Frame<V> {
    /// A value enqueued into the stream.
    Emit(V),
    /// Graceful completion (`|`).
    Close,
    /// Downstream cancellation (`!`).
    Cancel(Option<Reason>),
    /// Upstream error termination (`#`).
    Abort(Option<Reason>),
    /// Writable-only: the sink stops completing writes (`<`).
    BackpressureOn,
    /// Writable-only: stalled writes resolve in order (`>`).
    BackpressureOff,
}

impl<V> Frame<V> {
    /// True for frames that end a stream's lifetime.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Close | Frame::Cancel(_) | Frame::Abort(_))
    }
}

impl<V: Value> Frame<V> {
    /// Whether an observed frame satisfies this expected frame.
    ///
    /// Emits match by `==`. An expected terminal with no reason is a
    /// wildcard; with a reason, the observed reason must equal it.
    pub(crate) fn matches(&self, observed: &Frame<V>) -> bool {
        match (self, observed) {
            (Frame::Emit(a), Frame::Emit(b)) => a == b,
            (Frame::Close, Frame::Close) => true,
            (Frame::BackpressureOn, Frame::BackpressureOn) => true,
            (Frame::BackpressureOff, Frame::BackpressureOff) => true,
            (Frame::Cancel(None), Frame::Cancel(_)) => true,
            (Frame::Abort(None), Frame::Abort(_)) => true,
            (Frame::Cancel(Some(a)), Frame::Cancel(Some(b))) => a == b,
            (Frame::Abort(Some(a)), Frame::Abort(Some(b))) => a == b,
            _ => false,
        }
    }
}

/// A [`Frame`] stamped with the [`Tick`] it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "V: serde::Serialize",
        deserialize = "V: serde::de::DeserializeOwned"
    ))
)]
pub struct TimedFrame<V> {
    pub tick: Tick,
    pub frame: Frame<V>,
}

impl<V> TimedFrame<V> {
    pub fn new(tick: impl Into<Tick>, frame: Frame<V>) -> Self {
        Self {
            tick: tick.into(),
            frame,
        }
    }
}

/// The tick of the terminal frame, if the list has one.
///
/// Well-formed lists keep the terminal last, so only the final entry is
/// inspected.
pub(crate) fn terminal_tick<V>(frames: &[TimedFrame<V>]) -> Option<Tick> {
    frames
        .last()
        .filter(|f| f.frame.is_terminal())
        .map(|f| f.tick)
}
