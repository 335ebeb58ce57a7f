use std::{sync::Arc, time::Duration};

use crate::{Reason, SeriesDiff, SeriesMode, Tick};

/// The single error type for all tidemark operations.
///
/// Every fallible tidemark API returns `tidemark::Result<T>` (alias for
/// `Result<T, tidemark::Error>`). Parse and usage errors are raised at the
/// point of the offending call; assertion failures at the end of the
/// asserting helper's observation window; timeouts by the scheduler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    // ==================== Parse errors ====================
    #[error("column {column}: unclosed '(' group")]
    UnclosedGroup { column: usize },

    #[error("column {column}: '(' groups cannot nest")]
    NestedGroup { column: usize },

    #[error("column {column}: ')' without a matching '('")]
    UnmatchedGroupClose { column: usize },

    #[error("column {column}: '()' group holds no frames")]
    EmptyGroup { column: usize },

    #[error("column {column}: frame after a terminal")]
    FrameAfterTerminal { column: usize },

    #[error("column {column}: '{ch}' is not allowed in a {mode} series")]
    IllegalChar {
        column: usize,
        ch: char,
        mode: SeriesMode,
    },

    #[error("column {column}: no value bound to '{ch}'")]
    UnboundKey { column: usize, ch: char },

    #[error("a signal series requires exactly one '!' terminal")]
    MissingSignalTerminal,

    // ==================== Usage errors ====================
    #[error("'{0}' is series syntax and cannot key a value")]
    ReservedKey(char),

    #[error("value key '{0}' is already bound")]
    DuplicateKey(char),

    #[error("cannot schedule at tick {requested}; the clock is already at {current}")]
    TickInPast { requested: Tick, current: Tick },

    #[error("run() is not reentrant")]
    NestedRun,

    #[error("this harness has already run; create a new one per test")]
    HarnessFinished,

    // ==================== Stream terminations ====================
    #[error("stream aborted: {0}")]
    Aborted(Reason),

    #[error("stream is closed")]
    Closed,

    // ==================== Assertion failures ====================
    #[error("{0}")]
    Assertion(SeriesDiff),

    #[error("value {value} has no series key; bind it in the expected value table")]
    UnrenderableValue { value: String },

    // ==================== Scheduler safety ====================
    #[error(
        "no quiescence after {limit} drains at tick {tick}; \
         {pending} actions pending (deadlocked user code?)"
    )]
    DrainLimit {
        limit: usize,
        tick: Tick,
        pending: usize,
    },

    #[error("virtual time exceeded the {limit}-tick budget")]
    MaxTicksExceeded { limit: u64 },

    #[error("test timed out after {elapsed:?} at tick {tick} with {pending} actions pending")]
    Timeout {
        elapsed: Duration,
        tick: Tick,
        pending: usize,
    },

    #[error("external error: {0}")]
    External(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a user-provided error so it can travel through `tidemark::Result`.
    pub fn external(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::External(Arc::new(e))
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        use Error::*;
        match (self, other) {
            (UnclosedGroup { column: a }, UnclosedGroup { column: b }) => a == b,
            (NestedGroup { column: a }, NestedGroup { column: b }) => a == b,
            (UnmatchedGroupClose { column: a }, UnmatchedGroupClose { column: b }) => a == b,
            (EmptyGroup { column: a }, EmptyGroup { column: b }) => a == b,
            (FrameAfterTerminal { column: a }, FrameAfterTerminal { column: b }) => a == b,
            (
                IllegalChar {
                    column: a,
                    ch: ac,
                    mode: am,
                },
                IllegalChar {
                    column: b,
                    ch: bc,
                    mode: bm,
                },
            ) => a == b && ac == bc && am == bm,
            (UnboundKey { column: a, ch: ac }, UnboundKey { column: b, ch: bc }) => {
                a == b && ac == bc
            }
            (MissingSignalTerminal, MissingSignalTerminal) => true,
            (ReservedKey(a), ReservedKey(b)) => a == b,
            (DuplicateKey(a), DuplicateKey(b)) => a == b,
            (
                TickInPast {
                    requested: a,
                    current: ac,
                },
                TickInPast {
                    requested: b,
                    current: bc,
                },
            ) => a == b && ac == bc,
            (NestedRun, NestedRun) => true,
            (HarnessFinished, HarnessFinished) => true,
            (Aborted(a), Aborted(b)) => a == b,
            (Closed, Closed) => true,
            (Assertion(a), Assertion(b)) => a == b,
            (UnrenderableValue { value: a }, UnrenderableValue { value: b }) => a == b,
            (
                DrainLimit {
                    limit: a,
                    tick: at,
                    pending: ap,
                },
                DrainLimit {
                    limit: b,
                    tick: bt,
                    pending: bp,
                },
            ) => a == b && at == bt && ap == bp,
            (MaxTicksExceeded { limit: a }, MaxTicksExceeded { limit: b }) => a == b,
            (
                Timeout {
                    tick: at,
                    pending: ap,
                    ..
                },
                Timeout {
                    tick: bt,
                    pending: bp,
                    ..
                },
            ) => at == bt && ap == bp,
            (External(a), External(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Error {}
