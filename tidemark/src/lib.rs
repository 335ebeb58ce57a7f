#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Tidemark
//!
//! A marble-style testing harness for asynchronous streams, driven by a
//! deterministic virtual clock.
//!
//! Describe a stream's behavior as a compact ASCII timeline (a *series*),
//! let the harness build real streams that play it out tick by tick, run
//! your code against them, and assert what a stream under test actually
//! did, as another series.
//!
//! ## Quick Start
//!
//! ```rust
//! use tidemark::{Harness, Values};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tidemark::Result {
//!     let mut test = Harness::<String>::new();
//!     let values = Values::new();
//!
//!     let mut stream = test.readable("a--b--|", &values, None)?;
//!     let (out, observed) = test.source()?;
//!     test.assert_readable(observed, "A--B--|", &values, None)?;
//!
//!     test.run(async move {
//!         while let Some(value) = stream.read().await? {
//!             out.enqueue(value.to_uppercase())?;
//!         }
//!         out.close()?;
//!         Ok(())
//!     })
//!     .await
//! }
//! ```
//!
//! ## Series strings
//!
//! Each column is one virtual tick; whitespace is ignored:
//!
//! | Character | Meaning |
//! |-----------|---------|
//! | `-` | one tick passes |
//! | `a`, `0`, ... | emit: the value bound in the [`Values`] table, or the character itself |
//! | `\|` | close (graceful completion) |
//! | `!` | cancel from the consumer side |
//! | `#` | abort (upstream error) |
//! | `(` ... `)` | group: every frame inside shares the opening tick; `)` advances one tick |
//! | `<` / `>` | writable only: backpressure on / off |
//!
//! Writable series accept only `-`, `<`, `>`, and `#`; signal series only
//! `-` and a single `!`.
//!
//! ## Core Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Harness`] | Per-test façade: stream factories, assertions, `run` |
//! | [`Readable`] | Readable stream under test (also a [`futures_util::Stream`]) |
//! | [`ReadableSource`] | Producer half of a readable; the transform extension point |
//! | [`Writable`] | Writable stream with a recording sink and a backpressure gate |
//! | [`Signal`] | Abort signal that fires at a scheduled tick |
//! | [`Values`] | Series-character-to-value table |
//! | [`Value`] | Trait for emittable values (`String`, `char`, `&'static str` built in) |
//! | [`SeriesProgram`] | Parsed series: frames plus extent |
//! | [`Config`] | Tick duration, tick budget, drain bound, wall-clock timeout |
//!
//! ## Determinism
//!
//! Virtual time advances only when the host's task queue has fully
//! drained, same-tick frames fire in insertion order, and every stream in
//! a harness shares one clock. Given the same series and the same test
//! body, observations are identical across runs. Rely on the harness's
//! own helpers for timing; reaching for wall-clock timers inside a test
//! body reintroduces the nondeterminism this crate exists to remove.
//!
//! ## Features
//!
//! - **`serde`** - `Serialize`/`Deserialize` for the plain data types
//!   ([`Tick`], [`Frame`], [`Config`], [`Reason`])

mod config;
mod diff;
mod error;
mod frame;
mod harness;
mod host;
mod readable;
mod recorder;
mod scheduler;
mod series;
mod signal;
mod value;
mod writable;

pub use config::Config;
pub use diff::SeriesDiff;
pub use error::Error;
pub use frame::{Frame, Tick, TimedFrame};
pub use harness::Harness;
pub use host::{Host, TokioHost};
pub use readable::{Readable, ReadableSource};
pub use series::{SeriesMode, SeriesProgram, Values, RESERVED};
pub use signal::Signal;
pub use value::{Reason, Value};
pub use writable::Writable;

/// Convenience alias for `Result<T, tidemark::Error>`.
pub type Result<T = ()> = std::result::Result<T, Error>;
