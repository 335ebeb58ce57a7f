//! Series string codec: parse timelines into frame lists and render frame
//! lists back into canonical series strings.
//!
//! A series is an ASCII timeline in which each column is one virtual tick:
//!
//! ```text
//! ---a---b--|        emit "a" at 3, "b" at 7, close at 10
//! --(ab)#            emit "a" and "b" at 2, abort at 3
//! -----<---->        writable: backpressure on at 5, off at 10
//! ---!               signal: abort fires at 3
//! ```
//!
//! Grammar, shared by all modes: `-` advances one tick, whitespace is
//! skipped and never advances, `(...)` groups frames onto the opening tick
//! (the `)` advances exactly one tick), and the terminals `|` `!` `#` must
//! be the last non-whitespace input. Which characters are legal depends on
//! the [`SeriesMode`].

use std::{collections::BTreeMap, fmt};

use crate::{frame::terminal_tick, Error, Frame, Reason, Result, Tick, TimedFrame, Value};

/// Characters with fixed series meaning; none of them can key a value.
pub const RESERVED: [char; 9] = ['-', '|', '!', '#', '(', ')', ' ', '<', '>'];

/// Key space for fresh assignments during canonical rendering.
const KEY_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub(crate) fn is_reserved(ch: char) -> bool {
    ch.is_whitespace() || RESERVED.contains(&ch)
}

/// Which dialect of the series grammar applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SeriesMode {
    /// Full grammar: values, groups, and all three terminals.
    Readable,
    /// Only `-`, `<`, `>`, and the `#` terminal.
    Writable,
    /// Only `-` and exactly one `!` terminal.
    Signal,
}

impl fmt::Display for SeriesMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesMode::Readable => write!(f, "readable"),
            SeriesMode::Writable => write!(f, "writable"),
            SeriesMode::Signal => write!(f, "signal"),
        }
    }
}

/// A mapping from series characters to values.
///
/// Keys are single non-reserved, non-whitespace characters. Characters
/// absent from the table fall back to [`Value::from_key`]; for `String`
/// values that means any unbound character is enqueued as itself.
///
/// # Example
///
/// ```rust
/// use tidemark::Values;
///
/// let values = Values::<String>::new()
///     .bind('A', "foo".to_string())?
///     .bind('B', "bar".to_string())?;
/// # Ok::<(), tidemark::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Values<V>(BTreeMap<char, V>);

impl<V: Value> Values<V> {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Bind a key character to a value.
    ///
    /// Fails on reserved characters and on keys that are already bound.
    pub fn bind(mut self, key: char, value: impl Into<V>) -> Result<Self> {
        if is_reserved(key) {
            return Err(Error::ReservedKey(key));
        }
        if self.0.contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }
        self.0.insert(key, value.into());
        Ok(self)
    }

    pub fn get(&self, key: char) -> Option<&V> {
        self.0.get(&key)
    }

    /// The first key (in character order) bound to a value equal to `value`.
    pub fn key_for(&self, value: &V) -> Option<char> {
        self.0.iter().find(|(_, v)| *v == value).map(|(k, _)| *k)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn contains_key(&self, key: char) -> bool {
        self.0.contains_key(&key)
    }
}

/// A parsed series: an ordered frame list plus the timeline's extent.
///
/// The extent is the cursor position after the final character, i.e. the
/// tick at which the series string ended. Recorders use it as their
/// observation window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesProgram<V> {
    pub frames: Vec<TimedFrame<V>>,
    pub extent: Tick,
}

impl<V: Value> SeriesProgram<V> {
    /// Parse a series string into a program.
    ///
    /// `reason` is attached to any `!` or `#` terminal the series holds.
    /// Errors name the offending 1-based column.
    pub fn parse(
        series: &str,
        values: &Values<V>,
        reason: Option<&Reason>,
        mode: SeriesMode,
    ) -> Result<Self> {
        Parser {
            values,
            reason,
            mode,
            cursor: Tick::ZERO,
            group: None,
            terminal_seen: false,
            frames: Vec::new(),
            bound_used: Vec::new(),
            literal_used: Vec::new(),
        }
        .run(series)
    }

    /// Render this program as a canonical series string, assigning fresh
    /// single-character keys to distinct emitted values in first-appearance
    /// order.
    pub fn render(&self) -> Result<String> {
        let mut assigned: Vec<(V, char)> = Vec::new();
        let mut key_of = |v: &V| -> Result<char> {
            if let Some((_, key)) = assigned.iter().find(|(seen, _)| seen == v) {
                return Ok(*key);
            }
            let taken = |c: char| assigned.iter().any(|(_, k)| *k == c);
            let key = v
                .as_key()
                .filter(|c| !is_reserved(*c) && !taken(*c))
                .or_else(|| KEY_ALPHABET.chars().find(|c| !taken(*c)))
                .ok_or_else(|| Error::UnrenderableValue {
                    value: format!("{v:?}"),
                })?;
            assigned.push((v.clone(), key));
            Ok(key)
        };
        render_cells(&self.frames, self.extent, &mut key_of)
    }

    /// Render this program reusing the caller's value table.
    ///
    /// Each emitted value is matched against the table by `==`; values the
    /// table does not know fall back to [`Value::as_key`] when that
    /// character is free, and fail the render otherwise.
    pub fn render_with(&self, values: &Values<V>) -> Result<String> {
        let mut key_of = |v: &V| -> Result<char> {
            table_key(values, v).ok_or_else(|| Error::UnrenderableValue {
                value: format!("{v:?}"),
            })
        };
        render_cells(&self.frames, self.extent, &mut key_of)
    }

    /// Like [`render_with`](Self::render_with), but unmatched values render
    /// as `?` instead of failing. Used for assertion diffs, where the
    /// mismatch itself is the news.
    pub(crate) fn render_lossy(&self, values: &Values<V>) -> String {
        let mut key_of = |v: &V| -> Result<char> { Ok(table_key(values, v).unwrap_or('?')) };
        render_cells(&self.frames, self.extent, &mut key_of).unwrap_or_default()
    }
}

fn table_key<V: Value>(values: &Values<V>, v: &V) -> Option<char> {
    values
        .key_for(v)
        .or_else(|| v.as_key().filter(|c| !is_reserved(*c) && !values.contains_key(*c)))
}

struct Parser<'a, V: Value> {
    values: &'a Values<V>,
    reason: Option<&'a Reason>,
    mode: SeriesMode,
    cursor: Tick,
    /// `Some((column of '(', frames emitted inside))` while grouping.
    group: Option<(usize, usize)>,
    terminal_seen: bool,
    frames: Vec<TimedFrame<V>>,
    bound_used: Vec<char>,
    literal_used: Vec<char>,
}

impl<V: Value> Parser<'_, V> {
    fn run(mut self, series: &str) -> Result<SeriesProgram<V>> {
        for (idx, ch) in series.chars().enumerate() {
            self.step(idx + 1, ch)?;
        }
        if let Some((column, _)) = self.group {
            return Err(Error::UnclosedGroup { column });
        }
        if self.mode == SeriesMode::Signal && !self.terminal_seen {
            return Err(Error::MissingSignalTerminal);
        }
        if !self.bound_used.is_empty() && !self.literal_used.is_empty() {
            tracing::warn!(
                keys = ?self.bound_used,
                literals = ?self.literal_used,
                "series mixes table keys and literal characters; the value table is authoritative"
            );
        }
        Ok(SeriesProgram {
            frames: self.frames,
            extent: self.cursor,
        })
    }

    fn step(&mut self, column: usize, ch: char) -> Result<()> {
        if ch.is_whitespace() {
            return Ok(());
        }
        if self.terminal_seen && !(ch == ')' && self.group.is_some()) {
            return Err(Error::FrameAfterTerminal { column });
        }
        match ch {
            '-' => {
                if self.group.is_none() {
                    self.cursor = self.cursor.advanced(1);
                }
            }
            '|' if self.mode == SeriesMode::Readable => self.push_terminal(Frame::Close),
            '!' if self.mode != SeriesMode::Writable => {
                self.push_terminal(Frame::Cancel(self.reason.cloned()));
            }
            '#' if self.mode != SeriesMode::Signal => {
                self.push_terminal(Frame::Abort(self.reason.cloned()));
            }
            '<' if self.mode == SeriesMode::Writable => self.push_frame(Frame::BackpressureOn),
            '>' if self.mode == SeriesMode::Writable => self.push_frame(Frame::BackpressureOff),
            '(' if self.mode == SeriesMode::Readable => {
                if self.group.is_some() {
                    return Err(Error::NestedGroup { column });
                }
                self.group = Some((column, 0));
            }
            ')' if self.mode == SeriesMode::Readable => {
                let Some((open_column, count)) = self.group.take() else {
                    return Err(Error::UnmatchedGroupClose { column });
                };
                if count == 0 {
                    return Err(Error::EmptyGroup {
                        column: open_column,
                    });
                }
                self.cursor = self.cursor.advanced(1);
            }
            _ if self.mode != SeriesMode::Readable || is_reserved(ch) => {
                return Err(Error::IllegalChar {
                    column,
                    ch,
                    mode: self.mode,
                });
            }
            _ => {
                let value = match self.values.get(ch) {
                    Some(v) => {
                        self.bound_used.push(ch);
                        v.clone()
                    }
                    None => {
                        self.literal_used.push(ch);
                        V::from_key(ch).ok_or(Error::UnboundKey { column, ch })?
                    }
                };
                self.push_frame(Frame::Emit(value));
            }
        }
        Ok(())
    }

    fn push_frame(&mut self, frame: Frame<V>) {
        self.frames.push(TimedFrame {
            tick: self.cursor,
            frame,
        });
        match &mut self.group {
            Some((_, count)) => *count += 1,
            None => self.cursor = self.cursor.advanced(1),
        }
    }

    fn push_terminal(&mut self, frame: Frame<V>) {
        self.push_frame(frame);
        self.terminal_seen = true;
    }
}

/// Shared rendering walk: bucket frames per tick, group multi-frame ticks,
/// pad empty ticks with `-`. Rendering stops at a terminal; extent padding
/// applies only to unterminated lists.
fn render_cells<V: Value>(
    frames: &[TimedFrame<V>],
    extent: Tick,
    key_of: &mut dyn FnMut(&V) -> Result<char>,
) -> Result<String> {
    let mut cells: BTreeMap<u64, Vec<char>> = BTreeMap::new();
    for timed in frames {
        let ch = match &timed.frame {
            Frame::Emit(v) => key_of(v)?,
            Frame::Close => '|',
            Frame::Cancel(_) => '!',
            Frame::Abort(_) => '#',
            Frame::BackpressureOn => '<',
            Frame::BackpressureOff => '>',
        };
        cells.entry(timed.tick.value()).or_default().push(ch);
    }

    let end = match terminal_tick(frames) {
        Some(tick) => tick.value() + 1,
        None => extent
            .value()
            .max(frames.last().map_or(0, |f| f.tick.value() + 1)),
    };

    let mut out = String::new();
    for tick in 0..end {
        match cells.get(&tick) {
            None => out.push('-'),
            Some(chars) if chars.len() == 1 => out.push(chars[0]),
            Some(chars) => {
                out.push('(');
                out.extend(chars);
                out.push(')');
            }
        }
    }
    Ok(out)
}
