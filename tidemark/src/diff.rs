//! Tick-aligned comparison of expected and observed frame lists.

use std::{collections::BTreeMap, fmt};

use crate::{Frame, SeriesProgram, Tick, TimedFrame, Value, Values};

/// Payload of an assertion failure: both series rendered canonically plus
/// the first tick at which they disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDiff {
    pub expected: String,
    pub observed: String,
    pub mismatch_tick: Option<Tick>,
}

impl fmt::Display for SeriesDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mismatch_tick {
            Some(tick) => writeln!(f, "series mismatch at tick {tick}:")?,
            None => writeln!(f, "series mismatch:")?,
        }
        writeln!(f, "  expected: {}", self.expected)?;
        write!(f, "  observed: {}", self.observed)?;
        if let Some(tick) = self.mismatch_tick {
            if let Some(col) = column_of_tick(&self.observed, tick)
                .or_else(|| column_of_tick(&self.expected, tick))
            {
                write!(f, "\n  {}^", " ".repeat("observed: ".len() + col))?;
            }
        }
        Ok(())
    }
}

/// Compare an expected program against observed frames.
///
/// Returns `None` when every tick matches (same frames, same order, emits
/// equal by `==`, expected terminal reasons honored with the `None`
/// wildcard). Otherwise renders both sides for the failure message;
/// observed values the expected table cannot name render as `?`.
pub(crate) fn compare<V: Value>(
    expected: &SeriesProgram<V>,
    observed: &[TimedFrame<V>],
    values: &Values<V>,
) -> Option<SeriesDiff> {
    let mismatch_tick = first_mismatch_tick(&expected.frames, observed);
    mismatch_tick?;

    let observed_program = SeriesProgram {
        frames: observed.to_vec(),
        extent: expected.extent,
    };
    Some(SeriesDiff {
        expected: expected.render_lossy(values),
        observed: observed_program.render_lossy(values),
        mismatch_tick,
    })
}

fn first_mismatch_tick<V: Value>(
    expected: &[TimedFrame<V>],
    observed: &[TimedFrame<V>],
) -> Option<Tick> {
    let by_tick = |frames: &[TimedFrame<V>]| {
        let mut map: BTreeMap<Tick, Vec<Frame<V>>> = BTreeMap::new();
        for tf in frames {
            map.entry(tf.tick).or_default().push(tf.frame.clone());
        }
        map
    };
    let expected = by_tick(expected);
    let observed = by_tick(observed);

    let empty = Vec::new();
    let ticks = expected.keys().chain(observed.keys()).copied();
    let mut ticks: Vec<Tick> = ticks.collect();
    ticks.sort_unstable();
    ticks.dedup();

    for tick in ticks {
        let want = expected.get(&tick).unwrap_or(&empty);
        let got = observed.get(&tick).unwrap_or(&empty);
        if want.len() != got.len() {
            return Some(tick);
        }
        if want.iter().zip(got).any(|(w, g)| !w.matches(g)) {
            return Some(tick);
        }
    }
    None
}

/// The character position of `tick`'s cell within a canonical series.
/// Groups occupy one cell, so columns and ticks drift apart after a `(`.
fn column_of_tick(series: &str, tick: Tick) -> Option<usize> {
    let mut cell: u64 = 0;
    let mut in_group = false;
    for (col, ch) in series.chars().enumerate() {
        if cell == tick.value() && !in_group {
            return Some(col);
        }
        match ch {
            '(' => in_group = true,
            ')' => {
                in_group = false;
                cell += 1;
            }
            _ if in_group => {}
            _ => cell += 1,
        }
    }
    (cell == tick.value()).then_some(series.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Reason, SeriesMode};

    fn parsed(series: &str) -> SeriesProgram<String> {
        SeriesProgram::parse(series, &Values::new(), None, SeriesMode::Readable).unwrap()
    }

    #[test]
    fn equal_series_produce_no_diff() {
        let expected = parsed("--a--b--|");
        let observed = expected.frames.clone();
        assert_eq!(compare(&expected, &observed, &Values::new()), None);
    }

    #[test]
    fn first_differing_tick_is_reported() {
        let expected = parsed("--a--b--x--|");
        let observed = parsed("--a--b--c--|").frames;
        let diff = compare(&expected, &observed, &Values::new()).unwrap();

        assert_eq!(diff.mismatch_tick, Some(Tick::new(8)));
        assert_eq!(diff.expected, "--a--b--x--|");
        assert_eq!(diff.observed, "--a--b--c--|");

        let rendered = diff.to_string();
        assert!(rendered.contains("tick 8"));
        assert!(rendered.contains("expected: --a--b--x--|"));
    }

    #[test]
    fn a_missing_terminal_is_a_mismatch() {
        let expected = parsed("a--|");
        let observed = parsed("a---").frames;
        let diff = compare(&expected, &observed, &Values::new()).unwrap();
        assert_eq!(diff.mismatch_tick, Some(Tick::new(3)));
    }

    #[test]
    fn reason_wildcards_apply_per_frame() {
        let halt = Reason::new("halt");
        let wildcard =
            SeriesProgram::<String>::parse("a-!", &Values::new(), None, SeriesMode::Readable).unwrap();
        let observed =
            SeriesProgram::parse("a-!", &Values::new(), Some(&halt), SeriesMode::Readable)
                .unwrap()
                .frames;
        assert_eq!(compare(&wildcard, &observed, &Values::new()), None);

        let strict = SeriesProgram::parse(
            "a-!",
            &Values::new(),
            Some(&Reason::new("other")),
            SeriesMode::Readable,
        )
        .unwrap();
        let diff = compare(&strict, &observed, &Values::new()).unwrap();
        assert_eq!(diff.mismatch_tick, Some(Tick::new(2)));
    }

    #[test]
    fn caret_lands_under_the_mismatching_cell() {
        let diff = SeriesDiff {
            expected: "ab|".to_string(),
            observed: "ax|".to_string(),
            mismatch_tick: Some(Tick::new(1)),
        };
        let rendered = diff.to_string();
        let caret_line = rendered.lines().last().unwrap();
        // "observed: " is 10 wide, the cell for tick 1 is one further in.
        assert_eq!(caret_line.find('^'), Some(2 + 10 + 1));
    }

    #[test]
    fn groups_occupy_one_column_cell() {
        assert_eq!(column_of_tick("(ab)-|", Tick::new(0)), Some(0));
        assert_eq!(column_of_tick("(ab)-|", Tick::new(1)), Some(4));
        assert_eq!(column_of_tick("(ab)-|", Tick::new(2)), Some(5));
        assert_eq!(column_of_tick("a-", Tick::new(2)), Some(2));
        assert_eq!(column_of_tick("a-", Tick::new(5)), None);
    }
}
