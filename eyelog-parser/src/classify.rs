//! Line classification
//!
//! Turns one raw text line into a [`LineEvent`]. Classification is purely by
//! line shape; no trial or phase state is consulted here.
//!
//! Recognized shapes:
//! - `MSG <time> <keyword> <args...>` and bare `<keyword> <args...>` for the
//!   known message keywords
//! - `<time> <x> <y> <pupil> ...` (monocular) or
//!   `<time> <xl> <yl> <pl> <xr> <yr> <pr> ...` (binocular) samples, where `.`
//!   marks a missing value
//! - `EFIX` / `EBLINK` end-of-event markers, when event lists are enabled

use crate::config::{Eye, RecordingMode};
use crate::types::{BlinkEvent, FixationEvent, LineEvent, Message, MessageKind, RawSample};

/// Options that change how lines are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassifyOptions {
    pub mode: RecordingMode,
    /// Classify `EFIX`/`EBLINK` markers instead of ignoring them
    pub event_lists: bool,
}

/// Classify a single line
pub fn classify_line(line: &str, options: &ClassifyOptions) -> LineEvent {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&first) = tokens.first() else {
        return LineEvent::Ignored;
    };

    if first == "MSG" {
        return parse_vendor_message(&tokens);
    }

    let kind = MessageKind::from_keyword(first);
    if kind != MessageKind::Other {
        return LineEvent::Message(Message {
            kind,
            keyword: first.to_string(),
            timestamp: None,
            args: tokens[1..].iter().map(|s| s.to_string()).collect(),
        });
    }

    if options.event_lists {
        match first {
            "EFIX" => return parse_fixation(&tokens),
            "EBLINK" => return parse_blink(&tokens),
            _ => {}
        }
    }

    match first.parse::<i64>() {
        Ok(time) if tokens.len() >= 2 => LineEvent::Sample(parse_sample(time, &tokens[1..], options.mode)),
        _ => LineEvent::Ignored,
    }
}

/// `MSG 6735155 start_trial 1`
///
/// Some converters drop the timestamp; the keyword then directly follows `MSG`.
fn parse_vendor_message(tokens: &[&str]) -> LineEvent {
    let (timestamp, rest) = match tokens.get(1).map(|t| t.parse::<i64>()) {
        Some(Ok(time)) => (Some(time), &tokens[2..]),
        Some(Err(_)) => (None, &tokens[1..]),
        None => return LineEvent::Ignored,
    };
    let Some(&keyword) = rest.first() else {
        return LineEvent::Ignored;
    };
    LineEvent::Message(Message {
        kind: MessageKind::from_keyword(keyword),
        keyword: keyword.to_string(),
        timestamp,
        args: rest[1..].iter().map(|s| s.to_string()).collect(),
    })
}

/// Parse one sample field. `Err` means the token is not numeric at all.
fn parse_field(token: &str) -> Result<Option<f64>, ()> {
    if token == "." {
        return Ok(None);
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        // nan/inf spellings are treated as "no data"
        Ok(_) => Ok(None),
        Err(_) => Err(()),
    }
}

/// Parse up to `count` leading fields; absent fields are missing.
fn parse_fields(fields: &[&str], count: usize) -> Option<Vec<Option<f64>>> {
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        match fields.get(i) {
            Some(token) => values.push(parse_field(token).ok()?),
            None => values.push(None),
        }
    }
    Some(values)
}

/// A zero pupil size is the tracker's "no pupil" value
fn pupil_value(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

fn parse_sample(time: i64, fields: &[&str], mode: RecordingMode) -> RawSample {
    match mode {
        RecordingMode::Monocular => match parse_fields(fields, 3) {
            Some(values) => RawSample {
                time,
                x: values[0],
                y: values[1],
                pupil: pupil_value(values[2]),
            },
            None => RawSample::empty(time),
        },
        RecordingMode::Binocular { eye } => match parse_fields(fields, 6) {
            Some(values) => {
                let left = (values[0], values[1], pupil_value(values[2]));
                let right = (values[3], values[4], pupil_value(values[5]));
                let (x, y, pupil) = match eye {
                    Eye::Left => left,
                    Eye::Right => right,
                    Eye::Mean => (
                        mean_of(left.0, right.0),
                        mean_of(left.1, right.1),
                        mean_of(left.2, right.2),
                    ),
                };
                RawSample { time, x, y, pupil }
            }
            None => RawSample::empty(time),
        },
    }
}

fn mean_of(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

/// `EFIX R   1651574	1654007	2434	  653.3	  557.8	   4710`
fn parse_fixation(tokens: &[&str]) -> LineEvent {
    if tokens.len() < 8 {
        return LineEvent::Ignored;
    }
    match (tokens[2].parse::<i64>(), tokens[3].parse::<i64>()) {
        (Ok(start), Ok(end)) => LineEvent::Fixation(FixationEvent {
            start,
            end,
            x: parse_field(tokens[5]).ok().flatten(),
            y: parse_field(tokens[6]).ok().flatten(),
        }),
        _ => LineEvent::Ignored,
    }
}

/// `EBLINK R 1234 1300 66`
fn parse_blink(tokens: &[&str]) -> LineEvent {
    if tokens.len() < 4 {
        return LineEvent::Ignored;
    }
    match (tokens[2].parse::<i64>(), tokens[3].parse::<i64>()) {
        (Ok(start), Ok(end)) => LineEvent::Blink(BlinkEvent { start, end }),
        _ => LineEvent::Ignored,
    }
}
