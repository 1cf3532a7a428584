//! Waypoint extraction from SVG path data.
//!
//! Only absolute move (`M`), line (`L`) and horizontal line (`H`) commands
//! produce waypoints; every other command (curves, arcs, relative forms,
//! close-path) is skipped together with its arguments. Extra coordinate pairs
//! after `M`/`L` and extra values after `H` are implicit repeats of the
//! command and produce one waypoint each.

use std::fmt;

use foundation::Step;
use serde::{Deserialize, Serialize};

const PATH_COMMANDS: &str = "MmLlHhVvCcSsQqTtAaZz";

/// A path vertex bound to a walkthrough step (1-based, in encounter order).
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub step: Step,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathParseError {
    /// A coordinate token that is not a finite number.
    InvalidNumber { token: String, offset: usize },
    /// `M`/`L` without a complete `x y` pair, or `H` without a value.
    MissingCoordinate { command: char, offset: usize },
    /// Text before the first command.
    UnexpectedText { token: String, offset: usize },
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathParseError::InvalidNumber { token, offset } => {
                write!(f, "invalid coordinate {token:?} at byte {offset}")
            }
            PathParseError::MissingCoordinate { command, offset } => {
                write!(f, "command {command} at byte {offset} is missing a coordinate")
            }
            PathParseError::UnexpectedText { token, offset } => {
                write!(f, "unexpected {token:?} at byte {offset} before first command")
            }
        }
    }
}

impl std::error::Error for PathParseError {}

struct Segment<'a> {
    command: char,
    offset: usize,
    args: &'a str,
}

fn segments(data: &str) -> Result<Vec<Segment<'_>>, PathParseError> {
    let mut out: Vec<Segment<'_>> = Vec::new();
    let mut current: Option<(char, usize)> = None;

    for (idx, ch) in data.char_indices() {
        if !PATH_COMMANDS.contains(ch) {
            continue;
        }
        match current {
            Some((command, offset)) => out.push(Segment {
                command,
                offset,
                args: &data[offset + 1..idx],
            }),
            None => {
                let lead = data[..idx].trim();
                if !lead.is_empty() {
                    return Err(PathParseError::UnexpectedText {
                        token: lead.to_string(),
                        offset: 0,
                    });
                }
            }
        }
        current = Some((ch, idx));
    }

    match current {
        Some((command, offset)) => out.push(Segment {
            command,
            offset,
            args: &data[offset + 1..],
        }),
        None => {
            let lead = data.trim();
            if !lead.is_empty() {
                return Err(PathParseError::UnexpectedText {
                    token: lead.to_string(),
                    offset: 0,
                });
            }
        }
    }

    Ok(out)
}

/// Whitespace/comma separated tokens with their byte offsets in `args`.
fn tokens(args: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (idx, ch) in args.char_indices() {
        let separator = ch.is_whitespace() || ch == ',';
        match (start, separator) {
            (None, false) => start = Some(idx),
            (Some(from), true) => {
                out.push((from, &args[from..idx]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(from) = start {
        out.push((from, &args[from..]));
    }
    out
}

fn numbers(segment: &Segment<'_>) -> Result<Vec<f64>, PathParseError> {
    // `args` starts right after the command letter.
    let base = segment.offset + 1;
    tokens(segment.args)
        .into_iter()
        .map(|(at, token)| match token.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(PathParseError::InvalidNumber {
                token: token.to_string(),
                offset: base + at,
            }),
        })
        .collect()
}

/// Parses path data into at most `total_steps` waypoints.
///
/// Paths shorter than `total_steps` simply yield fewer waypoints.
pub fn parse_waypoints(data: &str, total_steps: Step) -> Result<Vec<Waypoint>, PathParseError> {
    let mut waypoints: Vec<Waypoint> = Vec::new();
    let mut y = 0.0;

    fn push(x: f64, y: f64, waypoints: &mut Vec<Waypoint>) {
        let step = waypoints.len() as Step + 1;
        waypoints.push(Waypoint { x, y, step });
    }

    for segment in segments(data)? {
        match segment.command {
            'M' | 'L' => {
                let values = numbers(&segment)?;
                if values.is_empty() || values.len() % 2 != 0 {
                    return Err(PathParseError::MissingCoordinate {
                        command: segment.command,
                        offset: segment.offset,
                    });
                }
                for pair in values.chunks_exact(2) {
                    y = pair[1];
                    push(pair[0], y, &mut waypoints);
                }
            }
            'H' => {
                let values = numbers(&segment)?;
                if values.is_empty() {
                    return Err(PathParseError::MissingCoordinate {
                        command: 'H',
                        offset: segment.offset,
                    });
                }
                for x in values {
                    push(x, y, &mut waypoints);
                }
            }
            _ => {}
        }
    }

    waypoints.truncate(total_steps as usize);
    Ok(waypoints)
}
