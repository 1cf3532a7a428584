//! Just enough SVG reading to drive the minimap: the root `viewBox` and the
//! `d` attribute of the first `<path>` element.

use std::fmt;

use foundation::Step;
use serde::{Deserialize, Serialize};

use crate::path::{PathParseError, Waypoint, parse_waypoints};

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewBox {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Minimap geometry recovered from a floor's path resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Minimap {
    pub view_box: ViewBox,
    pub path_data: String,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SvgError {
    MissingElement(&'static str),
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    InvalidViewBox(String),
    Path(PathParseError),
}

impl fmt::Display for SvgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SvgError::MissingElement(name) => write!(f, "no <{name}> element"),
            SvgError::MissingAttribute { element, attribute } => {
                write!(f, "<{element}> has no {attribute} attribute")
            }
            SvgError::InvalidViewBox(raw) => write!(f, "invalid viewBox {raw:?}"),
            SvgError::Path(err) => write!(f, "path data: {err}"),
        }
    }
}

impl std::error::Error for SvgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SvgError::Path(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PathParseError> for SvgError {
    fn from(err: PathParseError) -> Self {
        SvgError::Path(err)
    }
}

/// Returns the attribute text of the first `<name ...>` start tag.
fn start_tag<'a>(doc: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}");
    let mut from = 0;
    while let Some(rel) = doc[from..].find(&open) {
        let start = from + rel + open.len();
        let rest = &doc[start..];
        // `<pathway` is not `<path`.
        match rest.chars().next() {
            Some(c) if c.is_whitespace() || c == '/' || c == '>' => {
                let end = rest.find('>')?;
                return Some(rest[..end].trim_end_matches('/'));
            }
            _ => from = start,
        }
    }
    None
}

/// Looks up `name="value"` (or single-quoted) inside a start tag.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut rest = tag;
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return None;
        }
        let eq = rest.find('=')?;
        let key = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            return None;
        }
        let body = &after[1..];
        let close = body.find(quote)?;
        if key == name {
            return Some(&body[..close]);
        }
        rest = &body[close + 1..];
    }
}

pub fn parse_view_box(raw: &str) -> Result<ViewBox, SvgError> {
    let values: Vec<f64> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| SvgError::InvalidViewBox(raw.to_string()))?;

    match values.as_slice() {
        [min_x, min_y, width, height] if *width > 0.0 && *height > 0.0 => Ok(ViewBox {
            min_x: *min_x,
            min_y: *min_y,
            width: *width,
            height: *height,
        }),
        _ => Err(SvgError::InvalidViewBox(raw.to_string())),
    }
}

/// `d` attribute of the first `<path>` in the document.
pub fn first_path_data(doc: &str) -> Result<&str, SvgError> {
    let tag = start_tag(doc, "path").ok_or(SvgError::MissingElement("path"))?;
    attribute(tag, "d").ok_or(SvgError::MissingAttribute {
        element: "path",
        attribute: "d",
    })
}

pub fn parse_minimap(doc: &str, total_steps: Step) -> Result<Minimap, SvgError> {
    let svg = start_tag(doc, "svg").ok_or(SvgError::MissingElement("svg"))?;
    let raw_view_box = attribute(svg, "viewBox").ok_or(SvgError::MissingAttribute {
        element: "svg",
        attribute: "viewBox",
    })?;
    let view_box = parse_view_box(raw_view_box)?;

    let path_data = first_path_data(doc)?;
    let waypoints = parse_waypoints(path_data, total_steps)?;

    Ok(Minimap {
        view_box,
        path_data: path_data.to_string(),
        waypoints,
    })
}
