use std::fmt;

use catalog::{CommentError, ThreadKey};
use formats::{FloorConfig, ZoomConfig};
use foundation::{FloorId, Step};
use serde::Serialize;

/// Zoom level snapped to the configured granularity and clamped to bounds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Zoom(u32);

impl Zoom {
    pub const DEFAULT_PERCENT: u32 = 100;

    /// Rounds to the nearest `step` (halves go up), then clamps.
    /// `None` for non-finite input.
    pub fn snapped(percent: f64, config: &ZoomConfig) -> Option<Zoom> {
        if !percent.is_finite() {
            return None;
        }
        let step = f64::from(config.step.max(1));
        let snapped = (percent / step + 0.5).floor() * step;
        let clamped = snapped.clamp(f64::from(config.min), f64::from(config.max));
        Some(Zoom(clamped as u32))
    }

    pub fn initial(config: &ZoomConfig) -> Zoom {
        Zoom::snapped(f64::from(Self::DEFAULT_PERCENT), config)
            .unwrap_or(Zoom(Self::DEFAULT_PERCENT))
    }

    pub fn percent(self) -> u32 {
        self.0
    }

    /// Camera field of view: `base_fov * 100 / zoom`.
    pub fn fov_deg(self, config: &ZoomConfig) -> f64 {
        config.base_fov_deg * 100.0 / f64::from(self.0.max(1))
    }
}

/// Snapshot of everything the presentation layer renders from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationState {
    pub current_floor: FloorId,
    pub floor_name: String,
    pub current_step: Step,
    pub total_steps: Step,
    pub is_loading: bool,
    pub zoom: Zoom,
    pub fov_deg: f64,
    /// Thread of the comment whose popup is open.
    pub active_comment: Option<ThreadKey>,
    /// Set when the last step load failed; cleared by the next success.
    pub connection_lost: bool,
}

impl NavigationState {
    pub fn new(floor: &FloorConfig, zoom_config: &ZoomConfig) -> Self {
        let zoom = Zoom::initial(zoom_config);
        Self {
            current_floor: floor.id.clone(),
            floor_name: floor.name.clone(),
            current_step: 1,
            total_steps: floor.total_steps,
            is_loading: false,
            zoom,
            fov_deg: zoom.fov_deg(zoom_config),
            active_comment: None,
            connection_lost: false,
        }
    }

    pub fn contains_step(&self, step: Step) -> bool {
        (1..=self.total_steps).contains(&step)
    }

    pub fn next_step(&self) -> Step {
        if self.current_step >= self.total_steps {
            1
        } else {
            self.current_step + 1
        }
    }

    pub fn prev_step(&self) -> Step {
        if self.current_step <= 1 {
            self.total_steps
        } else {
            self.current_step - 1
        }
    }

    pub(crate) fn enter_floor(&mut self, floor: &FloorConfig) {
        self.current_floor = floor.id.clone();
        self.floor_name = floor.name.clone();
        self.total_steps = floor.total_steps;
        self.current_step = 1;
        self.active_comment = None;
    }

    pub(crate) fn set_zoom(&mut self, zoom: Zoom, config: &ZoomConfig) {
        self.zoom = zoom;
        self.fov_deg = zoom.fov_deg(config);
    }
}

/// Why a request was refused. A refused request changes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A step or floor transition is already in flight.
    Busy,
    StepOutOfRange { step: Step, total_steps: Step },
    UnknownFloor(FloorId),
    SameFloor(FloorId),
    InvalidZoom,
    Comment(CommentError),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Busy => write!(f, "a transition is already in progress"),
            Rejection::StepOutOfRange { step, total_steps } => {
                write!(f, "step {step} outside 1..={total_steps}")
            }
            Rejection::UnknownFloor(id) => write!(f, "unknown floor {id}"),
            Rejection::SameFloor(id) => write!(f, "already on floor {id}"),
            Rejection::InvalidZoom => write!(f, "zoom must be a finite percentage"),
            Rejection::Comment(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Rejection {}

impl From<CommentError> for Rejection {
    fn from(err: CommentError) -> Self {
        Rejection::Comment(err)
    }
}
