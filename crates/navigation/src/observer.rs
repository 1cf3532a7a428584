use catalog::CommentRecord;
use formats::Waypoint;
use parking_lot::Mutex;
use runtime::EventBus;
use streaming::ImageLoadError;

use crate::state::NavigationState;

/// Notifications the core sends to the presentation layer.
///
/// Called after the state lock is released, so implementations may call
/// back into the navigator.
pub trait ViewerObserver: Send + Sync {
    fn on_state_changed(&self, _state: &NavigationState) {}

    fn on_comments_for_step_changed(&self, _comments: &[CommentRecord]) {}

    /// The current step's image failed to load; `retry` is the way back.
    fn on_connection_error(&self, _error: &ImageLoadError) {}

    fn on_waypoints_ready(&self, _waypoints: &[Waypoint]) {}

    /// The floor's path resource could not be loaded or parsed. The minimap
    /// is hidden; everything else keeps working.
    fn on_minimap_unavailable(&self, _reason: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullObserver;

impl ViewerObserver for NullObserver {}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    StateChanged(NavigationState),
    CommentsChanged(Vec<CommentRecord>),
    ConnectionError(ImageLoadError),
    WaypointsReady(Vec<Waypoint>),
    MinimapUnavailable(String),
}

impl ViewerEvent {
    pub(crate) fn dispatch(&self, observer: &dyn ViewerObserver) {
        match self {
            ViewerEvent::StateChanged(state) => observer.on_state_changed(state),
            ViewerEvent::CommentsChanged(comments) => {
                observer.on_comments_for_step_changed(comments)
            }
            ViewerEvent::ConnectionError(err) => observer.on_connection_error(err),
            ViewerEvent::WaypointsReady(waypoints) => observer.on_waypoints_ready(waypoints),
            ViewerEvent::MinimapUnavailable(reason) => observer.on_minimap_unavailable(reason),
        }
    }
}

/// Records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    bus: Mutex<EventBus<ViewerEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViewerEvent> {
        self.bus.lock().payloads().cloned().collect()
    }

    pub fn take(&self) -> Vec<ViewerEvent> {
        self.bus.lock().drain().into_iter().map(|e| e.payload).collect()
    }

    fn record(&self, event: ViewerEvent) {
        self.bus.lock().emit(event);
    }
}

impl ViewerObserver for RecordingObserver {
    fn on_state_changed(&self, state: &NavigationState) {
        self.record(ViewerEvent::StateChanged(state.clone()));
    }

    fn on_comments_for_step_changed(&self, comments: &[CommentRecord]) {
        self.record(ViewerEvent::CommentsChanged(comments.to_vec()));
    }

    fn on_connection_error(&self, error: &ImageLoadError) {
        self.record(ViewerEvent::ConnectionError(error.clone()));
    }

    fn on_waypoints_ready(&self, waypoints: &[Waypoint]) {
        self.record(ViewerEvent::WaypointsReady(waypoints.to_vec()));
    }

    fn on_minimap_unavailable(&self, reason: &str) {
        self.record(ViewerEvent::MinimapUnavailable(reason.to_string()));
    }
}
