use std::fmt;
use std::sync::Arc;

use catalog::{
    CommentError, CommentRecord, CommentStore, NewComment, Reply, ResolvedComment, RiskLevel,
    ThreadKey, parse_resolved,
};
use formats::{ConfigError, FloorConfig, Minimap, ViewBox, ViewerConfig, parse_minimap};
use foundation::math::{EquirectFrame, LookAngles, Vec2, Vec3};
use foundation::{FloorId, Step};
use parking_lot::Mutex;
use runtime::Spawn;
use serde::Serialize;
use streaming::{AssetFetcher, FetchError, ImageHandle, ImageLoadError, ImageSet, Preloader};
use tracing::{debug, error, info, warn};

use crate::observer::{NullObserver, ViewerEvent, ViewerObserver};
use crate::state::{NavigationState, Rejection, Zoom};

/// Author recorded on replies made through [`Navigator::reply`].
pub const USER_AUTHOR: &str = "You";

/// Outcome of a navigation request.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied,
    /// Nothing changed.
    Rejected(Rejection),
    /// The image for the target step failed to load. Loading has ended and
    /// [`Navigator::retry`] re-enters the current step.
    ConnectionLost(ImageLoadError),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// Minimap vertex with its highlight flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimapWaypoint {
    pub x: f64,
    pub y: f64,
    pub step: Step,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinimapView {
    pub floor: FloorId,
    pub bg_image: String,
    pub view_box: ViewBox,
    pub waypoints: Vec<MinimapWaypoint>,
}

#[derive(Debug)]
pub enum ResolvedLoadError {
    Fetch(FetchError),
    Parse(CommentError),
}

impl fmt::Display for ResolvedLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedLoadError::Fetch(err) => write!(f, "resolved comments unavailable: {err}"),
            ResolvedLoadError::Parse(err) => write!(f, "resolved comments malformed: {err}"),
        }
    }
}

impl std::error::Error for ResolvedLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolvedLoadError::Fetch(err) => Some(err),
            ResolvedLoadError::Parse(err) => Some(err),
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum Preload {
    /// Neighbours of the entered step.
    Window,
    /// Steps `2..=startup_preload`.
    Startup,
}

struct Inner {
    state: NavigationState,
    comments: CommentStore,
    minimap: Option<Minimap>,
}

impl Inner {
    fn is_current(&self, floor: &FloorId, step: Step) -> bool {
        self.state.current_floor == *floor && self.state.current_step == step
    }
}

/// Undoes the first phase of a transition that never reaches its commit
/// phase (including when the transition future is dropped mid-flight):
/// puts back the image set of the floor still shown, then clears
/// `is_loading`.
struct LoadingGuard<'a> {
    inner: &'a Mutex<Inner>,
    preloader: &'a Preloader,
    restore: Option<ImageSet>,
    armed: bool,
}

impl LoadingGuard<'_> {
    /// Must be called before taking the state lock in the commit phase.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(set) = self.restore.take() {
            debug!(floor = %set.floor, "floor switch abandoned, restoring image set");
            self.preloader.reset(set);
        }
        self.inner.lock().state.is_loading = false;
    }
}

/// The walkthrough state machine.
///
/// Step and floor transitions run in two synchronous phases around their
/// fetches: the first validates and enters `Loading`, the second commits
/// the result and leaves it. While `Loading`, other transitions are
/// rejected with [`Rejection::Busy`]. Observers are notified only after a
/// phase has fully applied.
pub struct Navigator {
    config: Arc<ViewerConfig>,
    frame: EquirectFrame,
    fetcher: Arc<dyn AssetFetcher>,
    preloader: Preloader,
    observer: Arc<dyn ViewerObserver>,
    inner: Mutex<Inner>,
}

impl Navigator {
    pub fn new(
        config: ViewerConfig,
        fetcher: Arc<dyn AssetFetcher>,
        spawner: Arc<dyn Spawn>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let floor = config.floor(&config.default_floor).ok_or_else(|| {
            ConfigError::Invalid(format!("default floor {} is not configured", config.default_floor))
        })?;

        let state = NavigationState::new(floor, &config.zoom);
        let preloader = Preloader::new(Arc::clone(&fetcher), spawner);
        preloader.reset(ImageSet::for_floor(&config, floor));
        let frame = config.frame();

        Ok(Self {
            config: Arc::new(config),
            frame,
            fetcher,
            preloader,
            observer: Arc::new(NullObserver),
            inner: Mutex::new(Inner {
                state,
                comments: CommentStore::default(),
                minimap: None,
            }),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ViewerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_comments(mut self, comments: CommentStore) -> Self {
        self.inner.get_mut().comments = comments;
        self
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn frame(&self) -> EquirectFrame {
        self.frame
    }

    pub fn preloader(&self) -> &Preloader {
        &self.preloader
    }

    pub fn state(&self) -> NavigationState {
        self.inner.lock().state.clone()
    }

    /// Loads the current floor: minimap, then step 1, then background
    /// preloads of the startup range.
    pub async fn start(&self) -> Transition {
        let begun = self.begin(|inner| {
            let id = &inner.state.current_floor;
            self.config
                .floor(id)
                .cloned()
                .ok_or_else(|| Rejection::UnknownFloor(id.clone()))
        });
        let (floor, guard) = match begun {
            Ok(begun) => begun,
            Err(rejection) => return self.rejected(rejection),
        };
        info!(floor = %floor.id, "walkthrough starting");
        self.enter_floor(guard, floor, Preload::Startup).await
    }

    pub async fn go_to_step(&self, step: Step) -> Transition {
        self.step_to(|_| step).await
    }

    /// Next step, wrapping from the last step to 1.
    pub async fn go_to_next(&self) -> Transition {
        self.step_to(NavigationState::next_step).await
    }

    /// Previous step, wrapping from 1 to the last step.
    pub async fn go_to_prev(&self) -> Transition {
        self.step_to(NavigationState::prev_step).await
    }

    pub async fn go_to_first(&self) -> Transition {
        self.step_to(|_| 1).await
    }

    pub async fn go_to_last(&self) -> Transition {
        self.step_to(|state| state.total_steps).await
    }

    /// Reloads the current step, e.g. after a connection error.
    pub async fn retry(&self) -> Transition {
        self.step_to(|state| state.current_step).await
    }

    /// Moves to step 1 of `floor`, clearing the image cache and rebuilding
    /// the minimap.
    ///
    /// Once accepted the switch always lands on the new floor: a failed path
    /// resource only hides the minimap, and a failed step image leaves the
    /// viewer on step 1 with the connection-error condition raised.
    pub async fn switch_floor(&self, floor: &FloorId) -> Transition {
        let begun = self.begin(|inner| {
            let current = &inner.state.current_floor;
            if current == floor {
                return Err(Rejection::SameFloor(floor.clone()));
            }
            let target = self
                .config
                .floor(floor)
                .cloned()
                .ok_or_else(|| Rejection::UnknownFloor(floor.clone()))?;
            let shown = self
                .config
                .floor(current)
                .map(|f| ImageSet::for_floor(&self.config, f));
            Ok((target, shown))
        });
        let ((target, shown), mut guard) = match begun {
            Ok(begun) => begun,
            Err(rejection) => return self.rejected(rejection),
        };

        guard.restore = shown;
        let evicted = self.preloader.reset(ImageSet::for_floor(&self.config, &target));
        info!(floor = %target.id, evicted = evicted.len(), "switching floor");
        self.enter_floor(guard, target, Preload::Window).await
    }

    /// Sets an absolute zoom percentage, snapped and clamped.
    pub fn set_zoom(&self, percent: f64) -> Transition {
        let Some(zoom) = Zoom::snapped(percent, &self.config.zoom) else {
            return self.rejected(Rejection::InvalidZoom);
        };
        let changed = {
            let mut inner = self.inner.lock();
            if inner.state.zoom == zoom {
                None
            } else {
                inner.state.set_zoom(zoom, &self.config.zoom);
                Some(inner.state.clone())
            }
        };
        if let Some(state) = changed {
            debug!(zoom = zoom.percent(), fov = state.fov_deg, "zoom changed");
            self.observer.on_state_changed(&state);
        }
        Transition::Applied
    }

    pub fn zoom_by(&self, delta: f64) -> Transition {
        let current = f64::from(self.inner.lock().state.zoom.percent());
        self.set_zoom(current + delta)
    }

    pub fn zoom_in(&self) -> Transition {
        self.zoom_by(f64::from(self.config.zoom.step))
    }

    pub fn zoom_out(&self) -> Transition {
        self.zoom_by(-f64::from(self.config.zoom.step))
    }

    pub fn reset_zoom(&self) -> Transition {
        self.set_zoom(f64::from(Zoom::DEFAULT_PERCENT))
    }

    /// Comments of the current step.
    pub fn comments(&self) -> Vec<CommentRecord> {
        let inner = self.inner.lock();
        inner
            .comments
            .step_comments(&inner.state.current_floor, inner.state.current_step)
    }

    pub fn step_comments(&self, floor: &FloorId, step: Step) -> Vec<CommentRecord> {
        self.inner.lock().comments.step_comments(floor, step)
    }

    /// Adds a user comment. The first line of `text` becomes its title.
    pub fn add_comment(
        &self,
        floor: &FloorId,
        step: Step,
        pixel: Vec2,
        text: &str,
        risk: RiskLevel,
    ) -> Result<CommentRecord, Rejection> {
        let Some(floor_config) = self.config.floor(floor) else {
            return Err(self.refuse(Rejection::UnknownFloor(floor.clone())));
        };
        if !floor_config.contains_step(step) {
            return Err(self.refuse(Rejection::StepOutOfRange {
                step,
                total_steps: floor_config.total_steps,
            }));
        }
        if !self.frame.contains(pixel) {
            return Err(self.refuse(CommentError::InvalidPosition.into()));
        }

        let (record, refreshed) = {
            let mut inner = self.inner.lock();
            let record = inner
                .comments
                .add_user_comment(floor, step, NewComment::from_text(pixel, text, risk))
                .map_err(|err| self.refuse(err.into()))?;
            let refreshed = if inner.is_current(floor, step) {
                Some(inner.comments.step_comments(floor, step))
            } else {
                None
            };
            (record, refreshed)
        };
        if let Some(comments) = refreshed {
            self.observer.on_comments_for_step_changed(&comments);
        }
        Ok(record)
    }

    /// Adds a comment on the current step at the panorama pixel behind a
    /// world-space hit point.
    pub fn add_comment_at_hit(
        &self,
        hit: Vec3,
        text: &str,
        risk: RiskLevel,
    ) -> Result<CommentRecord, Rejection> {
        if !hit.is_finite() || hit.length() == 0.0 {
            return Err(self.refuse(CommentError::InvalidPosition.into()));
        }
        let pixel = self.frame.to_pixel(hit);
        let (floor, step) = {
            let inner = self.inner.lock();
            (inner.state.current_floor.clone(), inner.state.current_step)
        };
        self.add_comment(&floor, step, pixel, text, risk)
    }

    pub fn remove_comment(&self, floor: &FloorId, step: Step, id: &str) -> bool {
        let refreshed = {
            let mut inner = self.inner.lock();
            if !inner.comments.remove_user_comment(floor, step, id) {
                return false;
            }
            if inner.is_current(floor, step) {
                Some(inner.comments.step_comments(floor, step))
            } else {
                None
            }
        };
        if let Some(comments) = refreshed {
            self.observer.on_comments_for_step_changed(&comments);
        }
        true
    }

    /// Opens a comment of the current step and returns its thread key,
    /// seeding the thread on first open.
    pub fn open_comment(&self, comment: &CommentRecord) -> ThreadKey {
        let (key, state) = {
            let mut inner = self.inner.lock();
            let floor = inner.state.current_floor.clone();
            let step = inner.state.current_step;
            let key = inner.comments.open_thread(&floor, step, comment);
            inner.state.active_comment = Some(key.clone());
            (key, inner.state.clone())
        };
        self.observer.on_state_changed(&state);
        key
    }

    pub fn close_comment(&self) {
        let state = {
            let mut inner = self.inner.lock();
            if inner.state.active_comment.take().is_none() {
                return;
            }
            inner.state.clone()
        };
        self.observer.on_state_changed(&state);
    }

    /// Appends a reply from the local user. Blank text is ignored.
    pub fn reply(&self, key: &ThreadKey, text: &str) -> bool {
        self.inner.lock().comments.append_reply(key, USER_AUTHOR, text)
    }

    pub fn thread(&self, key: &ThreadKey) -> Option<Vec<Reply>> {
        self.inner.lock().comments.thread(key).map(<[Reply]>::to_vec)
    }

    /// Camera orientation that centres `comment` in view.
    pub fn look_at(&self, comment: &CommentRecord) -> LookAngles {
        self.frame.look_angles(comment.pixel())
    }

    /// Minimap of the current floor, or `None` while it is unavailable.
    pub fn minimap(&self) -> Option<MinimapView> {
        let inner = self.inner.lock();
        let minimap = inner.minimap.as_ref()?;
        let floor = self.config.floor(&inner.state.current_floor)?;
        let current = inner.state.current_step;
        Some(MinimapView {
            floor: floor.id.clone(),
            bg_image: floor.bg_image.clone(),
            view_box: minimap.view_box,
            waypoints: minimap
                .waypoints
                .iter()
                .map(|w| MinimapWaypoint {
                    x: w.x,
                    y: w.y,
                    step: w.step,
                    active: w.step == current,
                })
                .collect(),
        })
    }

    pub async fn load_resolved_comments(
        &self,
        location: &str,
    ) -> Result<Vec<ResolvedComment>, ResolvedLoadError> {
        let payload = self
            .fetcher
            .fetch_text(location)
            .await
            .map_err(ResolvedLoadError::Fetch)?;
        parse_resolved(&payload).map_err(ResolvedLoadError::Parse)
    }

    /// First phase of a transition: refuses while loading, validates, then
    /// enters `Loading`.
    fn begin<T>(
        &self,
        validate: impl FnOnce(&Inner) -> Result<T, Rejection>,
    ) -> Result<(T, LoadingGuard<'_>), Rejection> {
        let (value, state) = {
            let mut inner = self.inner.lock();
            if inner.state.is_loading {
                return Err(Rejection::Busy);
            }
            let value = validate(&inner)?;
            inner.state.is_loading = true;
            (value, inner.state.clone())
        };
        self.observer.on_state_changed(&state);
        Ok((
            value,
            LoadingGuard {
                inner: &self.inner,
                preloader: &self.preloader,
                restore: None,
                armed: true,
            },
        ))
    }

    async fn step_to(&self, pick: impl FnOnce(&NavigationState) -> Step) -> Transition {
        let begun = self.begin(|inner| {
            let step = pick(&inner.state);
            if inner.state.contains_step(step) {
                Ok(step)
            } else {
                Err(Rejection::StepOutOfRange {
                    step,
                    total_steps: inner.state.total_steps,
                })
            }
        });
        let (step, guard) = match begun {
            Ok(begun) => begun,
            Err(rejection) => return self.rejected(rejection),
        };

        let loaded = self.preloader.load(step).await;
        self.commit_step(guard, step, loaded)
    }

    fn commit_step(
        &self,
        guard: LoadingGuard<'_>,
        step: Step,
        loaded: Result<ImageHandle, ImageLoadError>,
    ) -> Transition {
        guard.disarm();
        let mut events = Vec::new();
        let outcome = {
            let mut inner = self.inner.lock();
            inner.state.is_loading = false;
            match loaded {
                Ok(_) => {
                    inner.state.current_step = step;
                    inner.state.active_comment = None;
                    inner.state.connection_lost = false;
                    let floor = inner.state.current_floor.clone();
                    events.push(ViewerEvent::StateChanged(inner.state.clone()));
                    events.push(ViewerEvent::CommentsChanged(
                        inner.comments.step_comments(&floor, step),
                    ));
                    Transition::Applied
                }
                Err(err) => {
                    inner.state.connection_lost = true;
                    events.push(ViewerEvent::StateChanged(inner.state.clone()));
                    events.push(ViewerEvent::ConnectionError(err.clone()));
                    Transition::ConnectionLost(err)
                }
            }
        };

        match &outcome {
            Transition::Applied => {
                info!(step, "step entered");
                self.preloader.preload_window(step, self.config.preload_radius);
            }
            Transition::ConnectionLost(err) => error!(step, %err, "step image failed to load"),
            Transition::Rejected(_) => {}
        }
        self.notify(&events);
        outcome
    }

    async fn enter_floor(
        &self,
        guard: LoadingGuard<'_>,
        floor: FloorConfig,
        preload: Preload,
    ) -> Transition {
        let minimap = self.fetch_minimap(&floor).await;
        let loaded = self.preloader.load(1).await;

        guard.disarm();
        let mut events = Vec::new();
        let outcome = {
            let mut inner = self.inner.lock();
            inner.state.is_loading = false;
            inner.state.enter_floor(&floor);
            inner.state.connection_lost = loaded.is_err();
            events.push(ViewerEvent::StateChanged(inner.state.clone()));
            match &minimap {
                Ok(minimap) => events.push(ViewerEvent::WaypointsReady(minimap.waypoints.clone())),
                Err(reason) => events.push(ViewerEvent::MinimapUnavailable(reason.clone())),
            }
            inner.minimap = minimap.ok();
            events.push(ViewerEvent::CommentsChanged(
                inner.comments.step_comments(&floor.id, 1),
            ));
            match loaded {
                Ok(_) => Transition::Applied,
                Err(err) => {
                    events.push(ViewerEvent::ConnectionError(err.clone()));
                    Transition::ConnectionLost(err)
                }
            }
        };

        match (&outcome, preload) {
            (Transition::Applied, Preload::Window) => {
                self.preloader.preload_window(1, self.config.preload_radius)
            }
            (Transition::Applied, Preload::Startup) => {
                self.preloader.preload_range(2, self.config.startup_preload)
            }
            (Transition::ConnectionLost(err), _) => {
                error!(floor = %floor.id, %err, "first step of floor failed to load")
            }
            _ => {}
        }
        self.notify(&events);
        outcome
    }

    async fn fetch_minimap(&self, floor: &FloorConfig) -> Result<Minimap, String> {
        let parsed = match self.fetcher.fetch_text(&floor.svg_path).await {
            Ok(doc) => parse_minimap(&doc, floor.total_steps).map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        match &parsed {
            Ok(minimap) => debug!(floor = %floor.id, waypoints = minimap.waypoints.len(), "minimap ready"),
            Err(reason) => warn!(floor = %floor.id, %reason, "minimap unavailable"),
        }
        parsed
    }

    fn refuse(&self, rejection: Rejection) -> Rejection {
        debug!(%rejection, "request rejected");
        rejection
    }

    fn rejected(&self, rejection: Rejection) -> Transition {
        Transition::Rejected(self.refuse(rejection))
    }

    fn notify(&self, events: &[ViewerEvent]) {
        for event in events {
            event.dispatch(self.observer.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use catalog::{CommentError, RiskLevel};
    use formats::ViewerConfig;
    use foundation::math::{PIN_RADIUS, Vec2};
    use foundation::{FloorId, Step};
    use pretty_assertions::assert_eq;
    use runtime::ManualSpawner;
    use streaming::testing::MemoryFetcher;
    use tokio::sync::Semaphore;

    use super::{Navigator, Transition, USER_AUTHOR};
    use crate::observer::{RecordingObserver, ViewerEvent};
    use crate::state::Rejection;

    const THIRD_SVG: &str = r#"<svg viewBox="0 0 1000 600"><path d="M10 10 L20 10 H30 L30 40"/></svg>"#;
    const ROOF_SVG: &str = r#"<svg viewBox="0 0 800 400"><path d="M1 1 L2 2"/></svg>"#;

    struct Harness {
        nav: Navigator,
        fetcher: Arc<MemoryFetcher>,
        spawner: Arc<ManualSpawner>,
        observer: Arc<RecordingObserver>,
    }

    fn config() -> ViewerConfig {
        ViewerConfig {
            image_base_url: "img".to_string(),
            ..ViewerConfig::default()
        }
    }

    fn harness_with(fetcher: MemoryFetcher) -> Harness {
        let fetcher = Arc::new(
            fetcher
                .with_asset("./data/paths/Floor_3.svg", THIRD_SVG)
                .with_asset("./data/paths/Roof.svg", ROOF_SVG),
        );
        let spawner = Arc::new(ManualSpawner::new());
        let observer = Arc::new(RecordingObserver::new());
        let nav = Navigator::new(config(), fetcher.clone(), spawner.clone())
            .expect("valid config")
            .with_observer(observer.clone());
        Harness {
            nav,
            fetcher,
            spawner,
            observer,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryFetcher::new())
    }

    fn third_image(step: Step) -> String {
        format!("img/floor-3/step-{step:02}.jpg")
    }

    #[tokio::test]
    async fn start_loads_minimap_first_step_and_startup_range() {
        let h = harness();
        assert_eq!(h.nav.start().await, Transition::Applied);

        let state = h.nav.state();
        assert_eq!(state.current_floor, FloorId::new("3rd"));
        assert_eq!((state.current_step, state.total_steps), (1, 18));
        assert!(!state.is_loading);

        let minimap = h.nav.minimap().expect("minimap");
        assert_eq!(minimap.waypoints.len(), 4);
        assert!(minimap.waypoints[0].active);
        assert_eq!(minimap.view_box.width, 1000.0);

        assert_eq!(h.spawner.run_pending().await, 9);
        assert_eq!(h.nav.preloader().cached_steps(), (1..=10).collect::<Vec<_>>());

        let events = h.observer.events();
        assert!(matches!(events[0], ViewerEvent::StateChanged(ref s) if s.is_loading));
        assert!(events.iter().any(|e| matches!(e, ViewerEvent::WaypointsReady(w) if w.len() == 4)));
        assert!(events.iter().any(
            |e| matches!(e, ViewerEvent::CommentsChanged(c) if c[0].title == "Debris Uncleared")
        ));
    }

    #[tokio::test]
    async fn every_step_in_range_is_reachable() {
        let h = harness();
        for step in 1..=18 {
            assert_eq!(h.nav.go_to_step(step).await, Transition::Applied);
            assert_eq!(h.nav.state().current_step, step);
        }
        for step in [0, 19] {
            assert_eq!(
                h.nav.go_to_step(step).await,
                Transition::Rejected(Rejection::StepOutOfRange {
                    step,
                    total_steps: 18
                })
            );
        }
        assert_eq!(h.nav.state().current_step, 18);
    }

    #[tokio::test]
    async fn step_is_refused_while_loading() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(MemoryFetcher::new().gated(gate.clone()));

        let (first, second) = tokio::join!(h.nav.go_to_step(2), async {
            tokio::task::yield_now().await;
            assert!(h.nav.state().is_loading);
            let refused = h.nav.go_to_step(3).await;
            let floor = h.nav.switch_floor(&FloorId::new("roof")).await;
            assert_eq!(h.fetcher.call_count(&third_image(3)), 0);
            gate.add_permits(1);
            (refused, floor)
        });

        assert_eq!(first, Transition::Applied);
        assert_eq!(second.0, Transition::Rejected(Rejection::Busy));
        assert_eq!(second.1, Transition::Rejected(Rejection::Busy));
        let state = h.nav.state();
        assert_eq!(state.current_step, 2);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn next_and_prev_wrap_around() {
        let h = harness();
        assert!(h.nav.go_to_prev().await.is_applied());
        assert_eq!(h.nav.state().current_step, 18);
        assert!(h.nav.go_to_next().await.is_applied());
        assert_eq!(h.nav.state().current_step, 1);
        assert!(h.nav.go_to_next().await.is_applied());
        assert_eq!(h.nav.state().current_step, 2);

        assert!(h.nav.go_to_last().await.is_applied());
        assert_eq!(h.nav.state().current_step, 18);
        assert!(h.nav.go_to_first().await.is_applied());
        assert_eq!(h.nav.state().current_step, 1);
    }

    #[tokio::test]
    async fn step_success_preloads_window() {
        let h = harness();
        assert!(h.nav.go_to_step(9).await.is_applied());
        assert_eq!(h.spawner.run_pending().await, 10);
        assert_eq!(
            h.nav.preloader().cached_steps(),
            (4..=14).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn failed_image_raises_connection_error_and_retry_recovers() {
        let h = harness();
        // Fail before the switch so the background preload of step 4 fails too.
        h.fetcher.fail("img/roof/step-04.jpg");
        assert!(h.nav.switch_floor(&FloorId::new("roof")).await.is_applied());
        h.observer.take();

        let outcome = h.nav.go_to_step(4).await;
        assert!(matches!(outcome, Transition::ConnectionLost(_)));
        let state = h.nav.state();
        assert_eq!(state.current_step, 1);
        assert!(state.connection_lost);
        assert!(!state.is_loading);
        assert!(
            h.observer
                .events()
                .iter()
                .any(|e| matches!(e, ViewerEvent::ConnectionError(_)))
        );

        h.fetcher.recover("img/roof/step-04.jpg");
        assert!(h.nav.retry().await.is_applied());
        assert!(!h.nav.state().connection_lost);
        assert!(h.nav.go_to_step(4).await.is_applied());
    }

    #[tokio::test]
    async fn floor_switch_resets_step_and_cache() {
        let h = harness();
        assert!(h.nav.start().await.is_applied());
        assert!(h.nav.go_to_step(7).await.is_applied());
        h.spawner.run_pending().await;

        assert!(h.nav.switch_floor(&FloorId::new("roof")).await.is_applied());
        let state = h.nav.state();
        assert_eq!(state.current_floor, FloorId::new("roof"));
        assert_eq!((state.current_step, state.total_steps), (1, 19));
        assert_eq!(state.floor_name, "Roof");
        assert_eq!(h.nav.preloader().cached_steps(), vec![1]);
        assert_eq!(h.nav.minimap().expect("minimap").waypoints.len(), 2);

        assert!(h.nav.go_to_step(7).await.is_applied());
        assert_eq!(h.fetcher.call_count("img/roof/step-07.jpg"), 1);

        assert_eq!(
            h.nav.switch_floor(&FloorId::new("roof")).await,
            Transition::Rejected(Rejection::SameFloor(FloorId::new("roof")))
        );
        assert_eq!(
            h.nav.switch_floor(&FloorId::new("basement")).await,
            Transition::Rejected(Rejection::UnknownFloor(FloorId::new("basement")))
        );
    }

    #[tokio::test]
    async fn floor_switch_without_path_resource_hides_minimap() {
        let h = harness();
        assert!(h.nav.start().await.is_applied());
        h.observer.take();

        assert!(h.nav.switch_floor(&FloorId::new("ground")).await.is_applied());
        assert!(h.nav.minimap().is_none());
        assert_eq!(h.nav.state().current_floor, FloorId::new("ground"));
        assert!(
            h.observer
                .events()
                .iter()
                .any(|e| matches!(e, ViewerEvent::MinimapUnavailable(_)))
        );
    }

    #[tokio::test]
    async fn floor_switch_with_failed_image_lands_on_new_floor() {
        let h = harness();
        h.fetcher.fail("img/roof/step-01.jpg");
        let outcome = h.nav.switch_floor(&FloorId::new("roof")).await;
        assert!(matches!(outcome, Transition::ConnectionLost(_)));

        let state = h.nav.state();
        assert_eq!(state.current_floor, FloorId::new("roof"));
        assert!(state.connection_lost);
        assert!(!state.is_loading);

        h.fetcher.recover("img/roof/step-01.jpg");
        assert!(h.nav.retry().await.is_applied());
    }

    #[tokio::test]
    async fn dropped_transition_clears_loading() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(MemoryFetcher::new().gated(gate.clone()));
        {
            let pending = h.nav.go_to_step(5);
            tokio::pin!(pending);
            assert!(poll_once(pending.as_mut()).await.is_none());
            assert!(h.nav.state().is_loading);
        }
        assert!(!h.nav.state().is_loading);
    }

    #[tokio::test]
    async fn dropped_switch_keeps_floor_images() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(MemoryFetcher::new().gated(gate.clone()));
        let roof = FloorId::new("roof");
        {
            let pending = h.nav.switch_floor(&roof);
            tokio::pin!(pending);
            assert!(poll_once(pending.as_mut()).await.is_none());
            assert!(h.nav.state().is_loading);
        }
        let state = h.nav.state();
        assert!(!state.is_loading);
        assert_eq!(state.current_floor, FloorId::new("3rd"));

        gate.add_permits(64);
        assert!(h.nav.go_to_step(3).await.is_applied());
        assert_eq!(h.fetcher.call_count(&third_image(3)), 1);
        assert_eq!(h.nav.preloader().cached_steps(), vec![3]);
        assert!(h.fetcher.calls().iter().all(|c| !c.starts_with("img/roof/")));

        assert!(h.nav.switch_floor(&roof).await.is_applied());
        assert_eq!(h.nav.state().current_floor, roof);
        assert_eq!(h.fetcher.call_count("img/roof/step-01.jpg"), 1);
    }

    #[tokio::test]
    async fn dropped_start_leaves_floor_unentered() {
        let gate = Arc::new(Semaphore::new(0));
        let h = harness_with(MemoryFetcher::new().gated(gate.clone()));
        {
            let pending = h.nav.start();
            tokio::pin!(pending);
            assert!(poll_once(pending.as_mut()).await.is_none());
            assert!(h.nav.state().is_loading);
        }
        let state = h.nav.state();
        assert!(!state.is_loading);
        assert_eq!((state.current_floor.clone(), state.current_step), (FloorId::new("3rd"), 1));
        assert!(h.nav.minimap().is_none());
        assert_eq!(h.fetcher.call_count(&third_image(1)), 0);

        gate.add_permits(64);
        assert!(h.nav.start().await.is_applied());
        assert_eq!(h.fetcher.call_count(&third_image(1)), 1);
        assert_eq!(h.nav.preloader().cached_steps(), vec![1]);
        assert!(h.nav.minimap().is_some());
    }

    async fn poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            _ = tokio::task::yield_now() => None,
        }
    }

    #[test]
    fn zoom_snaps_and_updates_fov() {
        let h = harness();
        assert!(h.nav.set_zoom(137.0).is_applied());
        assert_eq!(h.nav.state().zoom.percent(), 135);
        assert!(h.nav.set_zoom(1000.0).is_applied());
        let state = h.nav.state();
        assert_eq!(state.zoom.percent(), 150);
        assert!((state.fov_deg - 80.0 * 100.0 / 150.0).abs() < 1e-9);

        assert!(h.nav.zoom_in().is_applied());
        assert_eq!(h.nav.state().zoom.percent(), 150);
        assert!(h.nav.zoom_out().is_applied());
        assert_eq!(h.nav.state().zoom.percent(), 145);
        assert!(h.nav.reset_zoom().is_applied());
        assert_eq!(h.nav.state().fov_deg, 80.0);

        assert_eq!(
            h.nav.set_zoom(f64::INFINITY),
            Transition::Rejected(Rejection::InvalidZoom)
        );
    }

    #[test]
    fn user_comments_follow_builtins_and_notify_current_step() {
        let h = harness();
        let third = FloorId::new("3rd");
        let added = h
            .nav
            .add_comment(
                &third,
                1,
                Vec2::new(1024.0, 900.0),
                "Missing guard rail\nEast edge",
                RiskLevel::High,
            )
            .expect("add");
        assert!(added.is_user);
        assert_eq!(added.title, "Missing guard rail");

        let titles: Vec<_> = h.nav.comments().into_iter().map(|c| c.title).collect();
        assert_eq!(titles, vec!["Debris Uncleared", "Missing guard rail"]);
        assert!(matches!(
            h.observer.events().last(),
            Some(ViewerEvent::CommentsChanged(c)) if c.len() == 2
        ));

        let id = added.id.expect("id");
        assert!(!h.nav.remove_comment(&third, 1, "no-such-id"));
        assert!(h.nav.remove_comment(&third, 1, &id));
        assert_eq!(h.nav.comments().len(), 1);
    }

    #[test]
    fn comment_requests_are_validated() {
        let h = harness();
        let third = FloorId::new("3rd");
        let pixel = Vec2::new(10.0, 10.0);
        assert_eq!(
            h.nav.add_comment(&third, 19, pixel, "x", RiskLevel::Info),
            Err(Rejection::StepOutOfRange {
                step: 19,
                total_steps: 18
            })
        );
        assert_eq!(
            h.nav
                .add_comment(&third, 1, Vec2::new(5000.0, 10.0), "x", RiskLevel::Info),
            Err(Rejection::Comment(CommentError::InvalidPosition))
        );
        assert_eq!(
            h.nav.add_comment(&third, 1, pixel, "  ", RiskLevel::Info),
            Err(Rejection::Comment(CommentError::EmptyText))
        );
        assert_eq!(
            h.nav
                .add_comment(&FloorId::new("attic"), 1, pixel, "x", RiskLevel::Info),
            Err(Rejection::UnknownFloor(FloorId::new("attic")))
        );
    }

    #[test]
    fn comment_from_hit_point_lands_on_mapped_pixel() {
        let h = harness();
        let frame = h.nav.frame();
        let hit = frame.to_direction(Vec2::new(2048.0, 1024.0), PIN_RADIUS);
        let added = h
            .nav
            .add_comment_at_hit(hit, "Centre", RiskLevel::Medium)
            .expect("add");
        assert!((added.x - 2048.0).abs() < 1e-6);
        assert!((added.y - 1024.0).abs() < 1e-6);

        let look = h.nav.look_at(&added);
        assert!(look.yaw_deg.abs() < 1e-9 && look.pitch_deg.abs() < 1e-9);
    }

    #[test]
    fn debris_thread_round_trip() {
        let h = harness();
        let debris = h.nav.comments().remove(0);
        let key = h.nav.open_comment(&debris);
        assert_eq!(h.nav.state().active_comment, Some(key.clone()));
        assert_eq!(h.nav.thread(&key).expect("thread").len(), 1);

        assert!(h.nav.reply(&key, "checked, resolved"));
        assert!(!h.nav.reply(&key, "   "));
        let thread = h.nav.thread(&key).expect("thread");
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].author, USER_AUTHOR);
        assert_eq!(thread[1].text, "checked, resolved");

        assert_eq!(h.nav.open_comment(&debris), key);
        h.nav.close_comment();
        assert_eq!(h.nav.state().active_comment, None);
    }

    #[tokio::test]
    async fn resolved_comments_are_fetched_and_parsed() {
        let h = harness();
        h.fetcher.insert(
            "./data/resolved.json",
            r#"[{"title":"Scaffold","description":"Tagged","riskLevel":"info","location":"Roof"}]"#,
        );
        let resolved = h
            .nav
            .load_resolved_comments("./data/resolved.json")
            .await
            .expect("resolved");
        assert_eq!(resolved[0].risk_level, RiskLevel::Info);

        h.fetcher.insert("./data/broken.json", "{");
        assert!(h.nav.load_resolved_comments("./data/broken.json").await.is_err());
    }
}
