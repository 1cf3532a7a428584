use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use foundation::Step;
use futures_util::FutureExt;
use futures_util::future::{self, Shared};
use parking_lot::Mutex;
use runtime::{BoxFuture, Spawn, detach};
use tracing::{debug, warn};

use crate::cache::{ImageCache, ImageHandle};
use crate::fetch::{AssetFetcher, FetchError};
use crate::request::ImageSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLoadError {
    /// No floor image set has been selected yet.
    NoImageSet,
    OutOfRange { step: Step, total_steps: Step },
    Fetch { step: Step, source: FetchError },
}

impl fmt::Display for ImageLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageLoadError::NoImageSet => write!(f, "no image set selected"),
            ImageLoadError::OutOfRange { step, total_steps } => {
                write!(f, "step {step} outside 1..={total_steps}")
            }
            ImageLoadError::Fetch { step, source } => {
                write!(f, "failed to load image for step {step}: {source}")
            }
        }
    }
}

impl std::error::Error for ImageLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageLoadError::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Counters describing how requests were served.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PreloadStats {
    /// Fetches actually issued to the fetcher.
    pub fetches: u64,
    pub cache_hits: u64,
    /// Requests that joined a fetch already in flight.
    pub joined: u64,
    pub failures: u64,
    /// Fetches that completed after a reset and were dropped.
    pub stale_discarded: u64,
}

type LoadFuture = Shared<BoxFuture<'static, Result<ImageHandle, ImageLoadError>>>;

#[derive(Default)]
struct State {
    set: Option<ImageSet>,
    cache: ImageCache,
    in_flight: BTreeMap<Step, LoadFuture>,
    stats: PreloadStats,
}

/// Step image loader with a per-floor cache and in-flight de-duplication.
///
/// Two call contracts:
/// - [`Preloader::load`] is awaited and surfaces failure to the caller.
/// - [`Preloader::preload_detached`] hands the fetch to the spawner; its
///   failure is logged and otherwise ignored.
///
/// Both share the same in-flight table, so a step is never fetched twice
/// concurrently no matter which contract asked first.
#[derive(Clone)]
pub struct Preloader {
    fetcher: Arc<dyn AssetFetcher>,
    spawner: Arc<dyn Spawn>,
    state: Arc<Mutex<State>>,
}

impl Preloader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, spawner: Arc<dyn Spawn>) -> Self {
        Self {
            fetcher,
            spawner,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Switches to a new image set, dropping every cached and in-flight entry.
    ///
    /// Fetches still running for the previous set complete harmlessly: their
    /// results belong to a discarded epoch and are not stored.
    pub fn reset(&self, set: ImageSet) -> Vec<Step> {
        let mut state = self.state.lock();
        debug!(floor = %set.floor, "image cache reset");
        state.set = Some(set);
        state.in_flight.clear();
        state.cache.clear()
    }

    pub fn is_cached(&self, step: Step) -> bool {
        self.state.lock().cache.contains(step)
    }

    pub fn is_in_flight(&self, step: Step) -> bool {
        self.state.lock().in_flight.contains_key(&step)
    }

    pub fn cached_steps(&self) -> Vec<Step> {
        self.state.lock().cache.resident_steps()
    }

    pub fn stats(&self) -> PreloadStats {
        self.state.lock().stats
    }

    /// Loads `step`, returning the cached handle when present.
    pub async fn load(&self, step: Step) -> Result<ImageHandle, ImageLoadError> {
        let pending = self.request(step)?;
        pending.await
    }

    /// Starts fetching `step` in the background unless it is already cached
    /// or in flight.
    ///
    /// If the spawned task is dropped without finishing and nobody else
    /// awaits the fetch, the step is released so a later preload issues it
    /// again.
    pub fn preload_detached(&self, step: Step) {
        let epoch = {
            let state = self.state.lock();
            if state.cache.contains(step) || state.in_flight.contains_key(&step) {
                return;
            }
            state.cache.epoch()
        };
        match self.request(step) {
            Ok(pending) => {
                let task = DetachedLoad {
                    pending: Some(pending),
                    state: Arc::clone(&self.state),
                    step,
                    epoch,
                };
                self.spawner.spawn_detached(detach("preload", task));
            }
            Err(err) => debug!(step, %err, "preload skipped"),
        }
    }

    /// Background-preloads up to `radius` steps after `center`, then up to
    /// `radius` steps before it, clipped to the image set.
    pub fn preload_window(&self, center: Step, radius: u32) {
        for step in window(center, radius, self.total_steps()) {
            self.preload_detached(step);
        }
    }

    /// Background-preloads `first..=last`, clipped to the image set.
    pub fn preload_range(&self, first: Step, last: Step) {
        let total = self.total_steps();
        for step in first.max(1)..=last.min(total) {
            self.preload_detached(step);
        }
    }

    fn total_steps(&self) -> Step {
        self.state
            .lock()
            .set
            .as_ref()
            .map(|s| s.total_steps)
            .unwrap_or(0)
    }

    /// Synchronous phase of a load: answers from the cache, joins an
    /// in-flight fetch, or issues a new one.
    fn request(&self, step: Step) -> Result<LoadFuture, ImageLoadError> {
        let mut state = self.state.lock();
        let set = state.set.as_ref().ok_or(ImageLoadError::NoImageSet)?;
        if !set.contains(step) {
            return Err(ImageLoadError::OutOfRange {
                step,
                total_steps: set.total_steps,
            });
        }
        let url = set.url(step);

        if let Some(handle) = state.cache.get(step) {
            state.stats.cache_hits += 1;
            debug!(step, "image cache hit");
            let ready: BoxFuture<'static, _> = Box::pin(future::ready(Ok(handle)));
            return Ok(ready.shared());
        }
        if let Some(pending) = state.in_flight.get(&step) {
            let pending = pending.clone();
            state.stats.joined += 1;
            return Ok(pending);
        }

        let epoch = state.cache.epoch();
        state.cache.mark_downloading(step);
        state.stats.fetches += 1;

        let fetch = self.fetcher.fetch(&url);
        let shared_state = Arc::clone(&self.state);
        let task: BoxFuture<'static, _> = Box::pin(async move {
            let result = fetch.await;
            let mut state = shared_state.lock();
            let current = state.cache.epoch() == epoch;
            if current {
                state.in_flight.remove(&step);
            }
            match result {
                Ok(bytes) => {
                    let handle = ImageHandle { step, url, bytes };
                    if current {
                        state.cache.mark_resident(handle.clone());
                    } else {
                        state.stats.stale_discarded += 1;
                    }
                    Ok(handle)
                }
                Err(source) => {
                    if current {
                        state.cache.mark_failed(step);
                    }
                    state.stats.failures += 1;
                    warn!(step, %source, "image fetch failed");
                    Err(ImageLoadError::Fetch { step, source })
                }
            }
        });
        let pending = task.shared();
        state.in_flight.insert(step, pending.clone());
        Ok(pending)
    }
}

/// Spawned half of a detached preload.
struct DetachedLoad {
    pending: Option<LoadFuture>,
    state: Arc<Mutex<State>>,
    step: Step,
    epoch: u64,
}

impl Future for DetachedLoad {
    type Output = Result<ImageHandle, ImageLoadError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(pending) = self.pending.as_mut() else {
            return Poll::Pending;
        };
        let out = ready!(pending.poll_unpin(cx));
        self.pending = None;
        Poll::Ready(out)
    }
}

impl Drop for DetachedLoad {
    fn drop(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let mut state = self.state.lock();
        // Only this task and the in-flight table hold the fetch.
        let unclaimed = state.cache.epoch() == self.epoch
            && state
                .in_flight
                .get(&self.step)
                .is_some_and(|entry| entry.ptr_eq(&pending) && entry.strong_count() == Some(2));
        if unclaimed {
            state.in_flight.remove(&self.step);
            state.cache.abandon(self.step);
            debug!(step = self.step, "abandoned preload released");
        }
        drop(state);
        drop(pending);
    }
}

/// Steps `center+1..=center+radius` then `center-1` down to
/// `center-radius`, clipped to `1..=total`.
pub fn window(center: Step, radius: u32, total: Step) -> Vec<Step> {
    let ahead = (1..=radius)
        .filter_map(|d| center.checked_add(d))
        .filter(|s| *s <= total);
    let behind = (1..=radius)
        .filter_map(|d| center.checked_sub(d))
        .filter(|s| *s >= 1);
    ahead.chain(behind).collect()
}
