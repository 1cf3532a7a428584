use std::collections::BTreeMap;

use bytes::Bytes;
use foundation::Step;

use crate::residency::ResidencyState;

/// A loaded step image.
///
/// `bytes` is reference counted, so handles are cheap to clone and share
/// between the cache and every waiter of the same fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub step: Step,
    pub url: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    residency: ResidencyState,
    handle: Option<ImageHandle>,
}

/// Step-keyed image cache for the image set of a single floor.
///
/// Notes:
/// - Entries are keyed in a `BTreeMap` for stable traversal order.
/// - There is no byte budget; the cache only ever shrinks through
///   [`ImageCache::clear`], which also bumps the epoch so results of fetches
///   issued before the clear can be recognised as stale.
#[derive(Debug, Default)]
pub struct ImageCache {
    epoch: u64,
    entries: BTreeMap<Step, CacheEntry>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn state(&self, step: Step) -> Option<ResidencyState> {
        self.entries.get(&step).map(|e| e.residency)
    }

    pub fn contains(&self, step: Step) -> bool {
        self.state(step) == Some(ResidencyState::Resident)
    }

    /// Resident steps in ascending order.
    pub fn resident_steps(&self) -> Vec<Step> {
        self.entries
            .iter()
            .filter(|(_, e)| e.residency == ResidencyState::Resident)
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn get(&self, step: Step) -> Option<ImageHandle> {
        let entry = self.entries.get(&step)?;
        if entry.residency != ResidencyState::Resident {
            return None;
        }
        entry.handle.clone()
    }

    pub fn mark_downloading(&mut self, step: Step) {
        self.entries.insert(
            step,
            CacheEntry {
                residency: ResidencyState::Downloading,
                handle: None,
            },
        );
    }

    pub fn mark_resident(&mut self, handle: ImageHandle) {
        self.entries.insert(
            handle.step,
            CacheEntry {
                residency: ResidencyState::Resident,
                handle: Some(handle),
            },
        );
    }

    pub fn mark_failed(&mut self, step: Step) {
        if let Some(entry) = self.entries.get_mut(&step) {
            entry.handle = None;
            entry.residency = ResidencyState::Failed;
        }
    }

    /// Forgets a download that was abandoned before it finished. Resident
    /// and failed entries are left alone.
    pub fn abandon(&mut self, step: Step) {
        if self.state(step) == Some(ResidencyState::Downloading) {
            self.entries.remove(&step);
        }
    }

    /// Drops every entry and starts a new epoch. Returns the evicted
    /// resident steps in ascending order.
    pub fn clear(&mut self) -> Vec<Step> {
        let evicted = self.resident_steps();
        self.entries.clear();
        self.epoch += 1;
        evicted
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    use super::{ImageCache, ImageHandle};
    use crate::residency::ResidencyState;

    fn handle(step: u32) -> ImageHandle {
        ImageHandle {
            step,
            url: format!("img/step-{step:02}.jpg"),
            bytes: Bytes::from_static(b"jpeg"),
        }
    }

    #[test]
    fn lifecycle_tracks_residency() {
        let mut cache = ImageCache::new();
        cache.mark_downloading(3);
        assert_eq!(cache.state(3), Some(ResidencyState::Downloading));
        assert!(cache.get(3).is_none());

        cache.mark_resident(handle(3));
        assert_eq!(cache.state(3), Some(ResidencyState::Resident));
        assert_eq!(cache.get(3).map(|h| h.step), Some(3));
    }

    #[test]
    fn failure_drops_handle() {
        let mut cache = ImageCache::new();
        cache.mark_resident(handle(1));
        cache.mark_failed(1);
        assert_eq!(cache.state(1), Some(ResidencyState::Failed));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn abandon_only_forgets_downloads() {
        let mut cache = ImageCache::new();
        cache.mark_downloading(1);
        cache.mark_resident(handle(2));
        cache.mark_downloading(3);
        cache.mark_failed(3);

        cache.abandon(1);
        cache.abandon(2);
        cache.abandon(3);
        assert_eq!(cache.state(1), None);
        assert_eq!(cache.state(2), Some(ResidencyState::Resident));
        assert_eq!(cache.state(3), Some(ResidencyState::Failed));
    }

    #[test]
    fn clear_empties_and_bumps_epoch() {
        let mut cache = ImageCache::new();
        cache.mark_resident(handle(2));
        cache.mark_resident(handle(1));
        cache.mark_downloading(5);

        let before = cache.epoch();
        assert_eq!(cache.clear(), vec![1, 2]);
        assert_eq!(cache.state(5), None);
        assert!(cache.resident_steps().is_empty());
        assert_eq!(cache.epoch(), before + 1);
    }
}
