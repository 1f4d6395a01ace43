//! Bounded cache of synthesized frames keyed by exposure fingerprint.

use std::sync::Arc;

use ordered_float::OrderedFloat;
use quick_cache::sync::Cache;

use alpaca_sim_core::PixelGrid;

use super::synthesis::SynthesisRequest;

/// Cache key: every input that changes the synthesized frame.
///
/// Floats are wrapped in [`OrderedFloat`] so the key is `Eq + Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    right_ascension: OrderedFloat<f64>,
    declination: OrderedFloat<f64>,
    duration: OrderedFloat<f64>,
    light: bool,
    focus: i64,
    sunlit: bool,
    width: u32,
    height: u32,
    bin_x: u32,
    bin_y: u32,
}

impl Fingerprint {
    #[must_use]
    pub fn new(request: &SynthesisRequest, focus: i64, sunlit: bool) -> Self {
        Self {
            right_ascension: OrderedFloat(request.pointing.right_ascension),
            declination: OrderedFloat(request.pointing.declination),
            duration: OrderedFloat(request.duration),
            light: request.light,
            focus,
            sunlit,
            width: request.geometry.width,
            height: request.geometry.height,
            bin_x: request.geometry.bin_x,
            bin_y: request.geometry.bin_y,
        }
    }
}

/// Shared, size-bounded frame cache. Oldest or least-used frames are evicted first.
pub struct ImageCache {
    inner: Cache<Fingerprint, Arc<PixelGrid>>,
    capacity: usize,
}

impl ImageCache {
    /// Capacity is clamped to at least one frame.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Cache::new(capacity),
            capacity,
        }
    }

    /// Maximum number of frames held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<PixelGrid>> {
        self.inner.get(key)
    }

    /// Stores `grid` unless a frame with the same fingerprint is already cached,
    /// and returns the cached frame.
    pub fn insert(&self, key: Fingerprint, grid: Arc<PixelGrid>) -> Arc<PixelGrid> {
        if let Some(existing) = self.inner.get(&key) {
            return existing;
        }
        self.inner.insert(key, Arc::clone(&grid));
        grid
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::synthesis::tests::request;

    #[test]
    fn identical_requests_share_a_fingerprint() {
        let a = Fingerprint::new(&request(10, 10), 100, false);
        let b = Fingerprint::new(&request(10, 10), 100, false);
        assert_eq!(a, b);
    }

    #[test]
    fn geometry_and_focus_change_the_fingerprint() {
        let base = Fingerprint::new(&request(10, 10), 100, false);
        assert_ne!(base, Fingerprint::new(&request(10, 12), 100, false));
        assert_ne!(base, Fingerprint::new(&request(10, 10), 101, false));
        assert_ne!(base, Fingerprint::new(&request(10, 10), 100, true));

        let mut binned = request(10, 10);
        binned.geometry.bin_x = 2;
        assert_ne!(base, Fingerprint::new(&binned, 100, false));
    }

    #[test]
    fn insert_keeps_first_frame() {
        let cache = ImageCache::new(4);
        let key = Fingerprint::new(&request(2, 2), 0, false);
        let first = Arc::new(PixelGrid::filled(2, 2, 1));
        let second = Arc::new(PixelGrid::filled(2, 2, 2));

        let stored = cache.insert(key, Arc::clone(&first));
        assert!(Arc::ptr_eq(&stored, &first));
        let stored = cache.insert(key, second);
        assert!(Arc::ptr_eq(&stored, &first));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_is_usable() {
        let cache = ImageCache::new(0);
        let key = Fingerprint::new(&request(2, 2), 0, false);
        let grid = Arc::new(PixelGrid::filled(2, 2, 7));
        assert_eq!(cache.capacity(), 1);
        assert!(cache.is_empty());
        assert!(Arc::ptr_eq(&cache.insert(key, Arc::clone(&grid)), &grid));
        assert!(cache.len() <= 1);
    }
}
