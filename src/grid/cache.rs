use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GridError;

use super::generator::{BeatGrid, GridConfig, generate};
use super::{GridMap, TrackId};

// One generated grid per track, rebuilt when the map version, the duration
// or the config it was built with changes.
struct Entry {
    version: u64,
    duration: f64,
    config: GridConfig,
    grid: Arc<BeatGrid>,
}

#[derive(Default)]
pub struct BeatGridCache {
    entries: HashMap<TrackId, Entry>,
}

impl BeatGridCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_generate(
        &mut self,
        track: &TrackId,
        map: &GridMap,
        duration: f64,
        config: &GridConfig,
    ) -> Result<Arc<BeatGrid>, GridError> {
        if let Some(e) = self.entries.get(track) {
            if e.version == map.version() && e.duration == duration && e.config == *config {
                return Ok(Arc::clone(&e.grid));
            }
        }
        let grid = Arc::new(generate(map, duration, config)?);
        self.entries.insert(
            track.clone(),
            Entry { version: map.version(), duration, config: *config, grid: Arc::clone(&grid) },
        );
        log::debug!(target: "grid", "cached grid for {track} (v{}), {} tracks cached", map.version(), self.len());
        Ok(grid)
    }

    pub fn invalidate(&mut self, track: &TrackId) {
        self.entries.remove(track);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Analysis;

    fn track() -> TrackId {
        TrackId("song".into())
    }

    fn map() -> GridMap {
        GridMap::new(
            120.0,
            0.0,
            Analysis::Analyzed { downbeats: vec![0.0, 2.0, 4.0], bridges: vec![], duration: Some(8.0) },
        )
    }

    #[test]
    fn reuses_grid_for_same_version() {
        let mut cache = BeatGridCache::new();
        let map = map();
        let a = cache.get_or_generate(&track(), &map, 8.0, &GridConfig::default()).unwrap();
        let b = cache.get_or_generate(&track(), &map, 8.0, &GridConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn admin_edit_triggers_regeneration() {
        let mut cache = BeatGridCache::new();
        let mut map = map();
        let a = cache.get_or_generate(&track(), &map, 8.0, &GridConfig::default()).unwrap();
        assert!(a.beats().iter().all(|b| !b.is_bridge));

        map.replace_bridges(vec![1.0]).unwrap();
        let b = cache.get_or_generate(&track(), &map, 8.0, &GridConfig::default()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(b.beats().iter().any(|x| x.is_bridge));
        assert_eq!(b.source_version(), map.version());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = BeatGridCache::new();
        assert!(cache.get_or_generate(&track(), &map(), 0.0, &GridConfig::default()).is_err());
        assert_eq!(cache.len(), 0);
    }
}
