// GridMap: the per-track rhythm analysis we get from the analysis step,
// plus the two admin edits (offset correction, bridge replacement).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::GridError;

pub mod cache;
pub mod generator;

pub use cache::BeatGridCache;
pub use generator::{Beat, BeatGrid, GridConfig, generate};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

// every GridMap state gets a process-unique version, so the grid cache can
// key on it without caring which track or reload it came from
fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub String);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the analysis step managed to find. `Unanalyzed` means only bpm and
/// offset are known and the generator has to lay a linear grid.
#[derive(Clone, Debug, PartialEq)]
pub enum Analysis {
    Analyzed {
        downbeats: Vec<f64>,
        bridges: Vec<f64>,
        duration: Option<f64>,
    },
    Unanalyzed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridMapJson", into = "GridMapJson")]
pub struct GridMap {
    pub bpm: f64,
    pub offset: f64,
    pub analysis: Analysis,
    version: u64,
}

impl GridMap {
    pub fn new(bpm: f64, offset: f64, analysis: Analysis) -> Self {
        Self { bpm, offset, analysis, version: next_version() }
    }

    pub fn unanalyzed(bpm: f64, offset: f64) -> Self {
        Self::new(bpm, offset, Analysis::Unanalyzed)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn downbeats(&self) -> &[f64] {
        match &self.analysis {
            Analysis::Analyzed { downbeats, .. } => downbeats,
            Analysis::Unanalyzed => &[],
        }
    }

    pub fn bridges(&self) -> &[f64] {
        match &self.analysis {
            Analysis::Analyzed { bridges, .. } => bridges,
            Analysis::Unanalyzed => &[],
        }
    }

    pub fn duration(&self) -> Option<f64> {
        match &self.analysis {
            Analysis::Analyzed { duration, .. } => *duration,
            Analysis::Unanalyzed => None,
        }
    }

    /// Overwrite the bridge list. Entries are sorted and deduplicated; any
    /// negative or non-finite entry rejects the whole list.
    pub fn replace_bridges(&mut self, new_bridges: Vec<f64>) -> Result<(), GridError> {
        let sorted = sanitize_bridges(new_bridges)?;
        match &mut self.analysis {
            Analysis::Analyzed { bridges, .. } => *bridges = sorted,
            Analysis::Unanalyzed => {
                self.analysis = Analysis::Analyzed {
                    downbeats: Vec::new(),
                    bridges: sorted,
                    duration: None,
                };
            }
        }
        self.version = next_version();
        log::info!(target: "grid", "bridges replaced ({} entries)", self.bridges().len());
        Ok(())
    }

    /// Same as `replace_bridges`, for payloads that arrive as raw JSON.
    pub fn replace_bridges_json(&mut self, payload: &serde_json::Value) -> Result<(), GridError> {
        let items = payload
            .as_array()
            .ok_or_else(|| GridError::MalformedPayload("bridges must be an array".into()))?;
        let mut values = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let v = item.as_f64().ok_or_else(|| {
                GridError::InvalidBridges(format!("entry {i} is not a number: {item}"))
            })?;
            values.push(v);
        }
        self.replace_bridges(values)
    }

    /// Move the first strong beat to `new_offset`. Every downbeat shifts by
    /// the same delta; the ones that would land before 0 are dropped.
    pub fn set_offset(&mut self, new_offset: f64) -> Result<(), GridError> {
        if !new_offset.is_finite() || new_offset < 0.0 {
            return Err(GridError::InvalidOffset(new_offset));
        }
        let delta = new_offset - self.offset;
        if let Analysis::Analyzed { downbeats, .. } = &mut self.analysis {
            let before = downbeats.len();
            *downbeats = downbeats
                .iter()
                .map(|t| t + delta)
                .filter(|t| *t >= 0.0)
                .collect();
            let dropped = before - downbeats.len();
            if dropped > 0 {
                log::debug!(target: "grid", "offset shift dropped {dropped} downbeats");
            }
        }
        self.offset = new_offset;
        self.version = next_version();
        log::info!(target: "grid", "offset set to {new_offset:.3}s (delta {delta:+.3}s)");
        Ok(())
    }
}

fn sanitize_bridges(mut values: Vec<f64>) -> Result<Vec<f64>, GridError> {
    if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(GridError::InvalidBridges(format!("{bad} is not a non-negative number")));
    }
    values.sort_by(f64::total_cmp);
    values.dedup();
    Ok(values)
}

fn is_strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

// On-disk shape written by the analysis step. Anything else in the file
// (debug dumps, section lists) is ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct GridMapJson {
    bpm: f64,
    #[serde(default)]
    offset: f64,
    // kept loose: a downbeat list we can't read falls back to a linear grid
    // instead of failing the whole file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    downbeats: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bridges: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
}

impl TryFrom<GridMapJson> for GridMap {
    type Error = GridError;

    fn try_from(raw: GridMapJson) -> Result<Self, Self::Error> {
        if !raw.bpm.is_finite() || raw.bpm <= 0.0 {
            return Err(GridError::InvalidBpm(raw.bpm));
        }
        if !raw.offset.is_finite() || raw.offset < 0.0 {
            return Err(GridError::InvalidOffset(raw.offset));
        }
        if raw.downbeats.is_none() && raw.bridges.is_none() && raw.duration.is_none() {
            return Ok(GridMap::unanalyzed(raw.bpm, raw.offset));
        }

        // bad downbeats are not fatal, the generator just goes linear
        let downbeats = match raw.downbeats.map(serde_json::from_value::<Vec<f64>>) {
            Some(Ok(d)) if d.iter().all(|t| t.is_finite() && *t >= 0.0) && is_strictly_increasing(&d) => d,
            Some(_) => {
                log::warn!(target: "grid", "ignoring malformed downbeats");
                Vec::new()
            }
            None => Vec::new(),
        };
        let bridges = sanitize_bridges(raw.bridges.unwrap_or_default())?;
        let duration = match raw.duration {
            Some(d) if d.is_finite() && d > 0.0 => Some(d),
            Some(d) => return Err(GridError::InvalidDuration(d)),
            None => None,
        };

        Ok(GridMap::new(
            raw.bpm,
            raw.offset,
            Analysis::Analyzed { downbeats, bridges, duration },
        ))
    }
}

impl From<GridMap> for GridMapJson {
    fn from(map: GridMap) -> Self {
        match map.analysis {
            Analysis::Analyzed { downbeats, bridges, duration } => GridMapJson {
                bpm: map.bpm,
                offset: map.offset,
                downbeats: Some(serde_json::Value::from(downbeats)),
                bridges: Some(bridges),
                duration,
            },
            Analysis::Unanalyzed => GridMapJson {
                bpm: map.bpm,
                offset: map.offset,
                downbeats: None,
                bridges: None,
                duration: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn analyzed(downbeats: Vec<f64>, bridges: Vec<f64>) -> GridMap {
        GridMap::new(
            120.0,
            downbeats.first().copied().unwrap_or(0.0),
            Analysis::Analyzed { downbeats, bridges, duration: Some(30.0) },
        )
    }

    #[test]
    fn parses_full_analysis_json() {
        let map: GridMap = serde_json::from_value(json!({
            "bpm": 128.0,
            "offset": 0.2,
            "downbeats": [0.2, 0.7, 1.2],
            "bridges": [10.0],
            "duration": 5.0,
            "totalBeats": 99
        }))
        .unwrap();
        assert_eq!(map.downbeats(), &[0.2, 0.7, 1.2]);
        assert_eq!(map.bridges(), &[10.0]);
        assert_eq!(map.duration(), Some(5.0));
    }

    #[test]
    fn bare_bpm_and_offset_is_unanalyzed() {
        let map: GridMap = serde_json::from_value(json!({ "bpm": 120, "offset": 0 })).unwrap();
        assert_eq!(map.analysis, Analysis::Unanalyzed);
    }

    #[test]
    fn unsorted_downbeats_fall_back_instead_of_failing() {
        let map: GridMap =
            serde_json::from_value(json!({ "bpm": 120, "offset": 0, "downbeats": [1.0, 0.5] })).unwrap();
        assert!(map.downbeats().is_empty());
    }

    #[test]
    fn non_numeric_downbeats_fall_back_instead_of_failing() {
        let map: GridMap =
            serde_json::from_value(json!({ "bpm": 120, "offset": 0, "downbeats": ["x", 1] })).unwrap();
        assert!(matches!(map.analysis, Analysis::Analyzed { .. }));
        assert!(map.downbeats().is_empty());
    }

    #[test]
    fn rejects_non_positive_bpm() {
        let res: Result<GridMap, _> = serde_json::from_value(json!({ "bpm": 0, "offset": 0 }));
        assert!(res.is_err());
    }

    #[test]
    fn replace_bridges_sorts_and_bumps_version() {
        let mut map = analyzed(vec![0.0, 2.0], vec![]);
        let v = map.version();
        map.replace_bridges(vec![8.0, 4.0, 4.0]).unwrap();
        assert_eq!(map.bridges(), &[4.0, 8.0]);
        assert!(map.version() > v);
    }

    #[test]
    fn replace_bridges_rejects_negative_and_keeps_old_list() {
        let mut map = analyzed(vec![0.0, 2.0], vec![3.0]);
        let v = map.version();
        let err = map.replace_bridges(vec![1.0, -2.0]).unwrap_err();
        assert!(matches!(err, GridError::InvalidBridges(_)));
        assert_eq!(map.bridges(), &[3.0]);
        assert_eq!(map.version(), v);
    }

    #[test]
    fn replace_bridges_json_rejects_non_arrays_and_strings() {
        let mut map = analyzed(vec![0.0, 2.0], vec![3.0]);
        assert!(matches!(
            map.replace_bridges_json(&json!({ "a": 1 })),
            Err(GridError::MalformedPayload(_))
        ));
        assert!(matches!(
            map.replace_bridges_json(&json!([1.0, "two"])),
            Err(GridError::InvalidBridges(_))
        ));
        assert_eq!(map.bridges(), &[3.0]);

        map.replace_bridges_json(&json!([6, 2.5])).unwrap();
        assert_eq!(map.bridges(), &[2.5, 6.0]);
    }

    #[test]
    fn set_offset_shifts_and_drops_negative_downbeats() {
        let mut map = analyzed(vec![0.5, 1.0, 1.5, 2.0], vec![]);
        map.set_offset(0.0).unwrap(); // delta -0.5
        assert_eq!(map.downbeats(), &[0.0, 0.5, 1.0, 1.5]);

        let mut map = analyzed(vec![0.5, 1.0, 1.5], vec![]);
        map.offset = 1.0;
        map.set_offset(0.2).unwrap(); // delta -0.8 drops 0.5
        assert_eq!(map.downbeats().len(), 2);
        assert_relative_eq!(map.downbeats()[0], 0.2, epsilon = 1e-9);
    }

    #[test]
    fn offset_shift_round_trip_restores_surviving_downbeats() {
        let original = vec![0.3, 0.8, 1.3, 1.8, 2.3];
        let mut map = analyzed(original.clone(), vec![]);
        map.offset = 0.3;
        map.set_offset(0.0).unwrap(); // delta -0.3, nothing goes negative
        map.set_offset(0.3).unwrap();
        assert_eq!(map.downbeats().len(), original.len());
        for (a, b) in map.downbeats().iter().zip(&original) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }

        // forward shift that loses an entry; the rest come back
        let mut map = analyzed(original.clone(), vec![]);
        map.offset = 0.8;
        map.set_offset(0.0).unwrap(); // delta -0.8 drops 0.3
        map.set_offset(0.8).unwrap();
        assert_eq!(map.downbeats().len(), original.len() - 1);
        for (a, b) in map.downbeats().iter().zip(&original[1..]) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn set_offset_rejects_negative() {
        let mut map = analyzed(vec![0.5, 1.0], vec![]);
        assert_eq!(map.set_offset(-1.0), Err(GridError::InvalidOffset(-1.0)));
        assert_eq!(map.downbeats(), &[0.5, 1.0]);
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let map = analyzed(vec![0.0, 0.5], vec![4.0]);
        let value = serde_json::to_value(&map).unwrap();
        assert_eq!(value["downbeats"], json!([0.0, 0.5]));
        assert_eq!(value["bridges"], json!([4.0]));
        assert!(value.get("version").is_none());
    }
}
