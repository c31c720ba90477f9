//! World map accumulator.
//!
//! A square grid of per-cell hit counters, one layer each for obstacles,
//! samples and navigable terrain.  Counters only ever grow: they are a
//! confidence tally, not a probability, and a cell seen as both obstacle and
//! ground over time stays distinguishable by the relative size of its
//! counters.  Rendering them into something prettier is the viewer's job.
//!
//! Updates are gated by a [`StabilityGate`]: while the rover is pitched or
//! rolled the flat-ground assumption behind the perspective warp breaks down,
//! so the whole frame is discarded.
//!
//! # Example
//!
//! ```rust
//! use rockhound_perception::transform::GridCell;
//! use rockhound_perception::world_map::{Layer, Observation, StabilityGate, WorldMap};
//!
//! let mut map = WorldMap::new(200);
//! let gate = StabilityGate::default();
//!
//! let cell = GridCell { x: 10, y: 20 };
//! let obs = Observation { navigable: vec![cell], obstacles: vec![], samples: vec![] };
//!
//! assert!(map.integrate(&obs, gate.is_stable(0.1, 359.9)));
//! assert_eq!(map.get(cell, Layer::Navigable), 10);
//! ```

use serde::{Deserialize, Serialize};

use crate::transform::GridCell;

/// Counter added to a navigable cell per stable frame.
pub const NAVIGABLE_WEIGHT: u8 = 10;
/// Counter added to an obstacle cell per stable frame.
pub const OBSTACLE_WEIGHT: u8 = 1;
/// Counter added to a sample cell per stable frame.
pub const SAMPLE_WEIGHT: u8 = 1;

/// Map layer, matching the channel order of the debug rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Obstacle = 0,
    Sample = 1,
    Navigable = 2,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Obstacle, Layer::Sample, Layer::Navigable];

    fn weight(self) -> u8 {
        match self {
            Layer::Obstacle => OBSTACLE_WEIGHT,
            Layer::Sample => SAMPLE_WEIGHT,
            Layer::Navigable => NAVIGABLE_WEIGHT,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stability gate
// ────────────────────────────────────────────────────────────────────────────

/// Pitch/roll tolerance check deciding whether a frame may update the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityGate {
    /// Maximum pitch deviation from level, degrees.
    #[serde(default = "default_pitch_tolerance")]
    pub pitch_tolerance: f64,
    /// Maximum roll deviation from level, degrees.
    #[serde(default = "default_roll_tolerance")]
    pub roll_tolerance: f64,
}

fn default_pitch_tolerance() -> f64 {
    0.25
}
fn default_roll_tolerance() -> f64 {
    0.5
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self {
            pitch_tolerance: default_pitch_tolerance(),
            roll_tolerance: default_roll_tolerance(),
        }
    }
}

impl StabilityGate {
    /// `true` when both `pitch` and `roll` (degrees) are close enough to level.
    ///
    /// Angles are reduced to `[0, 360)` first, so a slight nose-down attitude
    /// reported as `359.9` counts as level just like `0.1`.
    pub fn is_stable(&self, pitch: f64, roll: f64) -> bool {
        near_level(pitch, self.pitch_tolerance) && near_level(roll, self.roll_tolerance)
    }
}

fn near_level(angle_deg: f64, tolerance: f64) -> bool {
    let a = angle_deg.rem_euclid(360.0);
    a <= tolerance || 360.0 - a < tolerance
}

// ────────────────────────────────────────────────────────────────────────────
// WorldMap
// ────────────────────────────────────────────────────────────────────────────

/// World-projected cells observed in one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub navigable: Vec<GridCell>,
    pub obstacles: Vec<GridCell>,
    pub samples: Vec<GridCell>,
}

impl Observation {
    fn cells(&self, layer: Layer) -> &[GridCell] {
        match layer {
            Layer::Obstacle => &self.obstacles,
            Layer::Sample => &self.samples,
            Layer::Navigable => &self.navigable,
        }
    }
}

/// Square accumulator grid, `size × size` cells of three `u8` counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldMap {
    size: usize,
    cells: Vec<[u8; 3]>,
}

impl WorldMap {
    /// An empty map of `size × size` cells.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![[0; 3]; size * size],
        }
    }

    /// Side length in cells.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Counter of `layer` at `cell`.
    ///
    /// # Panics
    ///
    /// Panics if `cell` lies outside the map.
    pub fn get(&self, cell: GridCell, layer: Layer) -> u8 {
        self.cells[self.index(cell)][layer as usize]
    }

    /// All three counters at `cell`, in [`Layer`] order.
    pub fn counters(&self, cell: GridCell) -> [u8; 3] {
        self.cells[self.index(cell)]
    }

    /// Number of cells with a nonzero counter in `layer`.
    pub fn coverage(&self, layer: Layer) -> usize {
        self.cells.iter().filter(|c| c[layer as usize] > 0).count()
    }

    /// Add one frame's observation when `stable`; a no-op otherwise.
    ///
    /// Each distinct cell is credited at most once per layer per frame, no
    /// matter how many pixels landed on it.  Counters saturate at `u8::MAX`.
    /// Returns whether the map was touched.
    pub fn integrate(&mut self, observation: &Observation, stable: bool) -> bool {
        if !stable {
            return false;
        }
        for layer in Layer::ALL {
            let mut hits: Vec<usize> = observation
                .cells(layer)
                .iter()
                .filter(|c| c.x < self.size && c.y < self.size)
                .map(|&c| self.index(c))
                .collect();
            hits.sort_unstable();
            hits.dedup();

            let weight = layer.weight();
            for i in hits {
                let counter = &mut self.cells[i][layer as usize];
                *counter = counter.saturating_add(weight);
            }
        }
        true
    }

    fn index(&self, cell: GridCell) -> usize {
        assert!(cell.x < self.size && cell.y < self.size, "{cell:?} outside map");
        cell.y * self.size + cell.x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x: usize, y: usize) -> GridCell {
        GridCell { x, y }
    }

    // ── StabilityGate ──────────────────────────────────────────────────────

    #[test]
    fn small_tilt_is_stable() {
        assert!(StabilityGate::default().is_stable(0.1, 0.1));
    }

    #[test]
    fn tilt_just_below_wrap_is_stable() {
        let gate = StabilityGate::default();
        assert!(gate.is_stable(359.9, 0.0));
        assert!(gate.is_stable(0.0, 359.6));
    }

    #[test]
    fn significant_pitch_is_unstable() {
        let gate = StabilityGate::default();
        assert!(!gate.is_stable(10.0, 0.0));
        assert!(!gate.is_stable(350.0, 0.0));
    }

    #[test]
    fn roll_uses_its_own_tolerance() {
        let gate = StabilityGate::default();
        assert!(gate.is_stable(0.0, 0.4));
        assert!(!gate.is_stable(0.0, 0.6));
        assert!(!gate.is_stable(0.4, 0.0));
    }

    #[test]
    fn tolerance_boundaries() {
        let gate = StabilityGate::default();
        assert!(gate.is_stable(0.25, 0.5));
        assert!(!gate.is_stable(359.75, 0.0));
        assert!(gate.is_stable(359.76, 0.0));
    }

    #[test]
    fn negative_angles_wrap() {
        assert!(StabilityGate::default().is_stable(-0.1, -0.2));
    }

    // ── WorldMap ───────────────────────────────────────────────────────────

    #[test]
    fn stable_frame_adds_layer_weights() {
        let mut map = WorldMap::new(10);
        let obs = Observation {
            navigable: vec![cell(1, 1)],
            obstacles: vec![cell(2, 3)],
            samples: vec![cell(4, 5)],
        };
        assert!(map.integrate(&obs, true));
        assert_eq!(map.get(cell(1, 1), Layer::Navigable), 10);
        assert_eq!(map.get(cell(2, 3), Layer::Obstacle), 1);
        assert_eq!(map.get(cell(4, 5), Layer::Sample), 1);
        assert_eq!(map.counters(cell(1, 1)), [0, 0, 10]);
    }

    #[test]
    fn unstable_frame_leaves_map_untouched() {
        let mut map = WorldMap::new(10);
        let obs = Observation {
            navigable: vec![cell(1, 1)],
            ..Default::default()
        };
        assert!(!map.integrate(&obs, false));
        assert_eq!(map, WorldMap::new(10));
    }

    #[test]
    fn duplicate_cells_in_one_frame_count_once() {
        let mut map = WorldMap::new(10);
        let obs = Observation {
            navigable: vec![cell(3, 3); 50],
            obstacles: vec![cell(3, 3), cell(3, 3)],
            samples: vec![],
        };
        map.integrate(&obs, true);
        assert_eq!(map.get(cell(3, 3), Layer::Navigable), 10);
        assert_eq!(map.get(cell(3, 3), Layer::Obstacle), 1);
    }

    #[test]
    fn repeated_frames_accumulate_and_conflicts_stay_distinguishable() {
        let mut map = WorldMap::new(10);
        let ground = Observation {
            navigable: vec![cell(0, 0)],
            ..Default::default()
        };
        let rock = Observation {
            obstacles: vec![cell(0, 0)],
            ..Default::default()
        };
        for _ in 0..3 {
            map.integrate(&ground, true);
        }
        map.integrate(&rock, true);
        assert_eq!(map.counters(cell(0, 0)), [1, 0, 30]);
    }

    #[test]
    fn counters_are_monotonic_and_saturate() {
        let mut map = WorldMap::new(4);
        let obs = Observation {
            navigable: vec![cell(2, 2)],
            obstacles: vec![cell(2, 2)],
            samples: vec![cell(1, 0)],
        };
        let mut prev = map.clone();
        for _ in 0..40 {
            map.integrate(&obs, true);
            for y in 0..4 {
                for x in 0..4 {
                    for layer in Layer::ALL {
                        assert!(map.get(cell(x, y), layer) >= prev.get(cell(x, y), layer));
                    }
                }
            }
            prev = map.clone();
        }
        assert_eq!(map.get(cell(2, 2), Layer::Navigable), u8::MAX);
        assert_eq!(map.get(cell(2, 2), Layer::Obstacle), 40);
    }

    #[test]
    fn coverage_counts_touched_cells() {
        let mut map = WorldMap::new(5);
        let obs = Observation {
            navigable: vec![cell(0, 0), cell(1, 0), cell(1, 0)],
            ..Default::default()
        };
        map.integrate(&obs, true);
        assert_eq!(map.coverage(Layer::Navigable), 2);
        assert_eq!(map.coverage(Layer::Obstacle), 0);
    }
}
