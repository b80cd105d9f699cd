use std::collections::HashMap;

use nalgebra::Point2;

use crate::FlockSettings;
use crate::boids::BoidSnapshot;
use crate::steering::heading_degrees;

const MIN_CELL_SIZE: f32 = 1.0e-3;

/// A pluggable way of finding the boids a given boid can see.
///
/// Implementations only narrow down candidates; the cone, range and
/// de-duplication rules live in [`detect`] so every strategy agrees on the
/// result.
pub trait NeighborQuery: Send + Sync {
    /// Re-index the snapshot the next queries will run against.
    fn rebuild(&mut self, snapshot: &[BoidSnapshot], settings: &FlockSettings);

    /// Indices into `snapshot` of boids that might be within range of `me`.
    fn candidates(
        &self,
        me: &BoidSnapshot,
        snapshot: &[BoidSnapshot],
        settings: &FlockSettings,
    ) -> Vec<usize>;

    fn name(&self) -> &'static str;

    /// Boids inside `me`'s detection cone, each at most once, never `me`.
    fn find(
        &self,
        me: &BoidSnapshot,
        snapshot: &[BoidSnapshot],
        settings: &FlockSettings,
    ) -> Vec<BoidSnapshot> {
        if !can_detect(settings) {
            return Vec::new();
        }
        let candidates = self.candidates(me, snapshot, settings);
        detect(me, candidates.iter().filter_map(|&i| snapshot.get(i)), settings)
    }
}

/// Sweep the detection cone and collect what each sample direction covers.
///
/// The cone is split into `raycast_count` equal sectors starting at
/// `heading - angle / 2`. A boid is picked up by every sector its bearing
/// falls in (sector edges are shared), so hits are de-duplicated by id before
/// returning.
pub fn detect<'a, I>(
    me: &BoidSnapshot,
    candidates: I,
    settings: &FlockSettings,
) -> Vec<BoidSnapshot>
where
    I: IntoIterator<Item = &'a BoidSnapshot>,
{
    if !can_detect(settings) || settings.detection_angle_degrees.is_nan() {
        return Vec::new();
    }
    let rays = settings.raycast_count.max(1);
    let range = settings.detection_range;
    let angle = settings.detection_angle_degrees;
    let start = heading_degrees(&me.heading) - angle / 2.0;

    let in_range: Vec<(&BoidSnapshot, f32)> = candidates
        .into_iter()
        .filter(|other| other.id != me.id)
        .filter_map(|other| {
            let offset = other.position - me.position;
            let distance = offset.norm();
            if distance <= 0.0 || distance > range {
                return None;
            }
            let bearing = offset.y.atan2(offset.x).to_degrees();
            Some((other, (bearing - start).rem_euclid(360.0)))
        })
        .collect();

    let mut hits: Vec<BoidSnapshot> = Vec::new();
    for ray in 0..rays {
        let low = ray as f32 * angle / rays as f32;
        let high = (ray + 1) as f32 * angle / rays as f32;
        for &(other, sweep) in &in_range {
            if sweep >= low && sweep <= high {
                hits.push(*other);
            }
        }
    }

    hits.sort_unstable_by_key(|hit| hit.id);
    hits.dedup_by_key(|hit| hit.id);
    hits
}

fn can_detect(settings: &FlockSettings) -> bool {
    settings.raycast_count > 0 && settings.detection_range > 0.0
}

/// Test every other boid. Fine for small flocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct BruteForce;

impl NeighborQuery for BruteForce {
    fn rebuild(&mut self, _snapshot: &[BoidSnapshot], _settings: &FlockSettings) {}

    fn candidates(
        &self,
        _me: &BoidSnapshot,
        snapshot: &[BoidSnapshot],
        _settings: &FlockSettings,
    ) -> Vec<usize> {
        (0..snapshot.len()).collect()
    }

    fn name(&self) -> &'static str {
        "brute-force"
    }
}

/// Uniform grid keyed by cell, with cells as wide as the detection range.
#[derive(Debug, Default, Clone)]
pub struct UniformGrid {
    cell_size: f32,
    cells: HashMap<(i32, i32), Vec<usize>>,
}

impl UniformGrid {
    pub fn new() -> Self {
        UniformGrid::default()
    }

    fn cell_of(&self, position: Point2<f32>) -> (i32, i32) {
        let cell_x = (position.x / self.cell_size).floor() as i32;
        let cell_y = (position.y / self.cell_size).floor() as i32;
        (cell_x, cell_y)
    }
}

impl NeighborQuery for UniformGrid {
    fn rebuild(&mut self, snapshot: &[BoidSnapshot], settings: &FlockSettings) {
        self.cell_size = if settings.detection_range.is_finite() {
            settings.detection_range.max(MIN_CELL_SIZE)
        } else {
            MIN_CELL_SIZE
        };
        self.cells.clear();
        for (index, boid) in snapshot.iter().enumerate() {
            let cell = self.cell_of(boid.position);
            self.cells.entry(cell).or_default().push(index);
        }
    }

    fn candidates(
        &self,
        me: &BoidSnapshot,
        _snapshot: &[BoidSnapshot],
        settings: &FlockSettings,
    ) -> Vec<usize> {
        if self.cells.is_empty() || !can_detect(settings) {
            return Vec::new();
        }
        // One ring when the grid was built for the current range.
        let reach = (settings.detection_range / self.cell_size).ceil().max(1.0);
        if !reach.is_finite() || (2.0 * reach + 1.0).powi(2) > self.cells.len() as f32 {
            return self.cells.values().flatten().copied().collect();
        }
        let reach = reach as i32;
        let (cell_x, cell_y) = self.cell_of(me.position);

        let mut found = Vec::new();
        for x_offset in -reach..=reach {
            for y_offset in -reach..=reach {
                let key = (cell_x.saturating_add(x_offset), cell_y.saturating_add(y_offset));
                if let Some(indices) = self.cells.get(&key) {
                    found.extend_from_slice(indices);
                }
            }
        }
        found
    }

    fn name(&self) -> &'static str {
        "uniform-grid"
    }
}
