use colors_transform::{Color, Hsl};
use image::Rgb;
use nalgebra::{Point2, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::FlockSettings;
use crate::forces::{alignment, cohesion, separation};
use crate::neighbors::{NeighborQuery, UniformGrid};
use crate::steering::{
    Heading, compose_heading, heading_degrees, heading_from_degrees, integrate, random_unit,
    rotate_towards,
};

pub const DEFAULT_MAX_BOIDS: usize = 400;

// Keeps the width of the spawn square finite.
const MAX_HALF_EXTENT: f32 = f32::MAX / 4.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Which half of the two-step schedule a boid is on.
///
/// Boids steer only on `Active` steps and coast straight on the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Coast,
}

impl Phase {
    pub fn flip(self) -> Self {
        match self {
            Phase::Active => Phase::Coast,
            Phase::Coast => Phase::Active,
        }
    }
}

/// What other boids get to see of a boid during a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoidSnapshot {
    pub id: usize,
    pub position: Point2<f32>,
    pub heading: Heading,
}

#[derive(Debug, Clone)]
pub struct Boid {
    id: usize,
    position: Point2<f32>,
    heading: Heading,
    phase: Phase,
    pub colour: Rgb<u8>,
    rng: ChaCha8Rng,
}

impl Boid {
    /// Spawn a boid with a heading, phase and colour drawn from `seed`.
    pub fn new(id: usize, position: Point2<f32>, seed: u64, settings: &FlockSettings) -> Self {
        let mut boid = Boid {
            id,
            position,
            heading: heading_from_degrees(0.0),
            phase: Phase::Coast,
            colour: WHITE,
            rng: ChaCha8Rng::seed_from_u64(seed),
        };
        boid.randomise();
        boid.colour = spawn_colour(&mut boid.rng, settings.colour_hues);
        boid
    }

    /// A boid with a known heading and phase. Noise is still drawn from `seed`.
    pub fn with_state(
        id: usize,
        position: Point2<f32>,
        heading_degrees: f32,
        phase: Phase,
        seed: u64,
    ) -> Self {
        Boid {
            id,
            position,
            heading: heading_from_degrees(heading_degrees),
            phase,
            colour: WHITE,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Move the boid to `position` and redraw its heading and phase from `seed`.
    pub fn reset(&mut self, position: Point2<f32>, seed: u64) {
        self.position = position;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.randomise();
    }

    fn randomise(&mut self) {
        self.heading = heading_from_degrees(self.rng.random_range(0.0..360.0));
        self.phase = if self.rng.random_bool(0.5) {
            Phase::Active
        } else {
            Phase::Coast
        };
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn position(&self) -> Point2<f32> {
        self.position
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    /// Heading as degrees counter-clockwise from +x.
    pub fn heading_degrees(&self) -> f32 {
        heading_degrees(&self.heading)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn snapshot(&self) -> BoidSnapshot {
        BoidSnapshot {
            id: self.id,
            position: self.position,
            heading: self.heading,
        }
    }

    /// Advance one tick against `snapshot`, the state of the whole flock at
    /// the start of the step.
    ///
    /// On active steps the boid looks around, blends the flocking forces and
    /// turns towards the result; on every step it moves forward.
    pub fn step<Q>(
        &mut self,
        snapshot: &[BoidSnapshot],
        query: &Q,
        settings: &FlockSettings,
        dt: f32,
    ) where
        Q: NeighborQuery + ?Sized,
    {
        self.phase = self.phase.flip();
        if self.phase == Phase::Active {
            let me = self.snapshot();
            let neighbors = query.find(&me, snapshot, settings);
            let desired = compose_heading(
                self.heading,
                separation(&me, &neighbors, settings),
                alignment(&me, &neighbors),
                cohesion(&me, &neighbors),
                random_unit(&mut self.rng),
                settings,
            );
            // Turns happen every other step, so each one gets two steps' budget.
            let max_degrees = settings.rotation_speed * 2.0 * dt;
            self.heading = rotate_towards(self.heading, desired, max_degrees);
        }
        self.position = integrate(self.position, &self.heading, settings.move_speed, dt);
    }
}

fn spawn_colour<R: Rng>(rng: &mut R, hues: [f32; 2]) -> Rgb<u8> {
    let [from, to] = hues;
    let hue = from + (to - from) * rng.random::<f32>();
    let rgb = Hsl::from(hue, 70.0, 60.0).to_rgb();
    Rgb([channel(rgb.get_red()), channel(rgb.get_green()), channel(rgb.get_blue())])
}

fn channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Summary of a flock's state, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlockStats {
    pub boids: usize,
    pub steps: u64,
    /// Length of the mean heading: 1 when every boid faces the same way.
    pub polarisation: f32,
    pub centroid: [f32; 2],
    /// Mean distance from the centroid.
    pub spread: f32,
}

/// A population of boids plus the neighbour index used to step it.
pub struct Flock {
    boids: Vec<Boid>,
    query: Box<dyn NeighborQuery>,
    rng: ChaCha8Rng,
    next_id: usize,
    max_boids: usize,
    steps: u64,
}

impl Flock {
    /// An empty flock backed by a uniform grid.
    pub fn new(seed: u64) -> Self {
        Flock::with_query(seed, Box::new(UniformGrid::new()))
    }

    pub fn with_query(seed: u64, query: Box<dyn NeighborQuery>) -> Self {
        debug!(seed, strategy = query.name(), "created flock");
        Flock {
            boids: Vec::new(),
            query,
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
            max_boids: DEFAULT_MAX_BOIDS,
            steps: 0,
        }
    }

    pub fn with_max_boids(mut self, max_boids: usize) -> Self {
        self.max_boids = max_boids;
        self
    }

    pub fn max_boids(&self) -> usize {
        self.max_boids
    }

    pub fn len(&self) -> usize {
        self.boids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boids.is_empty()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn strategy_name(&self) -> &'static str {
        self.query.name()
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn get(&self, id: usize) -> Option<&Boid> {
        self.boids.iter().find(|boid| boid.id == id)
    }

    /// Spawn a boid at `position`. Returns its id, or `None` once the flock is full.
    pub fn spawn(&mut self, position: Point2<f32>, settings: &FlockSettings) -> Option<usize> {
        if self.boids.len() >= self.max_boids {
            warn!(max_boids = self.max_boids, "flock is full, not spawning");
            return None;
        }
        let id = self.next_id;
        let seed = self.rng.random::<u64>();
        self.boids.push(Boid::new(id, position, seed, settings));
        self.next_id += 1;
        debug!(id, x = position.x, y = position.y, "spawned boid");
        Some(id)
    }

    /// Scatter up to `count` boids over the square of half-width `half_extent`
    /// around the origin. Returns how many were spawned.
    pub fn spawn_random(
        &mut self,
        count: usize,
        half_extent: f32,
        settings: &FlockSettings,
    ) -> usize {
        let half_extent = half_extent.abs();
        if !half_extent.is_finite() {
            warn!(half_extent, "spawn extent is not finite, not spawning");
            return 0;
        }
        let half_extent = half_extent.clamp(f32::EPSILON, MAX_HALF_EXTENT);
        let mut spawned = 0;
        for _ in 0..count {
            let x = self.rng.random_range(-half_extent..half_extent);
            let y = self.rng.random_range(-half_extent..half_extent);
            if self.spawn(Point2::new(x, y), settings).is_none() {
                break;
            }
            spawned += 1;
        }
        spawned
    }

    /// Add an already built boid. Refused when the flock is full or the id is taken.
    pub fn insert(&mut self, boid: Boid) -> bool {
        if self.boids.len() >= self.max_boids || self.get(boid.id).is_some() {
            return false;
        }
        self.next_id = self.next_id.max(boid.id.saturating_add(1));
        self.boids.push(boid);
        true
    }

    pub fn despawn(&mut self, id: usize) -> bool {
        match self.boids.iter().position(|boid| boid.id == id) {
            Some(index) => {
                self.boids.remove(index);
                debug!(id, "despawned boid");
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<BoidSnapshot> {
        self.boids.iter().map(Boid::snapshot).collect()
    }

    /// Advance every boid by one tick.
    ///
    /// All boids read the same snapshot taken before anyone moves, so the
    /// outcome does not depend on iteration order or thread count.
    pub fn step(&mut self, settings: &FlockSettings, dt: f32) {
        let snapshot = self.snapshot();
        self.query.rebuild(&snapshot, settings);

        let query = &*self.query;
        self.boids
            .par_iter_mut()
            .for_each(|boid| boid.step(&snapshot, query, settings, dt));

        self.steps += 1;
        trace!(step = self.steps, boids = self.boids.len(), "stepped flock");
    }

    pub fn stats(&self) -> FlockStats {
        let n = self.boids.len();
        if n == 0 {
            return FlockStats {
                boids: 0,
                steps: self.steps,
                polarisation: 0.0,
                centroid: [0.0, 0.0],
                spread: 0.0,
            };
        }
        let count = n as f32;
        let heading_sum = self
            .boids
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f32>, boid| acc + boid.heading.into_inner());
        let centroid = self
            .boids
            .iter()
            .fold(Vector2::zeros(), |acc: Vector2<f32>, boid| acc + boid.position.coords)
            / count;
        let spread = self
            .boids
            .iter()
            .map(|boid| (boid.position.coords - centroid).norm())
            .sum::<f32>()
            / count;

        FlockStats {
            boids: n,
            steps: self.steps,
            polarisation: heading_sum.norm() / count,
            centroid: [centroid.x, centroid.y],
            spread,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::BruteForce;

    fn quiet() -> FlockSettings {
        FlockSettings {
            noise_weight: 0.0,
            ..FlockSettings::default()
        }
    }

    #[test]
    fn phase_alternates() {
        assert_eq!(Phase::Active.flip(), Phase::Coast);
        assert_eq!(Phase::Coast.flip().flip(), Phase::Coast);
    }

    #[test]
    fn same_seed_same_boid() {
        let settings = FlockSettings::default();
        let a = Boid::new(0, Point2::new(1.0, 1.0), 42, &settings);
        let b = Boid::new(0, Point2::new(1.0, 1.0), 42, &settings);
        assert_eq!(a.heading(), b.heading());
        assert_eq!(a.phase(), b.phase());
        assert_eq!(a.colour, b.colour);
    }

    #[test]
    fn reset_moves_and_rerolls() {
        let settings = FlockSettings::default();
        let mut boid = Boid::new(3, Point2::new(0.0, 0.0), 1, &settings);
        let fresh = Boid::new(3, Point2::new(5.0, -5.0), 99, &settings);
        boid.reset(Point2::new(5.0, -5.0), 99);
        assert_eq!(boid.position(), Point2::new(5.0, -5.0));
        assert_eq!(boid.heading(), fresh.heading());
        assert_eq!(boid.phase(), fresh.phase());
    }

    #[test]
    fn spawn_colour_stays_in_hue_band() {
        let settings = FlockSettings {
            colour_hues: [0.0, 0.0],
            ..FlockSettings::default()
        };
        let boid = Boid::new(0, Point2::origin(), 8, &settings);
        let Rgb([r, g, b]) = boid.colour;
        assert!(r > g && r > b);
    }

    #[test]
    fn coasting_boid_moves_without_turning() {
        let settings = quiet();
        let mut boid = Boid::with_state(0, Point2::origin(), 0.0, Phase::Active, 1);
        let other = Boid::with_state(1, Point2::new(0.5, 0.5), 90.0, Phase::Active, 2);
        let snapshot = vec![boid.snapshot(), other.snapshot()];

        // Active flips to Coast, so this step must not turn.
        boid.step(&snapshot, &BruteForce, &settings, 0.02);
        assert_eq!(boid.phase(), Phase::Coast);
        assert!(boid.heading_degrees().abs() < 1e-5);
        assert!((boid.position().x - 0.3).abs() < 1e-5);
    }

    #[test]
    fn active_turn_uses_double_budget() {
        let settings = FlockSettings {
            separation_weight: 1.0,
            alignment_weight: 0.0,
            cohesion_weight: 0.0,
            noise_weight: 0.0,
            detection_angle_degrees: 360.0,
            rotation_speed: 100.0,
            ..FlockSettings::default()
        };
        let mut boid = Boid::with_state(0, Point2::origin(), 90.0, Phase::Coast, 1);
        let other = Boid::with_state(1, Point2::new(1.0, 0.0), 90.0, Phase::Coast, 2);
        let snapshot = vec![boid.snapshot(), other.snapshot()];

        // Desired heading is 135 degrees, far more than 2 * 100 * 0.1 away.
        boid.step(&snapshot, &BruteForce, &settings, 0.1);
        assert_eq!(boid.phase(), Phase::Active);
        assert!((boid.heading_degrees() - 110.0).abs() < 1e-3);
    }

    #[test]
    fn spawn_respects_the_cap() {
        let settings = FlockSettings::default();
        let mut flock = Flock::new(1).with_max_boids(3);
        assert_eq!(flock.spawn_random(10, 5.0, &settings), 3);
        assert_eq!(flock.len(), 3);
        assert!(flock.spawn(Point2::origin(), &settings).is_none());
    }

    #[test]
    fn spawn_random_survives_huge_or_infinite_extents() {
        let settings = FlockSettings::default();
        let mut flock = Flock::new(1);
        assert_eq!(flock.spawn_random(3, f32::INFINITY, &settings), 0);
        assert_eq!(flock.spawn_random(3, f32::NAN, &settings), 0);
        assert!(flock.is_empty());

        assert_eq!(flock.spawn_random(3, f32::MAX, &settings), 3);
        assert_eq!(flock.spawn_random(2, -3.0e38, &settings), 2);
        for boid in flock.boids() {
            assert!(boid.position().coords.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn insert_accepts_the_largest_id() {
        let mut flock = Flock::new(0);
        let last = Boid::with_state(usize::MAX, Point2::origin(), 0.0, Phase::Coast, 0);
        assert!(flock.insert(last));
        assert_eq!(flock.len(), 1);
        assert!(flock.get(usize::MAX).is_some());
    }

    #[test]
    fn despawn_removes_by_id() {
        let settings = FlockSettings::default();
        let mut flock = Flock::new(1);
        let a = flock.spawn(Point2::origin(), &settings).unwrap();
        let b = flock.spawn(Point2::new(1.0, 0.0), &settings).unwrap();
        assert!(flock.despawn(a));
        assert!(!flock.despawn(a));
        assert_eq!(flock.len(), 1);
        assert!(flock.get(b).is_some());
        // ids are never reused
        let c = flock.spawn(Point2::origin(), &settings).unwrap();
        assert_ne!(c, a);
    }

    #[test]
    fn insert_rejects_duplicate_ids() {
        let mut flock = Flock::new(0);
        assert!(flock.insert(Boid::with_state(4, Point2::origin(), 0.0, Phase::Coast, 0)));
        assert!(!flock.insert(Boid::with_state(4, Point2::origin(), 0.0, Phase::Coast, 0)));
        let settings = FlockSettings::default();
        assert_eq!(flock.spawn(Point2::origin(), &settings), Some(5));
    }

    #[test]
    fn stats_of_aligned_flock() {
        let mut flock = Flock::new(0);
        flock.insert(Boid::with_state(0, Point2::new(-1.0, 0.0), 45.0, Phase::Coast, 0));
        flock.insert(Boid::with_state(1, Point2::new(1.0, 0.0), 45.0, Phase::Coast, 0));
        let stats = flock.stats();
        assert_eq!(stats.boids, 2);
        assert!((stats.polarisation - 1.0).abs() < 1e-5);
        assert!(stats.centroid[0].abs() < 1e-5);
        assert!((stats.spread - 1.0).abs() < 1e-5);
    }

    #[test]
    fn strategies_produce_identical_flocks() {
        let settings = FlockSettings::default();
        let mut grid = Flock::new(77);
        let mut brute = Flock::with_query(77, Box::new(BruteForce));
        grid.spawn_random(150, 6.0, &settings);
        brute.spawn_random(150, 6.0, &settings);
        for _ in 0..20 {
            grid.step(&settings, 0.02);
            brute.step(&settings, 0.02);
        }
        for (a, b) in grid.boids().iter().zip(brute.boids()) {
            assert_eq!(a.position(), b.position());
            assert_eq!(a.heading(), b.heading());
        }
    }

    #[test]
    fn step_is_reproducible() {
        let settings = FlockSettings::default();
        let run = || {
            let mut flock = Flock::new(2024);
            flock.spawn_random(100, 5.0, &settings);
            for _ in 0..30 {
                flock.step(&settings, 0.02);
            }
            flock.snapshot()
        };
        assert_eq!(run(), run());
    }
}
