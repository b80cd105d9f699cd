//! The three classic flocking rules.
//!
//! Each function returns a raw, unnormalised steering vector; weighting and
//! normalisation happen in [`crate::steering::compose_heading`].

use nalgebra::Vector2;

use crate::FlockSettings;
use crate::boids::BoidSnapshot;

/// Push away from neighbours, harder the closer they are.
///
/// Strength falls off as `max_acceleration * (range - d) / d`, reaching zero
/// at the edge of the detection range. Coincident neighbours give no direction
/// to flee in and are skipped.
pub fn separation(
    me: &BoidSnapshot,
    neighbors: &[BoidSnapshot],
    settings: &FlockSettings,
) -> Vector2<f32> {
    let mut steer = Vector2::zeros();
    for other in neighbors {
        let away = me.position - other.position;
        let distance = away.norm();
        if distance <= 0.0 || !distance.is_finite() {
            continue;
        }
        let strength = settings.max_acceleration * (settings.detection_range - distance) / distance;
        steer += away * strength;
    }
    steer
}

/// Mean heading of the neighbourhood, counting the boid itself.
pub fn alignment(me: &BoidSnapshot, neighbors: &[BoidSnapshot]) -> Vector2<f32> {
    if neighbors.is_empty() {
        return me.heading.into_inner();
    }
    let sum = neighbors
        .iter()
        .fold(me.heading.into_inner(), |acc, other| acc + other.heading.into_inner());
    sum / (neighbors.len() + 1) as f32
}

/// Offset from the boid to the centroid of its neighbours.
pub fn cohesion(me: &BoidSnapshot, neighbors: &[BoidSnapshot]) -> Vector2<f32> {
    if neighbors.is_empty() {
        return Vector2::zeros();
    }
    let sum = neighbors
        .iter()
        .fold(Vector2::zeros(), |acc, other| acc + other.position.coords);
    sum / neighbors.len() as f32 - me.position.coords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steering::heading_from_degrees;
    use nalgebra::Point2;

    fn snap(id: usize, x: f32, y: f32, degrees: f32) -> BoidSnapshot {
        BoidSnapshot {
            id,
            position: Point2::new(x, y),
            heading: heading_from_degrees(degrees),
        }
    }

    #[test]
    fn empty_neighbourhood() {
        let settings = FlockSettings::default();
        let me = snap(0, 3.0, -1.0, 42.0);
        assert_eq!(separation(&me, &[], &settings), Vector2::zeros());
        assert_eq!(cohesion(&me, &[]), Vector2::zeros());
        assert_eq!(alignment(&me, &[]), me.heading.into_inner());
    }

    #[test]
    fn symmetric_neighbours_cancel_separation() {
        let settings = FlockSettings::default();
        let me = snap(0, 0.0, 0.0, 0.0);
        let neighbors = [snap(1, 1.0, 0.0, 0.0), snap(2, -1.0, 0.0, 0.0)];
        let steer = separation(&me, &neighbors, &settings);
        assert!(steer.norm() < 1e-5);
    }

    #[test]
    fn separation_points_away_and_grows_when_closer() {
        let settings = FlockSettings {
            detection_range: 2.0,
            max_acceleration: 15.0,
            ..FlockSettings::default()
        };
        let me = snap(0, 0.0, 0.0, 0.0);
        let near = separation(&me, &[snap(1, 0.5, 0.0, 0.0)], &settings);
        let far = separation(&me, &[snap(1, 1.5, 0.0, 0.0)], &settings);
        assert!(near.x < 0.0 && far.x < 0.0);
        assert!(near.norm() > far.norm());
        // d = 0.5: 15 * 1.5 / 0.5 = 45, times |away| = 0.5
        assert!((near.x + 22.5).abs() < 1e-4);
    }

    #[test]
    fn separation_vanishes_at_the_range_edge() {
        let settings = FlockSettings {
            detection_range: 2.0,
            ..FlockSettings::default()
        };
        let me = snap(0, 0.0, 0.0, 0.0);
        let steer = separation(&me, &[snap(1, 0.0, 2.0, 0.0)], &settings);
        assert!(steer.norm() < 1e-5);
    }

    #[test]
    fn coincident_neighbour_is_skipped() {
        let settings = FlockSettings::default();
        let me = snap(0, 1.0, 1.0, 0.0);
        let steer = separation(&me, &[snap(1, 1.0, 1.0, 90.0)], &settings);
        assert_eq!(steer, Vector2::zeros());
    }

    #[test]
    fn alignment_includes_own_heading() {
        let me = snap(0, 0.0, 0.0, 0.0);
        let neighbors = [snap(1, 1.0, 0.0, 90.0)];
        let avg = alignment(&me, &neighbors);
        assert!((avg.x - 0.5).abs() < 1e-5);
        assert!((avg.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn cohesion_points_to_centroid() {
        let me = snap(0, 1.0, 1.0, 0.0);
        let neighbors = [snap(1, 3.0, 1.0, 0.0), snap(2, 3.0, 3.0, 0.0)];
        let pull = cohesion(&me, &neighbors);
        assert!((pull.x - 2.0).abs() < 1e-5);
        assert!((pull.y - 1.0).abs() < 1e-5);
    }
}
