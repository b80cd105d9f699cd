use nalgebra::{Point2, Rotation2, Unit, Vector2};
use rand::Rng;

use crate::FlockSettings;

const EPSILON: f32 = 1.0e-6;

pub type Heading = Unit<Vector2<f32>>;

/// Unit vector in the direction of `v`, or zero when `v` has no direction.
pub fn normalize_or_zero(v: Vector2<f32>) -> Vector2<f32> {
    v.try_normalize(EPSILON).unwrap_or_else(Vector2::zeros)
}

/// Heading pointing `degrees` counter-clockwise from +x.
pub fn heading_from_degrees(degrees: f32) -> Heading {
    let radians = degrees.to_radians();
    Unit::new_normalize(Vector2::new(radians.cos(), radians.sin()))
}

pub fn heading_degrees(heading: &Heading) -> f32 {
    heading.y.atan2(heading.x).to_degrees()
}

/// Uniformly distributed direction on the unit circle.
pub fn random_unit<R: Rng>(rng: &mut R) -> Vector2<f32> {
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    Vector2::new(angle.cos(), angle.sin())
}

/// Blend the steering forces into the heading the boid wants to face.
///
/// Each force is reduced to a direction before its weight is applied, so the
/// weights act as independent gains. `noise` is expected to be a unit vector
/// (or zero). If everything cancels out the forward heading is kept.
pub fn compose_heading(
    forward: Heading,
    separation: Vector2<f32>,
    alignment: Vector2<f32>,
    cohesion: Vector2<f32>,
    noise: Vector2<f32>,
    settings: &FlockSettings,
) -> Heading {
    let total = forward.into_inner()
        + normalize_or_zero(separation) * settings.separation_weight
        + normalize_or_zero(alignment) * settings.alignment_weight
        + normalize_or_zero(cohesion) * settings.cohesion_weight
        + normalize_or_zero(noise) * settings.noise_weight;

    if !total.iter().all(|c| c.is_finite()) {
        return forward;
    }
    Unit::try_new(total, EPSILON).unwrap_or(forward)
}

/// Turn `current` towards `desired` by at most `max_degrees`, the short way round.
pub fn rotate_towards(current: Heading, desired: Heading, max_degrees: f32) -> Heading {
    let max_radians = max_degrees.max(0.0).to_radians();
    let delta = Rotation2::rotation_between(&*current, &*desired).angle();
    if delta.abs() <= max_radians {
        return desired;
    }
    let applied = max_radians.copysign(delta);
    Unit::new_normalize(Rotation2::new(applied) * current.into_inner())
}

/// Advance `position` along `heading` for one tick.
pub fn integrate(
    position: Point2<f32>,
    heading: &Heading,
    move_speed: f32,
    dt: f32,
) -> Point2<f32> {
    position + heading.into_inner() * (move_speed * dt)
}
