pub mod boids;
pub mod forces;
pub mod neighbors;
pub mod steering;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tuning shared by every boid in a flock.
///
/// One instance is created at startup and handed by reference into every
/// step. Values are written only between steps by whatever owns the
/// configuration; the simulation never validates or modifies them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockSettings {
    pub separation_weight: f32,
    pub alignment_weight: f32,
    pub cohesion_weight: f32,
    pub noise_weight: f32,
    /// Number of equal sectors the detection cone is split into. Together the
    /// sectors always cover the whole cone, so the count does not change what
    /// is detected; zero disables detection.
    pub raycast_count: u32,
    /// Full width of the detection cone, centred on the heading.
    pub detection_angle_degrees: f32,
    pub detection_range: f32,
    /// Scale of the separation falloff.
    pub max_acceleration: f32,
    pub move_speed: f32,
    /// Degrees per second.
    pub rotation_speed: f32,
    /// Hue interval, in degrees, that spawn colours are drawn from.
    pub colour_hues: [f32; 2],
}

impl Default for FlockSettings {
    fn default() -> Self {
        FlockSettings {
            separation_weight: 0.5,
            alignment_weight: 0.3,
            cohesion_weight: 0.3,
            noise_weight: 0.1,
            raycast_count: 12,
            detection_angle_degrees: 270.0,
            detection_range: 2.0,
            max_acceleration: 15.0,
            move_speed: 15.0,
            rotation_speed: 360.0,
            colour_hues: [180.0, 260.0],
        }
    }
}

const MIN_POSITIVE: f32 = 1.0e-3;

impl FlockSettings {
    /// Clamp every field into its supported range.
    ///
    /// Returns the clamped settings and whether anything had to change.
    /// Meant for configuration surfaces; the simulation accepts whatever it
    /// is given.
    pub fn clamped(self) -> (Self, bool) {
        let clamped = FlockSettings {
            separation_weight: clamp_unit(self.separation_weight),
            alignment_weight: clamp_unit(self.alignment_weight),
            cohesion_weight: clamp_unit(self.cohesion_weight),
            noise_weight: clamp_unit(self.noise_weight),
            raycast_count: self.raycast_count.clamp(3, 30),
            detection_angle_degrees: clamp_finite(self.detection_angle_degrees, 0.0, 360.0),
            detection_range: clamp_finite(self.detection_range, 0.0, f32::MAX),
            max_acceleration: clamp_finite(self.max_acceleration, MIN_POSITIVE, f32::MAX),
            move_speed: clamp_finite(self.move_speed, MIN_POSITIVE, f32::MAX),
            rotation_speed: clamp_finite(self.rotation_speed, MIN_POSITIVE, f32::MAX),
            colour_hues: [
                clamp_finite(self.colour_hues[0], 0.0, 360.0),
                clamp_finite(self.colour_hues[1], 0.0, 360.0),
            ],
        };
        let changed = clamped != self;
        if changed {
            warn!(original = ?self, ?clamped, "flock settings clamped into range");
        }
        (clamped, changed)
    }
}

fn clamp_unit(value: f32) -> f32 {
    clamp_finite(value, 0.0, 1.0)
}

// NaN collapses to the lower bound.
fn clamp_finite(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}
