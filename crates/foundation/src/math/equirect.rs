//! Equirectangular panorama mapping.
//!
//! Pixel `x` maps linearly to longitude and pixel `y` to latitude:
//! - `theta = (x / W - 0.5) * 2π` (longitude, `-π..π`)
//! - `phi = (y / H - 0.5) * π` (latitude, `-π/2..π/2`, positive downward)
//!
//! The viewer looks down `-Z` at longitude zero, with `+Y` up.

use std::f64::consts::{PI, TAU};

use super::{Vec2, Vec3};

/// Sphere radius used for comment pins around the viewer.
pub const PIN_RADIUS: f64 = 8.0;

/// Dimensions of an equirectangular panorama in pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EquirectFrame {
    pub width: f64,
    pub height: f64,
}

/// Camera orientation toward a panorama pixel, in degrees.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LookAngles {
    pub yaw_deg: f64,
    pub pitch_deg: f64,
}

impl Default for EquirectFrame {
    fn default() -> Self {
        Self::new(4096.0, 2048.0)
    }
}

impl EquirectFrame {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Maps a panorama pixel onto the sphere of the given radius.
    ///
    /// Non-finite input yields non-finite output; validating input is the
    /// caller's job.
    pub fn to_direction(&self, pixel: Vec2, radius: f64) -> Vec3 {
        let theta = (pixel.x / self.width - 0.5) * TAU;
        let phi = (pixel.y / self.height - 0.5) * PI;

        Vec3::new(
            radius * phi.cos() * theta.sin(),
            -radius * phi.sin(),
            -radius * phi.cos() * theta.cos(),
        )
    }

    /// Inverse of [`EquirectFrame::to_direction`].
    ///
    /// A point at the origin has no direction and maps to `(0, 0)`.
    pub fn to_pixel(&self, point: Vec3) -> Vec2 {
        let radius = point.length();
        if radius == 0.0 {
            return Vec2::new(0.0, 0.0);
        }

        let phi = (-point.y / radius).clamp(-1.0, 1.0).asin();
        let theta = point.x.atan2(-point.z);

        let u = theta / TAU + 0.5;
        let v = phi / PI + 0.5;

        let mut x = u * self.width;
        // theta == π lands exactly on the seam; fold it back to column zero.
        if x >= self.width {
            x -= self.width;
        }
        Vec2::new(x, v * self.height)
    }

    /// Yaw/pitch that centres the camera on `pixel`.
    ///
    /// Yaw is positive to the left (counter-clockwise seen from above),
    /// pitch positive upward.
    pub fn look_angles(&self, pixel: Vec2) -> LookAngles {
        let theta = (pixel.x / self.width - 0.5) * TAU;
        let phi = (pixel.y / self.height - 0.5) * PI;
        LookAngles {
            yaw_deg: -theta.to_degrees(),
            pitch_deg: -phi.to_degrees(),
        }
    }

    pub fn contains(&self, pixel: Vec2) -> bool {
        pixel.is_finite()
            && pixel.x >= 0.0
            && pixel.x < self.width
            && pixel.y >= 0.0
            && pixel.y <= self.height
    }
}
