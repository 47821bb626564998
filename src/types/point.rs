//! Chromaticity coordinates in the bridge's colour space.

use serde::{Deserialize, Serialize};

/// A CIE xy chromaticity coordinate paired with a brightness in `[0, 1]`.
///
/// Equality is exact. Lights compare points to decide whether a new colour
/// differs from the one they already hold.
///
/// # Examples
///
/// ```
/// use hue_stream_rs::Point;
///
/// let p = Point::new(0.3, 0.4, 0.5);
/// assert_eq!(p.x(), 0.3);
/// assert_eq!(p, Point::new(0.3, 0.4, 0.5));
/// assert_ne!(p, p.with_brightness(0.6));
/// ```
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Point {
    pub(crate) x: f64,
    pub(crate) y: f64,
    #[serde(rename = "bri")]
    pub(crate) brightness: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, brightness: f64) -> Self {
        Self { x, y, brightness }
    }

    /// A point without brightness, as used for gamut vertices.
    pub const fn xy(x: f64, y: f64) -> Self {
        Self::new(x, y, 0.0)
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn brightness(&self) -> f64 {
        self.brightness
    }

    /// Copy of this point with another brightness.
    pub fn with_brightness(&self, brightness: f64) -> Self {
        Self { brightness, ..*self }
    }

    pub(crate) fn sub(&self, other: &Self) -> Self {
        Self::xy(self.x - other.x, self.y - other.y)
    }

    pub(crate) fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub(crate) fn cross(&self, other: &Self) -> f64 {
        self.x * other.y - self.y * other.x
    }
}
