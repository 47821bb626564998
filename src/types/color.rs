//! Upstream 8-bit RGB colour values.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{GamutTriangle, Point};
use crate::colorspace;

/// An RGB colour with red, green and blue components (0-255 each), as
/// produced by the ambient-lighting engine for one light.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// Create a color with the given RGB values.
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// Scale to `[0, 1]` and map into the given gamut.
    ///
    /// # Examples
    ///
    /// ```
    /// use hue_stream_rs::{Color, Gamut};
    ///
    /// let p = Color::BLACK.to_point(&Gamut::C.triangle());
    /// assert_eq!((p.x(), p.y(), p.brightness()), (0.0, 0.0, 0.0));
    /// ```
    pub fn to_point(&self, gamut: &GamutTriangle) -> Point {
        colorspace::map(
            f64::from(self.red) / 255.0,
            f64::from(self.green) / 255.0,
            f64::from(self.blue) / 255.0,
            gamut,
        )
    }
}

impl From<[u8; 3]> for Color {
    fn from([red, green, blue]: [u8; 3]) -> Self {
        Self::rgb(red, green, blue)
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parse from comma-separated string (e.g., "255,128,0").
    fn from_str(s: &str) -> Result<Self, String> {
        let parts = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|e| format!("invalid channel in {s:?}: {e}"))?;
        match parts.as_slice() {
            [r, g, b] => Ok(Self::rgb(*r, *g, *b)),
            _ => Err("Expected format: r,g,b".into()),
        }
    }
}
