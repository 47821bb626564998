//! Value types for colour delivery.

mod color;
mod gamut;
mod point;
mod power;

pub use color::Color;
pub use gamut::{Gamut, GamutTriangle};
pub use point::Point;
pub use power::PowerMode;
