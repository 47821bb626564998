//! Device gamuts and their classification by model id.

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use super::Point;

/// The triangle of chromaticities a lamp can physically produce.
///
/// Vertices must not be collinear; a degenerate triangle is a configuration
/// error and is not checked at runtime.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct GamutTriangle {
    pub red: Point,
    pub green: Point,
    pub blue: Point,
}

impl GamutTriangle {
    pub const fn new(red: Point, green: Point, blue: Point) -> Self {
        Self { red, green, blue }
    }
}

impl Default for GamutTriangle {
    fn default() -> Self {
        Gamut::Full.triangle()
    }
}

/// Gamut families known to the bridge.
///
/// `Full` is the fallback for unrecognised models and spans the whole unit
/// triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, Display)]
pub enum Gamut {
    A,
    B,
    C,
    Full,
}

static GAMUT_A_MODEL_IDS: &[&str] = &[
    "LLC001", "LLC005", "LLC006", "LLC007", "LLC010", "LLC011", "LLC012", "LLC013", "LLC014",
    "LST001",
];

static GAMUT_B_MODEL_IDS: &[&str] = &["LCT001", "LCT002", "LCT003", "LCT007", "LLM001"];

static GAMUT_C_MODEL_IDS: &[&str] = &[
    "LLC020", "LST002", "LCT011", "LCT012", "LCT010", "LCT014", "LCT015", "LCT016", "LCT024",
];

impl Gamut {
    /// Look up the gamut family of a model id.
    ///
    /// Returns `None` for models missing from the tables.
    ///
    /// # Examples
    ///
    /// ```
    /// use hue_stream_rs::Gamut;
    ///
    /// assert_eq!(Gamut::classify("LCT001"), Some(Gamut::B));
    /// assert_eq!(Gamut::classify("LST001"), Some(Gamut::A));
    /// assert_eq!(Gamut::classify("XYZ999"), None);
    /// ```
    pub fn classify(model_id: &str) -> Option<Self> {
        let model_id = model_id.trim().trim_matches('"');
        Gamut::iter().find(|gamut| gamut.model_ids().contains(&model_id))
    }

    /// Like [`Gamut::classify`], falling back to [`Gamut::Full`].
    pub fn from_model_id(model_id: &str) -> Self {
        Self::classify(model_id).unwrap_or(Gamut::Full)
    }

    pub fn model_ids(&self) -> &'static [&'static str] {
        match self {
            Gamut::A => GAMUT_A_MODEL_IDS,
            Gamut::B => GAMUT_B_MODEL_IDS,
            Gamut::C => GAMUT_C_MODEL_IDS,
            Gamut::Full => &[],
        }
    }

    pub fn triangle(&self) -> GamutTriangle {
        match self {
            Gamut::A => GamutTriangle::new(
                Point::xy(0.704, 0.296),
                Point::xy(0.2151, 0.7106),
                Point::xy(0.138, 0.08),
            ),
            Gamut::B => GamutTriangle::new(
                Point::xy(0.675, 0.322),
                Point::xy(0.409, 0.518),
                Point::xy(0.167, 0.04),
            ),
            Gamut::C => GamutTriangle::new(
                Point::xy(0.6915, 0.3083),
                Point::xy(0.17, 0.7),
                Point::xy(0.1532, 0.0475),
            ),
            Gamut::Full => GamutTriangle::new(
                Point::xy(1.0, 0.0),
                Point::xy(0.0, 1.0),
                Point::xy(0.0, 0.0),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gamut_b_constants() {
        let triangle = Gamut::from_model_id("LCT001").triangle();
        assert_eq!(triangle.red, Point::xy(0.675, 0.322));
        assert_eq!(triangle.green, Point::xy(0.409, 0.518));
        assert_eq!(triangle.blue, Point::xy(0.167, 0.04));
    }

    #[test]
    fn test_unknown_model_falls_back_to_full_triangle() {
        let triangle = Gamut::from_model_id("not-a-hue");
        assert_eq!(triangle, Gamut::Full);
        assert_eq!(
            triangle.triangle(),
            GamutTriangle::new(Point::xy(1.0, 0.0), Point::xy(0.0, 1.0), Point::xy(0.0, 0.0))
        );
    }

    #[test]
    fn test_model_id_is_trimmed() {
        assert_eq!(Gamut::classify(" \"LCT015\" "), Some(Gamut::C));
    }

    #[test]
    fn test_tables_are_disjoint() {
        for gamut in Gamut::iter() {
            for id in gamut.model_ids() {
                assert_eq!(Gamut::classify(id), Some(gamut));
            }
        }
    }
}
