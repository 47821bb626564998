//! RGB to gamut-limited CIE xy conversion.
//!
//! Everything here is pure: the same inputs always produce the same [`Point`].

use crate::types::{GamutTriangle, Point};

/// Wide-gamut RGB to XYZ matrix used by the bridge vendor.
const RGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.664511, 0.154324, 0.162028],
    [0.283881, 0.668433, 0.047685],
    [0.000088, 0.072310, 0.986039],
];

/// Map an RGB triple (each channel in `[0, 1]`) into `gamut`.
///
/// Brightness is the largest gamma-corrected channel, not the XYZ `Y`.
/// Chromaticities outside the triangle are moved to the closest point on its
/// border. Black is the one exception: it maps to `(0, 0, 0)` for every
/// gamut, even where the origin lies outside the triangle.
///
/// # Examples
///
/// ```
/// use hue_stream_rs::{Gamut, colorspace};
///
/// let gamut = Gamut::B.triangle();
/// let white = colorspace::map(1.0, 1.0, 1.0, &gamut);
/// assert!((white.brightness() - 1.0).abs() < 1e-9);
/// assert!(colorspace::contains(&gamut, &white));
/// ```
pub fn map(red: f64, green: f64, blue: f64, gamut: &GamutTriangle) -> Point {
    let r = gamma(red);
    let g = gamma(green);
    let b = gamma(blue);

    let [x_row, y_row, z_row] = RGB_TO_XYZ;
    let x = r * x_row[0] + g * x_row[1] + b * x_row[2];
    let y = r * y_row[0] + g * y_row[1] + b * y_row[2];
    let z = r * z_row[0] + g * z_row[1] + b * z_row[2];

    let sum = x + y + z;
    if sum == 0.0 {
        // Black has no chromaticity and stays unclipped at the origin.
        return Point::default();
    }

    let cx = nan_to_zero(x / sum);
    let cy = nan_to_zero(y / sum);

    let brightness = r.max(g).max(b);

    clip(&Point::new(cx, cy, brightness), gamut)
}

/// Keep `point` if it lies inside `gamut`, otherwise replace its xy with the
/// nearest border point. Brightness is left untouched.
pub fn clip(point: &Point, gamut: &GamutTriangle) -> Point {
    if contains(gamut, point) {
        return *point;
    }

    // Evaluation order decides ties: the first minimum wins.
    let candidates = [
        closest_point_on_segment(&gamut.red, &gamut.green, point),
        closest_point_on_segment(&gamut.blue, &gamut.red, point),
        closest_point_on_segment(&gamut.green, &gamut.blue, point),
    ];

    let mut closest = candidates[0];
    let mut lowest = distance(point, &closest);
    for candidate in &candidates[1..] {
        let d = distance(point, candidate);
        if d < lowest {
            lowest = d;
            closest = *candidate;
        }
    }

    Point::new(closest.x, closest.y, point.brightness)
}

/// Barycentric point-in-triangle test; points on an edge count as inside.
pub fn contains(gamut: &GamutTriangle, point: &Point) -> bool {
    let v1 = gamut.green.sub(&gamut.red);
    let v2 = gamut.blue.sub(&gamut.red);
    let q = point.sub(&gamut.red);

    let denom = v1.cross(&v2);
    let s = q.cross(&v2) / denom;
    let t = v1.cross(&q) / denom;

    s >= 0.0 && t >= 0.0 && s + t <= 1.0
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn closest_point_on_segment(a: &Point, b: &Point, p: &Point) -> Point {
    let ap = p.sub(a);
    let ab = b.sub(a);

    let t = (ap.dot(&ab) / ab.dot(&ab)).clamp(0.0, 1.0);
    Point::xy(a.x + ab.x * t, a.y + ab.y * t)
}

/// Euclidean distance between the xy parts of two points.
pub fn distance(p: &Point, q: &Point) -> f64 {
    let d = p.sub(q);
    d.dot(&d).sqrt()
}

fn gamma(channel: f64) -> f64 {
    if channel > 0.04045 {
        ((channel + 0.055) / 1.055).powf(2.4)
    } else {
        channel / 12.92
    }
}

fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}
