//! Binary frame of the entertainment streaming protocol.
//!
//! A frame is a 16 byte header followed by one 9 byte record per light:
//!
//! ```text
//! "HueStream" 0x01 0x00 seq 0x00 0x00 mode 0x00
//! 0x00 0x00 id x_hi x_lo y_hi y_lo bri_hi bri_lo   (repeated)
//! ```

use crate::errors::Error;
use crate::types::Point;

type Result<T> = std::result::Result<T, Error>;

pub const MAGIC: &[u8; 9] = b"HueStream";
pub const HEADER_LEN: usize = 16;
pub const RECORD_LEN: usize = 9;

const VERSION: [u8; 2] = [0x01, 0x00];

/// Colour encoding of the per-light records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColorMode {
    Rgb = 0x00,
    XyBrightness = 0x01,
}

impl TryFrom<u8> for ColorMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(ColorMode::Rgb),
            0x01 => Ok(ColorMode::XyBrightness),
            other => Err(Error::stream("decode", format!("unknown color mode {other:#04x}"))),
        }
    }
}

/// Scale a unit value to the 16 bit wire range.
pub fn scale(value: f64) -> u16 {
    (value.clamp(0.0, 1.0) * f64::from(u16::MAX)).round() as u16
}

/// Encode one frame in xy+brightness mode.
///
/// Light ids are truncated to their low byte, as the protocol only has room
/// for one.
///
/// # Examples
///
/// ```
/// use hue_stream_rs::Point;
/// use hue_stream_rs::stream::frame;
///
/// let bytes = frame::encode(7, [(3, Point::new(0.5, 0.25, 1.0))]);
/// assert_eq!(bytes.len(), frame::HEADER_LEN + frame::RECORD_LEN);
/// assert_eq!(&bytes[..9], b"HueStream");
/// assert_eq!(bytes[11], 7);
/// assert_eq!(&bytes[16..19], &[0x00, 0x00, 0x03]);
/// ```
pub fn encode(seq: u8, colors: impl IntoIterator<Item = (u16, Point)>) -> Vec<u8> {
    let colors = colors.into_iter();
    let mut buf = Vec::with_capacity(HEADER_LEN + RECORD_LEN * colors.size_hint().0);

    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION);
    buf.push(seq);
    buf.extend_from_slice(&[0x00, 0x00]);
    buf.push(ColorMode::XyBrightness as u8);
    buf.push(0x00);

    for (id, point) in colors {
        buf.extend_from_slice(&[0x00, 0x00, (id & 0xFF) as u8]);
        for component in [point.x, point.y, point.brightness] {
            buf.extend_from_slice(&scale(component).to_be_bytes());
        }
    }
    buf
}

/// One decoded light record, still in wire units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightRecord {
    pub id: u8,
    pub x: u16,
    pub y: u16,
    pub brightness: u16,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub seq: u8,
    pub mode: ColorMode,
    pub lights: Vec<LightRecord>,
}

impl StreamFrame {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(Error::stream("decode", "missing HueStream header"));
        }
        if (bytes.len() - HEADER_LEN) % RECORD_LEN != 0 {
            return Err(Error::stream(
                "decode",
                format!("{} trailing bytes", (bytes.len() - HEADER_LEN) % RECORD_LEN),
            ));
        }

        let word = |r: &[u8], at: usize| u16::from_be_bytes([r[at], r[at + 1]]);
        let lights = bytes[HEADER_LEN..]
            .chunks_exact(RECORD_LEN)
            .map(|r| LightRecord {
                id: r[2],
                x: word(r, 3),
                y: word(r, 5),
                brightness: word(r, 7),
            })
            .collect();

        Ok(Self {
            seq: bytes[11],
            mode: ColorMode::try_from(bytes[14])?,
            lights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = encode(42, []);
        assert_eq!(
            bytes,
            [
                b'H', b'u', b'e', b'S', b't', b'r', b'e', b'a', b'm', 0x01, 0x00, 42, 0x00, 0x00,
                0x01, 0x00
            ]
        );
    }

    #[test]
    fn test_records_are_scaled_and_ordered() {
        let colors = [
            (2, Point::new(0.3, 0.4, 0.5)),
            (9, Point::new(0.7, 0.2, 1.0)),
            (1, Point::new(0.1, 0.1, 0.0)),
        ];
        let bytes = encode(0, colors);
        assert_eq!(bytes.len(), HEADER_LEN + 3 * RECORD_LEN);

        let frame = StreamFrame::decode(&bytes).unwrap();
        assert_eq!(frame.mode, ColorMode::XyBrightness);
        let ids: Vec<u8> = frame.lights.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 9, 1]);

        for (record, (_, point)) in frame.lights.iter().zip(colors) {
            assert_eq!(record.x, (point.x() * 65535.0).round() as u16);
            assert_eq!(record.y, (point.y() * 65535.0).round() as u16);
            assert_eq!(record.brightness, (point.brightness() * 65535.0).round() as u16);
        }
    }

    #[test]
    fn test_ids_truncate_to_low_byte() {
        let bytes = encode(0, [(0x0105, Point::default())]);
        assert_eq!(bytes[HEADER_LEN + 2], 0x05);
    }

    #[test]
    fn test_scale_clamps() {
        assert_eq!(scale(-0.5), 0);
        assert_eq!(scale(1.5), 0xFFFF);
        assert_eq!(scale(0.5), 32768);
        assert_eq!(scale(f64::NAN), 0);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(StreamFrame::decode(b"short").is_err());
        assert!(StreamFrame::decode(&[0u8; 16]).is_err());

        let mut bytes = encode(0, [(1, Point::default())]);
        bytes.pop();
        assert!(StreamFrame::decode(&bytes).is_err());
    }
}
