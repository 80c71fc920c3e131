//! Linear mapping between the public quality scale and encoder scales.
//!
//! Encoder scales are given as `(worst, best)` pairs, so a scale can run in
//! either direction: CRF goes down as quality goes up, the public scale goes up.

use crate::error::ScaleError;

/// A closed numeric interval, `(worst, best)`.
pub type Scale = (f64, f64);

/// Public quality scale exposed through the `quality` parameter.
pub const PUBLIC_SCALE: Scale = (0.0, 100.0);

/// libx264 constant rate factor.
pub const H264_CRF: Scale = (51.0, 0.0);

/// libsvtav1 constant rate factor.
pub const AV1_CRF: Scale = (63.0, 0.0);

/// MJPEG `-q:v`.
pub const JPEG_QSCALE: Scale = (31.0, 1.0);

/// Map `value` from scale `from` onto scale `to`.
///
/// The relative position of `value` within `from` is preserved. A degenerate
/// source scale maps everything to the start of `to`.
pub fn map_quality(from: Scale, to: Scale, value: f64) -> Result<f64, ScaleError> {
    let (a, b) = from;
    let (c, d) = to;
    let (low, high) = if a <= b { (a, b) } else { (b, a) };

    if !(low..=high).contains(&value) {
        return Err(ScaleError::OutOfRange { value, from: a, to: b });
    }
    if a == b {
        return Ok(c);
    }

    Ok(c + (value - a) / (b - a) * (d - c))
}
