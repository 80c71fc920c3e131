//! Request layer.
//!
//! Turns the raw query string of a conversion request into a typed,
//! validated [`NormalizedRequest`]. Everything downstream (argument
//! compilation, fingerprinting) works on that value only.
//!
//! # Query Parameters
//!
//! | Parameter  | Form                               | Notes                          |
//! |------------|------------------------------------|--------------------------------|
//! | `source`   | `http(s)://…`                      | required                       |
//! | `size`     | `W`, `/H` or `W/H`                 | even, positive integers        |
//! | `trim`     | `from`, `/to` or `from/to`         | `hh:mm:ss.sss`                 |
//! | `format`   | `h264`, `av1`, `jpg`               | defaults to `h264`             |
//! | `fps`      | positive number                    |                                |
//! | `quality`  | 0–100                              | rounded, clamped               |
//! | `keyframe` | non-negative integer               | fractions rejected             |
//! | `key`      | any string                         | attribution only, not hashed   |

mod normalize;
mod time;

pub use normalize::{attribution_key, normalize, QueryFields};
pub use time::{parse_time_ms, TIME_FORMAT_HINT};

use std::fmt;

/// Output formats the gateway can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// H.264 in fragmented MP4
    #[default]
    H264,
    /// AV1 (SVT-AV1) in fragmented MP4
    Av1,
    /// A single JPEG frame
    Jpg,
}

impl OutputFormat {
    /// All formats, in the order they are listed to users.
    pub const ALL: [OutputFormat; 3] = [OutputFormat::H264, OutputFormat::Av1, OutputFormat::Jpg];

    /// Parse the public name of a format.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.name() == name)
    }

    /// Public name as used in the `format` query parameter.
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::H264 => "h264",
            OutputFormat::Av1 => "av1",
            OutputFormat::Jpg => "jpg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated conversion request.
///
/// Built once per request by [`normalize`] and never mutated afterwards.
/// Invariants upheld by the normalizer:
/// - `source` starts with `http://` or `https://`
/// - `width` and `height`, when present, are even and positive
/// - `trim_end_ms`, when present, is strictly greater than `trim_start_ms` (or 0)
/// - `quality`, when present, is within 0–100
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    /// Source media URL
    pub source: String,

    /// Output width in pixels
    pub width: Option<u32>,

    /// Output height in pixels
    pub height: Option<u32>,

    /// Trim start, milliseconds from the beginning of the source
    pub trim_start_ms: Option<u64>,

    /// Trim end, milliseconds from the beginning of the source
    pub trim_end_ms: Option<u64>,

    /// Output format
    pub format: OutputFormat,

    /// Output frame rate
    pub fps: Option<f64>,

    /// Public quality, 0 (worst) to 100 (best)
    pub quality: Option<u8>,

    /// Distance between keyframes, in frames
    pub keyframe_interval: Option<u32>,
}

impl NormalizedRequest {
    /// A request for `source` with every optional parameter absent.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            width: None,
            height: None,
            trim_start_ms: None,
            trim_end_ms: None,
            format: OutputFormat::default(),
            fps: None,
            quality: None,
            keyframe_interval: None,
        }
    }
}
