//! Transcoding layer.
//!
//! - [`quality`] maps the public 0–100 quality onto encoder scales
//! - [`args`] compiles a [`NormalizedRequest`](crate::request::NormalizedRequest)
//!   into a transcoder argument vector
//! - [`progress`] parses the transcoder's diagnostic output
//! - [`process`] spawns and supervises the transcoder

pub mod args;
pub mod process;
pub mod progress;
pub mod quality;

pub use args::{compile, CompiledInvocation, FileType};
pub use process::{
    AsyncErrorCallback, Canceller, Outcome, OutputStream, TranscodeHandle, Transcoder,
};
pub use progress::{DiagnosticParser, Progress};
pub use quality::map_quality;
