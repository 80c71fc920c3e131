//! Incremental parser for the transcoder's diagnostic stream (stderr).
//!
//! FFmpeg writes status lines terminated by either `\n` or `\r`, and chunk
//! boundaries from the pipe can fall anywhere, so the parser keeps a carry
//! buffer of the incomplete trailing line.

use std::sync::LazyLock;

use regex::Regex;

use crate::request::parse_time_ms;

/// Upper bound on the retained diagnostics tail.
const TRANSCRIPT_LIMIT: usize = 64 * 1024;

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}\.\d{2,3})").expect("duration pattern is valid")
});

static POSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=\s*(\d+:\d{2}:\d{2}\.\d{2,3})").expect("position pattern is valid")
});

static THREADS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"threads=\s*(\d+)").expect("threads pattern is valid"));

/// Markers the transcoder prints when the input cannot be opened.
const SOURCE_MISSING_MARKERS: [&str; 3] = [
    "No such file or directory",
    "404 Not Found",
    "Server returned 404",
];

/// Latest known progress of a running transcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Source duration, as reported once in the stream header
    pub duration_ms: Option<u64>,
    /// Position of the last encoded frame
    pub position_ms: Option<u64>,
    /// Encoder thread count
    pub threads: Option<u32>,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, if both duration and position are known.
    pub fn ratio(&self) -> Option<f64> {
        match (self.duration_ms, self.position_ms) {
            (Some(duration), Some(position)) if duration > 0 => {
                Some((position as f64 / duration as f64).min(1.0))
            }
            _ => None,
        }
    }
}

/// Parser state for one transcoder run.
#[derive(Debug, Default)]
pub struct DiagnosticParser {
    carry: String,
    progress: Progress,
    source_missing: bool,
    transcript: String,
}

impl DiagnosticParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stderr.
    ///
    /// Returns `true` if the chunk changed the progress snapshot.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        let text = String::from_utf8_lossy(chunk);
        self.append_transcript(&text);
        self.carry.push_str(&text);

        let before = self.progress;
        while let Some(index) = self.carry.find(['\r', '\n']) {
            let line: String = self.carry.drain(..=index).collect();
            self.parse_line(line.trim_end_matches(['\r', '\n']));
        }
        self.progress != before
    }

    /// Flush the incomplete trailing line once the stream has ended.
    pub fn finish(&mut self) -> bool {
        let before = self.progress;
        let line = std::mem::take(&mut self.carry);
        self.parse_line(&line);
        self.progress != before
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    /// Whether the transcoder reported that the source cannot be found.
    pub fn source_missing(&self) -> bool {
        self.source_missing
    }

    /// Retained tail of the diagnostic output.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    fn parse_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        if self.progress.duration_ms.is_none() {
            if let Some(captures) = DURATION.captures(line) {
                self.progress.duration_ms = parse_time_ms(&captures[1]);
            }
        }

        if let Some(captures) = POSITION.captures(line) {
            if let Some(position) = parse_time_ms(&captures[1]) {
                self.progress.position_ms = Some(position);
            }
        }

        if let Some(captures) = THREADS.captures(line) {
            if let Ok(threads) = captures[1].parse() {
                self.progress.threads = Some(threads);
            }
        }

        if SOURCE_MISSING_MARKERS.iter().any(|m| line.contains(m)) {
            self.source_missing = true;
        }
    }

    fn append_transcript(&mut self, text: &str) {
        self.transcript.push_str(text);
        if self.transcript.len() > TRANSCRIPT_LIMIT {
            let mut cut = self.transcript.len() - TRANSCRIPT_LIMIT;
            while !self.transcript.is_char_boundary(cut) {
                cut += 1;
            }
            self.transcript.drain(..cut);
        }
    }
}
