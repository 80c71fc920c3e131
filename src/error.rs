use thiserror::Error;

/// A request parameter is missing or malformed.
///
/// The message is written for end users and always names the offending
/// parameter, so it can be returned verbatim in a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct QueryParameterError(pub String);

impl QueryParameterError {
    /// Create a new error with the given user-facing message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The user-facing message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Errors from mapping a value between two numeric scales
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScaleError {
    /// Value lies outside the closed source interval
    #[error("Value {value} is outside of source range ({from}–{to})")]
    OutOfRange { value: f64, from: f64, to: f64 },
}

/// Errors raised by the transcoder process
#[derive(Debug, Clone, Error)]
pub enum TranscodeError {
    /// The process could not be started at all
    #[error("Could not start transcoder: {0}")]
    Spawn(String),

    /// The transcoder reported that the source does not exist
    #[error("The URL you passed as source could not be accessed.")]
    SourceNotFound,

    /// The process exited successfully without writing any output
    #[error("Transcoder exited without producing any output")]
    EmptyOutput,

    /// The process exited abnormally
    #[error("Transcoder exited with code {}", code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    Failed {
        /// Exit code, `None` if the process was terminated by a signal
        code: Option<i32>,
        /// Tail of the diagnostic output, for logs only
        diagnostics: String,
    },

    /// Reading from the process pipes failed
    #[error("Transcoder I/O error: {0}")]
    Io(String),
}

impl TranscodeError {
    /// Message that is safe to show to clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            TranscodeError::SourceNotFound => "The URL you passed as source could not be accessed.",
            _ => "Could not convert video.",
        }
    }
}

/// Errors from parsing or satisfying a `Range` header
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Header does not use the `bytes=` unit
    #[error("Range header is expected to start with \"bytes=\"; is \"{0}\" instead")]
    MissingUnit(String),

    /// Header lists more than one range
    #[error("Multiple ranges are not supported: \"{0}\"")]
    MultipleRanges(String),

    /// Header does not contain exactly one start and/or one end
    #[error("Range header is expected to contain one start and/or one end; is \"{0}\" instead")]
    Malformed(String),

    /// A bound is not a non-negative integer
    #[error("Range header is expected to contain a number; is \"{0}\" instead")]
    NotANumber(String),

    /// Start lies after end
    #[error("Range start {start} is larger than range end {end}")]
    StartAfterEnd { start: u64, end: u64 },

    /// End lies beyond the last byte of the resource
    #[error("Range end {end} must be smaller than the content length {length}")]
    EndOutOfBounds { end: u64, length: u64 },

    /// No byte of the resource is covered by the range
    #[error("Range \"{range}\" cannot be satisfied for a resource of {length} bytes")]
    Unsatisfiable { range: String, length: u64 },
}

/// Object store errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Network or connection error while moving object bytes
    #[error("Connection error: {0}")]
    Connection(String),

    /// The artifact stream ended abnormally; nothing was committed
    #[error("Upload aborted: {0}")]
    Aborted(String),
}

/// Every error the conversion pipeline can surface before a response is committed.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Query(#[from] QueryParameterError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    /// Range could not be honoured for a resource of `length` bytes
    #[error("{error}")]
    Range { error: RangeError, length: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GatewayError {
    /// Attach the resource length to a range error.
    pub fn range(error: RangeError, length: u64) -> Self {
        GatewayError::Range { error, length }
    }
}
