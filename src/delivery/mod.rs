//! Response delivery.
//!
//! - [`range`]: `Range` header parsing
//! - [`assemble`]: response construction for live and cached renditions
//! - [`tee`]: copies live output to the cache uploader while it streams

pub mod assemble;
pub mod range;
pub mod tee;

pub use assemble::{cached_response, live_response, CacheStatus, X_CACHE};
pub use range::{is_whole_resource, parse_range, ByteRange};
pub use tee::{tee, TeeStream};
