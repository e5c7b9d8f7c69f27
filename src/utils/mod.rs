//! Utility functions and helpers.

pub mod cancel;
pub mod http;
pub mod mock;
pub mod path;
pub mod timestamp;

pub use cancel::CancelToken;
pub use http::{ByteStream, HttpResponse, ReqwestTransport, Transport};
pub use mock::MockTransport;
pub use path::normalize_path;
pub use timestamp::validate_timestamp;
