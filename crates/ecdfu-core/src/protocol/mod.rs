//! Protocol module - update protocol definitions.

pub mod constants;
pub mod header;
pub mod status;

pub use constants::*;
pub use header::{FirstResponsePdu, HeaderError, StartResponse, UpdateFrameHeader};
pub use status::BlockStatus;
