//! Protocol module - Defines the wire format for typed payload frames
//!
//! Every frame is a fixed 5 byte header followed by the body:
//! - 1 byte type tag (0x01 binary, 0x02 text)
//! - 4 bytes body length (big-endian)
//! - `length` bytes of raw body
//!
//! There is no magic number, version or checksum. Framing relies on the
//! underlying stream being reliable and ordered. After a decode error the
//! stream position is undefined and there is no way to resynchronize.

mod codec;
mod header;
mod payload;
pub mod stream;

pub use codec::*;
pub use header::*;
pub use payload::*;

/// Header size: type(1) + length(4) = 5 bytes
pub const HEADER_SIZE: usize = 5;

/// Default ceiling on a declared body length (10 MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;
