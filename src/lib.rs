//! Wirepack - typed payload framing over ordered byte streams
//!
//! Frames carry either raw bytes or UTF-8 text behind a one byte type tag
//! and a big-endian length, with a size guard that rejects forged lengths
//! before any body memory is allocated.
//!
//! ```
//! use std::io::Cursor;
//! use wirepack::protocol::{decode, encode, Payload};
//!
//! let mut wire: Vec<u8> = Vec::new();
//! encode(&mut wire, &Payload::text("Errors are values.")).unwrap();
//! encode(&mut wire, &Payload::binary(b"Don't panic.".to_vec())).unwrap();
//!
//! let mut reader = Cursor::new(wire);
//! assert_eq!(decode(&mut reader).unwrap(), Some(Payload::text("Errors are values.")));
//! assert_eq!(decode(&mut reader).unwrap(), Some(Payload::binary(b"Don't panic.".to_vec())));
//! assert_eq!(decode(&mut reader).unwrap(), None);
//! ```

pub mod config;
pub mod protocol;
pub mod transport;

pub use protocol::{CodecError, Payload, TypeTag};
