//! Frame header: 1 byte type tag followed by a 4 byte big-endian length

use std::fmt;
use std::io::{Read, Write};

use super::stream::{read_full, write_full};
use super::{CodecError, HEADER_SIZE};

/// Wire discriminant identifying the payload variant carried by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Binary = 0x01,
    Text = 0x02,
}

impl TypeTag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(TypeTag::Binary),
            0x02 => Ok(TypeTag::Text),
            other => Err(CodecError::UnknownType(other)),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Binary => write!(f, "binary"),
            TypeTag::Text => write!(f, "text"),
        }
    }
}

/// A decoded header.
///
/// The tag is kept as the raw byte so that the size guard can run before
/// the tag is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub tag: u8,
    pub length: u32,
}

impl FrameHeader {
    pub fn new(tag: TypeTag, length: u32) -> Self {
        Self {
            tag: tag.as_u8(),
            length,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let len = self.length.to_be_bytes();
        [self.tag, len[0], len[1], len[2], len[3]]
    }

    pub fn from_bytes(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            tag: bytes[0],
            length: u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
        }
    }
}

/// Write a header to the stream, returning the number of bytes written (always 5)
pub fn write_header<W: Write + ?Sized>(
    writer: &mut W,
    tag: TypeTag,
    length: u32,
) -> Result<usize, CodecError> {
    let bytes = FrameHeader::new(tag, length).to_bytes();
    Ok(write_full(writer, &bytes)?)
}

/// Read the next header from the stream.
///
/// Returns `Ok(None)` when the stream ends exactly at a frame boundary.
/// Ending anywhere inside the 5 header bytes is a truncation.
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Option<FrameHeader>, CodecError> {
    let mut bytes = [0u8; HEADER_SIZE];

    match read_full(reader, &mut bytes)? {
        0 => Ok(None),
        HEADER_SIZE => Ok(Some(FrameHeader::from_bytes(bytes))),
        read => Err(CodecError::TruncatedHeader { read }),
    }
}
