//! Payload variants carried by frames

use std::fmt;
use std::io::{Read, Write};

use super::header::{write_header, TypeTag};
use super::stream::{read_full, write_full};
use super::{check_max_size, CodecError, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// A value that travels as exactly one frame.
///
/// Binary and text bodies are encoded identically (raw bytes); only the
/// type tag tells the decoder which variant to rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    /// Opaque bytes, compared byte-for-byte
    Binary(Vec<u8>),
    /// UTF-8 text
    Text(String),
}

impl Payload {
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Payload::Binary(bytes.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Wire tag for this variant
    pub fn tag(&self) -> TypeTag {
        match self {
            Payload::Binary(_) => TypeTag::Binary,
            Payload::Text(_) => TypeTag::Text,
        }
    }

    /// Raw body bytes as they appear on the wire
    pub fn body(&self) -> &[u8] {
        match self {
            Payload::Binary(bytes) => bytes.as_slice(),
            Payload::Text(text) => text.as_bytes(),
        }
    }

    /// Total frame size: header plus body
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body().len()
    }

    /// Body length as it goes into the header, checked against `max`.
    pub(crate) fn wire_length(&self, max: usize) -> Result<u32, CodecError> {
        let size = self.body().len();
        check_max_size(size, max)?;
        u32::try_from(size).map_err(|_| CodecError::MaxPayloadSize {
            size,
            max: u32::MAX as usize,
        })
    }

    /// Serialize this payload as one frame, returning the bytes written.
    ///
    /// Bodies larger than [`DEFAULT_MAX_PAYLOAD_SIZE`] are refused before
    /// anything reaches the stream.
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize, CodecError> {
        self.write_to_with_limit(writer, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Like [`Payload::write_to`] with an explicit size ceiling.
    pub fn write_to_with_limit<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        max: usize,
    ) -> Result<usize, CodecError> {
        let length = self.wire_length(max)?;

        let mut written = write_header(writer, self.tag(), length)?;
        written += write_full(writer, self.body())?;

        tracing::debug!("Wrote {} frame ({} bytes)", self.tag(), written);
        Ok(written)
    }

    /// Read a body of `length` bytes and build the variant named by `tag`.
    ///
    /// `length` must already have passed the size guard; the buffer is
    /// allocated at exactly that size.
    pub fn read_body<R: Read + ?Sized>(
        reader: &mut R,
        tag: TypeTag,
        length: usize,
    ) -> Result<Self, CodecError> {
        let mut body = vec![0u8; length];
        let read = read_full(reader, &mut body)?;
        if read < length {
            return Err(CodecError::TruncatedBody {
                expected: length,
                read,
            });
        }

        Self::from_body(tag, body)
    }

    /// Build a payload from a complete body
    pub fn from_body(tag: TypeTag, body: Vec<u8>) -> Result<Self, CodecError> {
        match tag {
            TypeTag::Binary => Ok(Payload::Binary(body)),
            TypeTag::Text => Ok(Payload::Text(String::from_utf8(body)?)),
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Binary(bytes) => {
                write!(f, "[binary] {} bytes {:?}", bytes.len(), String::from_utf8_lossy(bytes))
            }
            Payload::Text(text) => write!(f, "[text] {:?}", text),
        }
    }
}
