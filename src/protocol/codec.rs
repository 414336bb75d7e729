//! Protocol codec for encoding/decoding payloads
//!
//! Two front ends share one wire format:
//! - blocking `encode`/`decode` over `std::io` streams
//! - `FrameEncoder`/`FrameDecoder` over `BytesMut`, for callers that
//!   buffer reads themselves (see `transport::Connection`)

use bytes::{Buf, BufMut, BytesMut};
use std::io::{self, Read, Write};
use std::string::FromUtf8Error;
use thiserror::Error;

use super::header::{read_header, TypeTag};
use super::{Payload, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Truncated header: stream ended after {read} of 5 bytes")]
    TruncatedHeader { read: usize },

    #[error("Max payload size exceeded: {size} bytes (max: {max})")]
    MaxPayloadSize { size: usize, max: usize },

    #[error("Truncated body: stream ended after {read} of {expected} bytes")]
    TruncatedBody { expected: usize, read: usize },

    #[error("Unknown payload type: {0:#04x}")]
    UnknownType(u8),

    #[error("Text payload is not valid UTF-8: {0}")]
    InvalidText(#[from] FromUtf8Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reject a declared body length above `max`.
///
/// Runs before any buffer is allocated for the body.
pub fn check_max_size(size: usize, max: usize) -> Result<(), CodecError> {
    if size > max {
        return Err(CodecError::MaxPayloadSize { size, max });
    }
    Ok(())
}

/// Write one payload frame, returning the number of bytes written
pub fn encode<W: Write + ?Sized>(writer: &mut W, payload: &Payload) -> Result<usize, CodecError> {
    payload.write_to(writer)
}

/// Decode the next frame using [`DEFAULT_MAX_PAYLOAD_SIZE`].
///
/// Returns `Ok(None)` when the stream ends cleanly between frames. On error
/// the stream is left at an undefined position and should be closed.
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Payload>, CodecError> {
    decode_with_limit(reader, DEFAULT_MAX_PAYLOAD_SIZE)
}

/// Decode the next frame, refusing bodies larger than `max`
pub fn decode_with_limit<R: Read + ?Sized>(
    reader: &mut R,
    max: usize,
) -> Result<Option<Payload>, CodecError> {
    let header = match read_header(reader)? {
        Some(header) => header,
        None => return Ok(None),
    };

    let length = header.length as usize;
    if let Err(e) = check_max_size(length, max) {
        tracing::warn!("Rejecting frame: {}", e);
        return Err(e);
    }

    let tag = match TypeTag::try_from(header.tag) {
        Ok(tag) => tag,
        Err(e) => {
            tracing::warn!("Rejecting frame: {}", e);
            return Err(e);
        }
    };

    let payload = Payload::read_body(reader, tag, length)?;
    tracing::debug!("Decoded {} frame ({} bytes)", tag, length);

    Ok(Some(payload))
}

/// Iterator over the frames of a blocking stream.
///
/// Ends at a clean end-of-stream and stops for good after the first error.
pub struct Frames<R> {
    reader: R,
    max_payload_size: usize,
    done: bool,
}

impl<R: Read> Frames<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_payload_size(reader, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload_size(reader: R, max_payload_size: usize) -> Self {
        Self {
            reader,
            max_payload_size,
            done: false,
        }
    }
}

impl<R: Read> Iterator for Frames<R> {
    type Item = Result<Payload, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match decode_with_limit(&mut self.reader, self.max_payload_size) {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Encodes payloads into a buffer
pub struct FrameEncoder {
    max_payload_size: usize,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::with_max_payload_size(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Append one frame to `buf`
    pub fn encode(&self, payload: &Payload, buf: &mut BytesMut) -> Result<(), CodecError> {
        let length = payload.wire_length(self.max_payload_size)?;

        buf.reserve(payload.encoded_len());
        buf.put_u8(payload.tag().as_u8());
        buf.put_u32(length);
        buf.put_slice(payload.body());

        Ok(())
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes payloads from a buffer that fills up over time
pub struct FrameDecoder {
    state: DecodeState,
    max_payload_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
enum DecodeState {
    #[default]
    Header,
    Body {
        tag: TypeTag,
        length: usize,
    },
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_payload_size(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            state: DecodeState::Header,
            max_payload_size,
        }
    }

    /// True when no partially decoded frame is pending
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Header)
    }

    /// Body length still awaited, if a header has been consumed
    pub fn pending_body(&self) -> Option<usize> {
        match self.state {
            DecodeState::Header => None,
            DecodeState::Body { length, .. } => Some(length),
        }
    }

    /// Attempt to decode a payload from the buffer.
    /// Returns Ok(None) if more data is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Payload>, CodecError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let raw_tag = buf[0];
                    let length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;

                    if let Err(e) = check_max_size(length, self.max_payload_size) {
                        tracing::warn!("Rejecting frame: {}", e);
                        return Err(e);
                    }

                    let tag = match TypeTag::try_from(raw_tag) {
                        Ok(tag) => tag,
                        Err(e) => {
                            tracing::warn!("Rejecting frame: {}", e);
                            return Err(e);
                        }
                    };

                    buf.advance(HEADER_SIZE);
                    self.state = DecodeState::Body { tag, length };
                }
                DecodeState::Body { tag, length } => {
                    if buf.len() < length {
                        return Ok(None);
                    }

                    let body = buf.split_to(length);
                    self.state = DecodeState::Header;

                    return Payload::from_body(tag, body.to_vec()).map(Some);
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::stream::fakes::{BrokenStream, TrickleReader};
    use std::io::Cursor;

    fn scenario() -> Vec<Payload> {
        vec![
            Payload::binary(b"Clear is better than clever.".to_vec()),
            Payload::text("Errors are values."),
            Payload::binary(b"Don't panic.".to_vec()),
        ]
    }

    fn header(tag: u8, length: u32) -> Vec<u8> {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes
    }

    #[test]
    fn test_payloads_in_order() {
        let payloads = scenario();
        let mut stream: Vec<u8> = Vec::new();
        for p in &payloads {
            encode(&mut stream, p).unwrap();
        }

        let mut reader = TrickleReader::new(stream, 7);
        for expected in &payloads {
            let actual = decode(&mut reader).unwrap().unwrap();
            assert_eq!(&actual, expected);
        }
        assert!(decode(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_max_payload_size() {
        let mut reader = Cursor::new(header(TypeTag::Binary.as_u8(), 1 << 30));

        let err = decode(&mut reader).unwrap_err();
        assert!(matches!(err, CodecError::MaxPayloadSize { size, .. } if size == 1 << 30));
    }

    #[test]
    fn test_max_plus_one_leaves_body_unread() {
        let max = 64;
        let mut bytes = header(TypeTag::Text.as_u8(), max as u32 + 1);
        bytes.extend_from_slice(&[b'x'; 65]);
        let mut reader = Cursor::new(bytes);

        let err = decode_with_limit(&mut reader, max).unwrap_err();
        assert!(matches!(err, CodecError::MaxPayloadSize { size: 65, max: 64 }));
        assert_eq!(reader.position(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_exactly_max_is_accepted() {
        let mut bytes = header(TypeTag::Binary.as_u8(), 4);
        bytes.extend_from_slice(b"abcd");

        let payload = decode_with_limit(&mut Cursor::new(bytes), 4).unwrap().unwrap();
        assert_eq!(payload, Payload::binary(b"abcd".to_vec()));
    }

    #[test]
    fn test_truncated_body() {
        let mut bytes = header(TypeTag::Binary.as_u8(), 10);
        bytes.extend_from_slice(b"short");

        match decode(&mut Cursor::new(bytes)) {
            Err(CodecError::TruncatedBody { expected, read }) => {
                assert_eq!(expected, 10);
                assert_eq!(read, 5);
            }
            other => panic!("expected truncated body, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_does_not_consume_body() {
        let mut bytes = header(0xFF, 3);
        bytes.extend_from_slice(b"abc");
        let mut reader = Cursor::new(bytes);

        let err = decode(&mut reader).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(0xFF)));
        assert_eq!(reader.position(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_size_guard_runs_before_type_check() {
        let mut reader = Cursor::new(header(0xFF, u32::MAX));
        assert!(matches!(
            decode(&mut reader),
            Err(CodecError::MaxPayloadSize { .. })
        ));
    }

    #[test]
    fn test_io_errors_surface() {
        let mut stream = BrokenStream(io::ErrorKind::ConnectionReset);
        match decode(&mut stream) {
            Err(CodecError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_frames_iterator() {
        let mut stream: Vec<u8> = Vec::new();
        for p in &scenario() {
            encode(&mut stream, p).unwrap();
        }

        let decoded: Result<Vec<_>, _> = Frames::new(Cursor::new(stream)).collect();
        assert_eq!(decoded.unwrap(), scenario());
    }

    #[test]
    fn test_frames_stops_after_error() {
        let mut stream: Vec<u8> = Vec::new();
        encode(&mut stream, &Payload::text("ok")).unwrap();
        stream.extend_from_slice(&header(0x7F, 0));
        encode(&mut stream, &Payload::text("never reached")).unwrap();

        let mut frames = Frames::new(Cursor::new(stream));
        assert_eq!(frames.next().unwrap().unwrap(), Payload::text("ok"));
        assert!(matches!(frames.next(), Some(Err(CodecError::UnknownType(0x7F)))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_encoder_matches_stream_encoding() {
        let encoder = FrameEncoder::new();
        for p in scenario() {
            let mut buf = BytesMut::new();
            encoder.encode(&p, &mut buf).unwrap();

            let mut direct: Vec<u8> = Vec::new();
            p.write_to(&mut direct).unwrap();
            assert_eq!(&buf[..], &direct[..]);
        }
    }

    #[test]
    fn test_decoder_byte_by_byte() {
        let encoder = FrameEncoder::new();
        let mut wire = BytesMut::new();
        for p in &scenario() {
            encoder.encode(p, &mut wire).unwrap();
        }

        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();

        for byte in wire.iter() {
            buf.put_u8(*byte);
            while let Some(p) = decoder.decode(&mut buf).unwrap() {
                decoded.push(p);
            }
        }

        assert_eq!(decoded, scenario());
        assert!(decoder.is_idle());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decoder_guard_fires_on_header() {
        let mut decoder = FrameDecoder::with_max_payload_size(8);
        let mut buf = BytesMut::from(&header(TypeTag::Binary.as_u8(), 9)[..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::MaxPayloadSize { size: 9, max: 8 }));
    }

    #[test]
    fn test_decoder_unknown_tag() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&header(0x7F, 2)[..]);
        buf.put_slice(b"zz");

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::UnknownType(0x7F)));
        assert_eq!(buf.len(), HEADER_SIZE + 2);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_tracks_pending_body() {
        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&header(TypeTag::Text.as_u8(), 4)[..]);
        buf.put_slice(b"ab");

        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(!decoder.is_idle());
        assert_eq!(decoder.pending_body(), Some(4));

        buf.put_slice(b"cd");
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(Payload::text("abcd")));
        assert!(decoder.is_idle());
    }
}
