//! Stream helpers shared by the header and payload codecs
//!
//! The transport only promises `read(buf) -> n` and `write(buf) -> n`.
//! Both may transfer fewer bytes than asked for, or fail with
//! `Interrupted`; these helpers loop until the whole buffer has moved.

use std::io::{self, Read, Write};

/// Write every byte of `buf`, retrying short writes and interruptions.
///
/// Returns the number of bytes written, which is always `buf.len()` on success.
pub fn write_full<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;

    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "stream accepted zero bytes",
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(written)
}

/// Fill `buf` from `reader` until it is full or the stream ends.
///
/// Unlike `read_exact`, end-of-stream is not an error here: the number of
/// bytes actually read is returned so callers can tell a clean close
/// (0 bytes) from a truncated one (`0 < n < buf.len()`).
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}
