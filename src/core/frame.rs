// Length-prefixed JSON framing shared by both host protocols.
//
// Frame layout: [u32 LE length][length bytes of UTF-8 JSON]
use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::error::{Error, ErrorKind, socket_error_kind};

pub const FRAME_HEADER_LEN: usize = 4;
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

pub fn encode_frame<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    let payload = serde_json::to_vec(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode frame payload")
            .with_source(err)
    })?;
    let length = checked_len(payload.len())?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn write_frame<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    value: &T,
) -> Result<(), Error> {
    let frame = encode_frame(value)?;
    writer
        .write_all(&frame)
        .and_then(|()| writer.flush())
        .map_err(|err| {
            Error::new(socket_error_kind(&err))
                .with_message("failed to send frame")
                .with_source(err)
        })
}

fn checked_len(len: usize) -> Result<u32, Error> {
    if len > MAX_FRAME_LEN {
        return Err(Error::new(ErrorKind::Framing)
            .with_message(format!("frame payload of {len} bytes exceeds {MAX_FRAME_LEN}")));
    }
    u32::try_from(len).map_err(|err| {
        Error::new(ErrorKind::Framing)
            .with_message("frame too large")
            .with_source(err)
    })
}

/// Blocking frame decoder over any byte stream.
///
/// `decode_next` yields `Ok(None)` only when the peer closes cleanly between
/// frames. A close inside a header or body is a `Framing` error.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn decode_next(&mut self) -> Result<Option<Value>, Error> {
        match self.next_payload()? {
            Some(payload) => parse_payload(&payload).map(Some),
            None => Ok(None),
        }
    }

    pub fn decode_next_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>, Error> {
        match self.decode_next()? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|err| {
                Error::new(ErrorKind::Decode)
                    .with_message("frame payload has an unexpected shape")
                    .with_source(err)
            }),
            None => Ok(None),
        }
    }

    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, Error> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        let filled = read_full(&mut self.inner, &mut header)?;
        if filled == 0 {
            return Ok(None);
        }
        if filled < FRAME_HEADER_LEN {
            return Err(Error::new(ErrorKind::Framing).with_message(format!(
                "connection closed after {filled} of {FRAME_HEADER_LEN} header bytes"
            )));
        }

        let length = u32::from_le_bytes(header) as usize;
        if length > MAX_FRAME_LEN {
            return Err(Error::new(ErrorKind::Framing)
                .with_message(format!("frame length {length} exceeds {MAX_FRAME_LEN}")));
        }

        let mut payload = vec![0u8; length];
        let filled = read_full(&mut self.inner, &mut payload)?;
        if filled < length {
            return Err(Error::new(ErrorKind::Framing).with_message(format!(
                "connection closed after {filled} of {length} payload bytes"
            )));
        }
        Ok(Some(payload))
    }
}

// Loops over short reads; returns fewer bytes than requested only on EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                let message = if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) {
                    "timed out waiting for host"
                } else {
                    "failed to receive from host"
                };
                return Err(Error::new(socket_error_kind(&err))
                    .with_message(message)
                    .with_source(err));
            }
        }
    }
    Ok(filled)
}

fn parse_payload(payload: &[u8]) -> Result<Value, Error> {
    let text = std::str::from_utf8(payload).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("frame payload is not valid UTF-8")
            .with_source(err)
    })?;
    serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Decode)
            .with_message("frame payload is not valid JSON")
            .with_source(err)
    })
}
