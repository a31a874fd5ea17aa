//! Wire format shared with the PyMOL socket plugin.
//!
//! Every message is a single JSON object on its own line. JSON escaping keeps
//! raw newlines out of the payload, so `\n` unambiguously ends a frame.

use std::{io, marker::PhantomData};

use bytes::{BufMut, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

/// Well-known port the socket plugin listens on.
pub const DEFAULT_PORT: u16 = 9880;

/// Upper bound for a single frame.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Requests sent from the client to PyMOL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Execute { code: String },
}

/// Replies sent from PyMOL to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    /// The code ran; `output` is whatever it printed or returned.
    Success {
        #[serde(default)]
        output: String,
    },
    /// The code raised inside PyMOL.
    Error { error: String },
}

/// Newline-delimited JSON codec, decoding `In` and encoding `Out`.
///
/// The client uses `JsonLines<Response, Request>`; a server uses the mirror image.
#[derive(Debug)]
pub struct JsonLines<In, Out> {
    /// Bytes already scanned for a newline in the current frame.
    scanned: usize,
    max_len: usize,
    _marker: PhantomData<fn(Out) -> In>,
}

impl<In, Out> JsonLines<In, Out> {
    pub const fn new() -> Self {
        Self::with_max_len(MAX_FRAME_LEN)
    }

    pub const fn with_max_len(max_len: usize) -> Self {
        Self {
            scanned: 0,
            max_len,
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for JsonLines<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned, Out> Decoder for JsonLines<In, Out> {
    type Item = In;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<In>, Error> {
        loop {
            let Some(offset) = src[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = src.len();
                if self.scanned > self.max_len {
                    return Err(frame_too_long(self.max_len));
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            if end > self.max_len {
                return Err(frame_too_long(self.max_len));
            }

            let line = src.split_to(end + 1);
            let body = line[..end].strip_suffix(b"\r").unwrap_or(&line[..end]);
            if body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            tracing::trace!("Decoded frame of {} bytes", body.len());
            return Ok(Some(serde_json::from_slice(body)?));
        }
    }
}

impl<In, Out: Serialize> Encoder<Out> for JsonLines<In, Out> {
    type Error = Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Error> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

fn frame_too_long(max_len: usize) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidData,
        format!("frame exceeds {max_len} bytes"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    type ClientCodec = JsonLines<Response, Request>;
    type ServerCodec = JsonLines<Request, Response>;

    #[test]
    fn test_request_wire_shape() {
        let mut buf = BytesMut::new();
        ClientCodec::new()
            .encode(
                Request::Execute {
                    code: "cmd.fetch('1ubq')\nprint(1)".to_string(),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(
            &buf[..],
            b"{\"type\":\"execute\",\"code\":\"cmd.fetch('1ubq')\\nprint(1)\"}\n"
        );
    }

    #[test]
    fn test_response_without_output_is_empty() {
        let mut buf = BytesMut::from(&b"{\"status\":\"success\"}\n"[..]);
        let resp = ClientCodec::new().decode(&mut buf).unwrap();
        assert_eq!(
            resp,
            Some(Response::Success {
                output: String::new()
            })
        );
    }

    #[test]
    fn test_partial_frame_waits_for_newline() {
        let mut codec = ClientCodec::new();
        let mut buf = BytesMut::from(&b"{\"status\":\"succ"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"ess\",\"output\":\"4\\n\"}\r\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Response::Success {
                output: "4\n".to_string()
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut buf = BytesMut::from(&b"\n\r\n{\"type\":\"execute\",\"code\":\"x\"}\n"[..]);
        let req = ServerCodec::new().decode(&mut buf).unwrap();
        assert_eq!(
            req,
            Some(Request::Execute {
                code: "x".to_string()
            })
        );
    }

    #[test]
    fn test_truncated_frame_at_eof_is_an_error() {
        let mut buf = BytesMut::from(&b"{\"status\":\"success\",\"out"[..]);
        assert!(ClientCodec::new().decode_eof(&mut buf).is_err());
    }

    #[test]
    fn test_garbled_frame_is_an_error() {
        let mut buf = BytesMut::from(&b"not json at all\n"[..]);
        assert!(matches!(
            ClientCodec::new().decode(&mut buf),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut codec = ClientCodec::with_max_len(8);
        let mut buf = BytesMut::from(&b"{\"status\":\"success\""[..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
