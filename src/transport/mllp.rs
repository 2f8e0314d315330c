//! MLLP framing codec
//!
//! Envelope: `0x0B` + message text + `0x1C` + `0x0D`. The decoder reassembles
//! frames split across reads, resynchronises on the next start byte after a
//! malformed envelope and yields framing faults as items instead of stream
//! errors, so one bad frame never tears the connection down.

use crate::domain::errors::FrameError;
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Start-of-block byte
pub const START_BLOCK: u8 = 0x0B;

/// End-of-block byte
pub const END_BLOCK: u8 = 0x1C;

/// Trailer following the end-of-block byte
pub const CARRIAGE_RETURN: u8 = 0x0D;

/// Default upper bound for one frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Decoded frame: the message text, or the reason the envelope was rejected
pub type Frame = Result<String, FrameError>;

/// Codec for `tokio_util::codec::Framed`
#[derive(Debug, Clone)]
pub struct MllpCodec {
    max_frame_bytes: usize,
    /// Buffer offset already scanned for delimiters
    scanned: usize,
    /// Dropping the remainder of an oversized frame
    discarding: bool,
}

impl Default for MllpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MllpCodec {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            scanned: 0,
            discarding: false,
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    fn skip_oversized(&mut self, src: &mut BytesMut) -> bool {
        match src.iter().position(|b| *b == END_BLOCK) {
            Some(end) => {
                let mut consumed = end + 1;
                if src.get(consumed) == Some(&CARRIAGE_RETURN) {
                    consumed += 1;
                }
                src.advance(consumed);
                self.discarding = false;
                true
            }
            None => {
                src.clear();
                false
            }
        }
    }
}

fn decode_text(payload: Vec<u8>) -> String {
    match String::from_utf8(payload) {
        Ok(text) => text,
        // HL7 v2 feeds are frequently ISO-8859-1
        Err(err) => err.into_bytes().into_iter().map(char::from).collect(),
    }
}

impl Decoder for MllpCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.discarding && !self.skip_oversized(src) {
            return Ok(None);
        }

        // Whitespace between frames is tolerated
        let leading = src.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if leading > 0 {
            src.advance(leading);
            self.scanned = 0;
        }
        if src.is_empty() {
            return Ok(None);
        }

        if src[0] != START_BLOCK {
            let discarded = src
                .iter()
                .position(|b| *b == START_BLOCK)
                .unwrap_or(src.len());
            src.advance(discarded);
            self.scanned = 0;
            return Ok(Some(Err(FrameError::MissingStartByte { discarded })));
        }

        let from = self.scanned.max(1);
        for idx in from..src.len() {
            match src[idx] {
                END_BLOCK => {
                    let Some(trailer) = src.get(idx + 1).copied() else {
                        self.scanned = idx;
                        return Ok(None);
                    };
                    self.scanned = 0;
                    if trailer != CARRIAGE_RETURN {
                        src.advance(idx + 1);
                        return Ok(Some(Err(FrameError::MissingTrailer)));
                    }
                    if idx - 1 > self.max_frame_bytes {
                        src.advance(idx + 2);
                        return Ok(Some(Err(FrameError::Oversized {
                            limit: self.max_frame_bytes,
                        })));
                    }
                    let frame = src.split_to(idx + 2);
                    let payload = frame[1..idx].to_vec();
                    return Ok(Some(Ok(decode_text(payload))));
                }
                START_BLOCK => {
                    self.scanned = 0;
                    src.advance(idx);
                    return Ok(Some(Err(FrameError::Truncated { received: idx - 1 })));
                }
                _ => {}
            }
        }

        if src.len() - 1 > self.max_frame_bytes {
            src.clear();
            self.scanned = 0;
            self.discarding = true;
            return Ok(Some(Err(FrameError::Oversized {
                limit: self.max_frame_bytes,
            })));
        }

        self.scanned = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.scanned = 0;
        if self.discarding || buf.iter().all(|b| b.is_ascii_whitespace()) {
            self.discarding = false;
            buf.clear();
            return Ok(None);
        }
        let pending = buf.len();
        buf.clear();
        Ok(Some(Err(FrameError::UnexpectedEof { pending })))
    }
}

impl Encoder<String> for MllpCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        check_payload(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        dst.reserve(item.len() + 3);
        dst.put_u8(START_BLOCK);
        dst.put_slice(item.as_bytes());
        dst.put_u8(END_BLOCK);
        dst.put_u8(CARRIAGE_RETURN);
        Ok(())
    }
}

fn check_payload(text: &str) -> Result<(), FrameError> {
    match text.bytes().find(|b| *b == START_BLOCK || *b == END_BLOCK) {
        Some(byte) => Err(FrameError::ControlByteInPayload(byte)),
        None => Ok(()),
    }
}

/// Wraps message text in an envelope
pub fn encode_frame(text: &str) -> Result<Vec<u8>, FrameError> {
    check_payload(text)?;
    let mut out = Vec::with_capacity(text.len() + 3);
    out.push(START_BLOCK);
    out.extend_from_slice(text.as_bytes());
    out.push(END_BLOCK);
    out.push(CARRIAGE_RETURN);
    Ok(out)
}

/// Decodes every frame in a complete byte sequence
pub fn decode_frames(bytes: &[u8]) -> Vec<Frame> {
    let mut codec = MllpCodec::new();
    let mut buf = BytesMut::from(bytes);
    let mut frames = Vec::new();
    while let Ok(Some(frame)) = codec.decode_eof(&mut buf) {
        frames.push(frame);
    }
    frames
}
