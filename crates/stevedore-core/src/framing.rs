//! Newline framing for long-lived response bodies.
//!
//! [`LineFramer`] splits a body into `\n`-terminated lines without ever
//! holding more than [`MAX_LINE_LENGTH`] bytes of one line. A line that runs
//! past the limit is reported once as [`Frame::Oversized`] and the rest of it
//! is discarded up to the next newline.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};

use crate::transport::{BodyReader, ResponseBody};

/// Longest line accepted from a stream, excluding the newline.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// One unit cut from a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its trailing `\n`.
    Line(Bytes),
    /// A line longer than the limit; its bytes were dropped.
    Oversized,
}

/// [`Decoder`] producing bounded lines.
#[derive(Debug)]
pub struct LineFramer {
    max_length: usize,
    /// Bytes of the buffer already searched for a newline.
    scanned: usize,
    /// Inside an oversized line, dropping input until the next newline.
    discarding: bool,
}

impl LineFramer {
    /// Framer accepting lines of at most `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            scanned: 0,
            discarding: false,
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for LineFramer {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        loop {
            let newline = buf[self.scanned..].iter().position(|b| *b == b'\n');
            match newline {
                Some(offset) => {
                    let end = self.scanned + offset;
                    self.scanned = 0;
                    if self.discarding {
                        buf.advance(end + 1);
                        self.discarding = false;
                        continue;
                    }
                    if end > self.max_length {
                        buf.advance(end + 1);
                        return Ok(Some(Frame::Oversized));
                    }
                    let line = buf.split_to(end).freeze();
                    buf.advance(1);
                    return Ok(Some(Frame::Line(line)));
                }
                None if self.discarding => {
                    buf.clear();
                    self.scanned = 0;
                    return Ok(None);
                }
                None if buf.len() > self.max_length => {
                    buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Ok(Some(Frame::Oversized));
                }
                None => {
                    self.scanned = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        self.scanned = 0;
        if buf.is_empty() || self.discarding {
            buf.clear();
            return Ok(None);
        }
        // Final line without a newline
        Ok(Some(Frame::Line(buf.split().freeze())))
    }
}

/// Frame a response body into bounded lines.
pub fn lines(body: ResponseBody) -> FramedRead<BodyReader, LineFramer> {
    FramedRead::new(body.into_reader(), LineFramer::default())
}
