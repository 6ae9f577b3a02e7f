//! Frame reassembly for partial TCP reads.
//!
//! TCP has no message boundaries: a single read may carry half a frame,
//! several frames, or the tail of one frame and the head of the next. The
//! [`Reassembler`] accumulates bytes per connection and cuts them into
//! complete [`Frame`]s according to a [`FramingRule`]. One implementation
//! serves all three protocols.
//!
//! # Text rules
//!
//! ```text
//! "<oris,...>" "<oris,..." + ",...>"   ->   Frame("<oris,...") x2
//!   ^ split on terminator, trailing fragment kept for the next read
//! ```
//!
//! Each segment is trimmed of surrounding whitespace and must start with one
//! of the rule's prefixes. Segments matching an ignore pattern (keep-alives)
//! are dropped silently. Anything else is invalid; after
//! [`MAX_INVALID_FRAMES`] invalid segments in a row the reassembler gives up
//! with [`DecodeError::TooManyInvalidFrames`].
//!
//! # Length-prefixed rule
//!
//! ```text
//! ┌────────────┬──────────────────┬────────────┐
//! │ length u16 │ payload (length) │ crc16 u16  │
//! └────────────┴──────────────────┴────────────┘
//! ```
//!
//! While at least 4 bytes are buffered the length is read. A length outside
//! `(0, max_len]` means the stream is desynchronized: the whole buffer is
//! dropped. Otherwise, once `2 + length + 2` bytes are available exactly one
//! frame is sliced off; unconsumed bytes wait for the next read.

use bytes::BytesMut;
use fleetgate_core::Protocol;
use fleetgate_core::constants::{MAX_BINARY_FRAME_LEN, MAX_INVALID_FRAMES, MAX_TEXT_BUFFER_SIZE};
use std::collections::VecDeque;
use tracing::{trace, warn};

use crate::error::{DecodeError, DecodeResult};
use crate::frame::Frame;

/// Initial buffer capacity, sized for a few device reads.
const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Length header plus CRC trailer of a binary frame.
const BINARY_OVERHEAD: usize = 4;

/// How a byte stream is cut into frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingRule {
    /// Frames end with `terminator`, which is stripped.
    Text {
        terminator: &'static [u8],
        prefixes: &'static [&'static [u8]],
        ignored: &'static [&'static [u8]],
    },
    /// `u16 length | payload | u16 crc`, frames kept whole.
    LengthPrefixed { max_len: usize },
}

impl FramingRule {
    /// Rule used by the listener for `protocol`.
    #[must_use]
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Neon => FramingRule::Text {
                terminator: b">",
                prefixes: &[b"<oris", b"#<oris"],
                ignored: &[b"#"],
            },
            Protocol::Geneko => FramingRule::Text {
                terminator: b"</fox>",
                prefixes: &[b"<fox>"],
                ignored: &[],
            },
            Protocol::Ruptela => FramingRule::LengthPrefixed {
                max_len: MAX_BINARY_FRAME_LEN,
            },
        }
    }
}

/// Per-connection frame reassembler.
///
/// # Example
///
/// ```
/// use fleetgate_core::Protocol;
/// use fleetgate_protocol::{FramingRule, Reassembler};
///
/// let mut reassembler = Reassembler::new(FramingRule::for_protocol(Protocol::Neon));
///
/// reassembler.feed(b"<oris,1,35630").unwrap();
/// assert!(reassembler.next_frame().is_none());
///
/// reassembler.feed(b"7042441013>").unwrap();
/// let frame = reassembler.next_frame().unwrap();
/// assert_eq!(frame.as_text().unwrap(), "<oris,1,356307042441013");
/// ```
#[derive(Debug)]
pub struct Reassembler {
    rule: FramingRule,
    buffer: BytesMut,
    frames: VecDeque<Frame>,
    invalid_streak: u32,
    max_invalid: u32,
}

impl Reassembler {
    pub fn new(rule: FramingRule) -> Self {
        Self {
            rule,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            frames: VecDeque::new(),
            invalid_streak: 0,
            max_invalid: MAX_INVALID_FRAMES,
        }
    }

    /// Override the consecutive-invalid-frame bound (text rules only).
    #[must_use]
    pub fn with_max_invalid(mut self, max_invalid: u32) -> Self {
        self.max_invalid = max_invalid.max(1);
        self
    }

    pub fn rule(&self) -> &FramingRule {
        &self.rule
    }

    /// Append bytes from the stream and cut out every complete frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::TooManyInvalidFrames`] once the invalid-frame
    /// bound is reached on a text stream. Frames extracted before the error
    /// remain available through [`next_frame`](Self::next_frame).
    pub fn feed(&mut self, bytes: &[u8]) -> DecodeResult<()> {
        self.buffer.extend_from_slice(bytes);
        match self.rule {
            FramingRule::Text {
                terminator,
                prefixes,
                ignored,
            } => self.extract_text(terminator, prefixes, ignored),
            FramingRule::LengthPrefixed { max_len } => {
                self.extract_length_prefixed(max_len);
                Ok(())
            }
        }
    }

    /// Next complete frame, in arrival order.
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn frames_available(&self) -> usize {
        self.frames.len()
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
        self.invalid_streak = 0;
    }

    fn extract_length_prefixed(&mut self, max_len: usize) {
        while self.buffer.len() >= BINARY_OVERHEAD {
            let length = u16::from_be_bytes([self.buffer[0], self.buffer[1]]) as usize;
            if length == 0 || length > max_len {
                warn!(
                    length,
                    max_len,
                    dropped = self.buffer.len(),
                    "Invalid binary frame length, dropping buffer"
                );
                self.buffer.clear();
                return;
            }

            let total = length + BINARY_OVERHEAD;
            if self.buffer.len() < total {
                trace!(have = self.buffer.len(), need = total, "Waiting for rest of frame");
                return;
            }

            let frame = self.buffer.split_to(total).freeze();
            self.frames.push_back(Frame::new(frame));
        }
    }

    fn extract_text(
        &mut self,
        terminator: &'static [u8],
        prefixes: &'static [&'static [u8]],
        ignored: &'static [&'static [u8]],
    ) -> DecodeResult<()> {
        while let Some(pos) = find(&self.buffer, terminator) {
            let mut segment = self.buffer.split_to(pos + terminator.len());
            segment.truncate(pos);
            let segment = segment.freeze();

            let start = segment.len() - segment.trim_ascii_start().len();
            let end = segment.trim_ascii_end().len().max(start);
            let frame = segment.slice(start..end);

            if frame.is_empty() || ignored.iter().any(|pattern| *pattern == &frame[..]) {
                continue;
            }

            if prefixes.iter().any(|prefix| frame.starts_with(prefix)) {
                self.invalid_streak = 0;
                self.frames.push_back(Frame::new(frame));
            } else {
                self.reject_segment(frame.len())?;
            }
        }

        if self.buffer.len() > MAX_TEXT_BUFFER_SIZE {
            let dropped = self.buffer.len();
            self.buffer.clear();
            self.reject_segment(dropped)?;
        }

        Ok(())
    }

    fn reject_segment(&mut self, len: usize) -> DecodeResult<()> {
        self.invalid_streak += 1;
        warn!(
            len,
            streak = self.invalid_streak,
            max = self.max_invalid,
            "Discarding text without protocol prefix"
        );
        if self.invalid_streak >= self.max_invalid {
            return Err(DecodeError::TooManyInvalidFrames(self.invalid_streak));
        }
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() == 1 {
        return haystack.iter().position(|&b| b == needle[0]);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
