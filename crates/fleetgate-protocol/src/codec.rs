//! Tokio codec over the frame reassembler.
//!
//! [`FrameCodec`] is a thin adapter that lets a connection worker drive a
//! [`Reassembler`] through `tokio_util::codec::Framed`:
//!
//! - [`Decoder`]: bytes from the socket in, complete [`Frame`]s out
//! - [`Encoder<Bytes>`]: replies (ACK/NACK) written verbatim
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use fleetgate_core::Protocol;
//! use fleetgate_protocol::{ACK, FrameCodec};
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = TcpStream::connect("127.0.0.1:9040").await?;
//! let mut framed = Framed::new(stream, FrameCodec::new(Protocol::Ruptela));
//!
//! while let Some(frame) = framed.next().await {
//!     let frame = frame?;
//!     println!("{} bytes", frame.size());
//!     framed.send(Bytes::from_static(&ACK)).await?;
//! }
//! # Ok(())
//! # }
//! ```

use bytes::{Bytes, BytesMut};
use fleetgate_core::Protocol;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DecodeError, DecodeResult};
use crate::frame::Frame;
use crate::reassembler::{FramingRule, Reassembler};

#[derive(Debug)]
pub struct FrameCodec {
    reassembler: Reassembler,
    failure: Option<DecodeError>,
}

impl FrameCodec {
    /// Codec using the framing rule of `protocol`.
    pub fn new(protocol: Protocol) -> Self {
        Self::with_rule(FramingRule::for_protocol(protocol))
    }

    pub fn with_rule(rule: FramingRule) -> Self {
        Self {
            reassembler: Reassembler::new(rule),
            failure: None,
        }
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> DecodeResult<Option<Frame>> {
        if !src.is_empty() && self.failure.is_none() {
            // Ownership of the bytes moves to the reassembler, which keeps
            // partial frames across reads.
            let fed = self.reassembler.feed(src);
            src.clear();
            if let Err(e) = fed {
                self.failure = Some(e);
            }
        }

        // Frames completed before a failure are still delivered.
        if let Some(frame) = self.reassembler.next_frame() {
            return Ok(Some(frame));
        }
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = DecodeError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> DecodeResult<()> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
