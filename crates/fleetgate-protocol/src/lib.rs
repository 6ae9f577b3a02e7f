//! Wire protocols spoken by the tracking devices.
//!
//! Three mutually incompatible protocols arrive on separate listeners:
//!
//! | Protocol | Framing | Reply |
//! |----------|---------|-------|
//! | [`Protocol::Neon`](fleetgate_core::Protocol::Neon) | text terminated by `>` | none |
//! | [`Protocol::Geneko`](fleetgate_core::Protocol::Geneko) | text terminated by `</fox>` | none |
//! | [`Protocol::Ruptela`](fleetgate_core::Protocol::Ruptela) | length-prefixed binary with CRC16 trailer | 6-byte ACK/NACK |
//!
//! The crate is layered the same way for all three:
//!
//! ```text
//! TCP bytes -> Reassembler -> Frame -> ProtocolDecoder -> Decoded { reports, reply }
//!             (FrameCodec wraps the reassembler for tokio Framed streams)
//! ```
//!
//! Decoders are synchronous and know nothing about the network or storage.
//! Device resolution is done by the caller between [`ProtocolDecoder::device_code`]
//! and [`ProtocolDecoder::decode`].

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod geneko;
pub mod neon;
pub mod reassembler;
pub mod ruptela;

pub use checksum::{ACK, NACK, crc16};
pub use codec::FrameCodec;
pub use decoder::{Decoded, DecodedReport, ProtocolDecoder, decoder_for};
pub use error::{DecodeError, DecodeResult};
pub use frame::Frame;
pub use geneko::GenekoDecoder;
pub use neon::NeonDecoder;
pub use reassembler::{FramingRule, Reassembler};
pub use ruptela::{ChecksumPolicy, RuptelaConfig, RuptelaDecoder};
