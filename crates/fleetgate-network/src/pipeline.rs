//! The per-connection read loop.
//!
//! ```text
//! TcpStream -> Framed<FrameCodec> -> ProtocolDecoder -> AlarmEngine -> Notifier
//!                                        |                               |
//!                                        +--------- reply (ACK/NACK) <---+
//! ```
//!
//! A [`Pipeline`] is shared by every worker of a listener. Each call to
//! [`Pipeline::serve`] owns one connection, its decoder and its
//! [`SessionState`], and returns when the connection is done.

use fleetgate_alarm::{
    AddressResolver, AlarmEngine, NoAddressResolver, Notifier, Resolution, SessionState,
};
use fleetgate_core::Protocol;
use fleetgate_core::constants::{DEFAULT_READ_TIMEOUT_SECS, MAX_DECODE_FAILURES};
use fleetgate_protocol::{
    DecodeError, DecodedReport, Frame, FrameCodec, ProtocolDecoder, RuptelaConfig, decoder_for,
};
use fleetgate_storage::{DeviceDirectory, ReportSink};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::ServerResult;

type DeviceStream = Framed<TcpStream, FrameCodec>;

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the socket
    Eof,
    /// Nothing arrived within the read timeout
    Timeout,
    /// The listener is shutting down
    Shutdown,
    /// Transport or framing error
    Fatal,
    /// Too many consecutive frames failed to decode
    TooManyFailures,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CloseReason::Eof => "eof",
            CloseReason::Timeout => "read timeout",
            CloseReason::Shutdown => "shutdown",
            CloseReason::Fatal => "fatal error",
            CloseReason::TooManyFailures => "too many decode failures",
        })
    }
}

/// Everything a worker needs to process device traffic.
pub struct Pipeline<D, S, R = NoAddressResolver> {
    directory: Arc<D>,
    engine: AlarmEngine,
    notifier: Notifier<S, R>,
    ruptela: RuptelaConfig,
    read_timeout: Duration,
}

impl<D, S, R> Pipeline<D, S, R>
where
    D: DeviceDirectory,
    S: ReportSink,
    R: AddressResolver,
{
    pub fn new(directory: Arc<D>, engine: AlarmEngine, notifier: Notifier<S, R>) -> Self {
        Self {
            directory,
            engine,
            notifier,
            ruptela: RuptelaConfig::default(),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }

    pub fn with_ruptela(mut self, config: RuptelaConfig) -> Self {
        self.ruptela = config;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &AlarmEngine {
        &self.engine
    }

    /// Serve one connection until EOF, timeout, a fatal error, repeated
    /// decode failures or cancellation.
    pub async fn serve(
        &self,
        protocol: Protocol,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: &CancellationToken,
    ) -> CloseReason {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
        }

        let mut framed = Framed::new(stream, FrameCodec::new(protocol));
        let mut decoder = decoder_for(protocol, Arc::clone(self.engine.catalog()), self.ruptela.clone());
        let mut session: Option<SessionState> = None;
        let mut failures = 0u32;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return CloseReason::Shutdown,
                next = tokio::time::timeout(self.read_timeout, framed.next()) => next,
            };

            let frame = match next {
                Err(_) => return CloseReason::Timeout,
                Ok(None) => return CloseReason::Eof,
                Ok(Some(Err(DecodeError::Io(e)))) => {
                    debug!(peer = %peer, error = %e, "read failed");
                    return CloseReason::Fatal;
                }
                Ok(Some(Err(e))) => {
                    warn!(peer = %peer, protocol = %protocol, error = %e, "framing error");
                    return CloseReason::Fatal;
                }
                Ok(Some(Ok(frame))) => frame,
            };
            trace!(peer = %peer, size = frame.size(), "frame received");

            match self
                .handle_frame(&mut framed, decoder.as_mut(), &mut session, &frame)
                .await
            {
                Ok(()) => failures = 0,
                Err(e) if e.is_fatal() => {
                    warn!(peer = %peer, protocol = %protocol, error = %e, "closing connection");
                    return CloseReason::Fatal;
                }
                Err(e) if e.is_domain() => {
                    warn!(peer = %peer, protocol = %protocol, error = %e, "frame skipped");
                }
                Err(e) if e.is_decode_failure() => {
                    failures += 1;
                    warn!(
                        peer = %peer,
                        protocol = %protocol,
                        error = %e,
                        failures,
                        "failed to decode frame"
                    );
                    if failures >= MAX_DECODE_FAILURES {
                        return CloseReason::TooManyFailures;
                    }
                }
                Err(e) => {
                    error!(peer = %peer, protocol = %protocol, error = %e, "frame dropped");
                }
            }
        }
    }

    async fn handle_frame(
        &self,
        framed: &mut DeviceStream,
        decoder: &mut (dyn ProtocolDecoder + Send),
        session: &mut Option<SessionState>,
        frame: &Frame,
    ) -> ServerResult<()> {
        let code = match decoder.device_code(frame) {
            Ok(code) => code,
            Err(e) => return refuse(framed, decoder, e).await,
        };

        // A connection normally carries one device; re-resolve if it changes.
        if session.as_ref().is_none_or(|s| s.device_code != code) {
            *session = None;
            match SessionState::resolve(self.directory.as_ref(), &code).await? {
                Resolution::Ready(state) => {
                    info!(
                        device = %code,
                        tracked_object_id = state.object.id,
                        label = %state.object.label,
                        "device identified"
                    );
                    *session = Some(*state);
                }
                Resolution::UnknownDevice => {
                    return refuse(framed, decoder, DecodeError::UnknownDevice(code)).await;
                }
                Resolution::Unlinked => {
                    return refuse(framed, decoder, DecodeError::NoTrackedObject(code)).await;
                }
            }
        }
        let Some(state) = session.as_mut() else {
            return Ok(());
        };

        let decoded = match decoder.decode(frame, &state.object) {
            Ok(decoded) => decoded,
            Err(e) => return refuse(framed, decoder, e).await,
        };
        if decoded.skipped > 0 {
            warn!(device = %code, skipped = decoded.skipped, "records skipped");
        }

        // Reply goes out before delivery.
        if let Some(reply) = decoded.reply {
            framed.send(reply).await?;
        }

        for DecodedReport { report, diagnostics } in decoded.reports {
            match self.engine.evaluate(state, report, diagnostics) {
                Ok(assessment) => {
                    let delivery = self.notifier.deliver(assessment, &state.subscribers).await;
                    trace!(
                        device = %code,
                        position_id = ?delivery.position_id,
                        notified = delivery.notified,
                        failures = delivery.failures,
                        "report delivered"
                    );
                }
                Err(rejection) => {
                    debug!(device = %code, reason = %rejection, "report dropped");
                }
            }
        }
        Ok(())
    }
}

/// Send whatever reply the protocol defines for `err`, then report it.
async fn refuse(
    framed: &mut DeviceStream,
    decoder: &mut (dyn ProtocolDecoder + Send),
    err: DecodeError,
) -> ServerResult<()> {
    let reply = decoder.reply_for(&err);
    if let Some(reply) = reply {
        framed.send(reply).await?;
    }
    Err(err.into())
}
