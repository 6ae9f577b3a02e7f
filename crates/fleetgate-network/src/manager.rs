//! Owns every enabled listener.

use fleetgate_alarm::{AddressResolver, NoAddressResolver};
use fleetgate_core::Protocol;
use fleetgate_core::constants::MANAGER_SHUTDOWN_TIMEOUT_SECS;
use fleetgate_storage::{DeviceDirectory, ReportSink};
use futures::future::join_all;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ListenerConfig, ServerConfig};
use crate::error::ServerResult;
use crate::listener::{Listener, ListenerStatus};
use crate::pipeline::Pipeline;

/// Starts, stops and reports on the per-protocol listeners.
///
/// All listeners share one [`Pipeline`] and one stop signal; disabled
/// listener configs are ignored.
pub struct ServerManager<D, S, R = NoAddressResolver> {
    listeners: Vec<Listener<D, S, R>>,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
}

impl<D, S, R> ServerManager<D, S, R>
where
    D: DeviceDirectory + 'static,
    S: ReportSink + 'static,
    R: AddressResolver + 'static,
{
    pub fn new(
        pipeline: Arc<Pipeline<D, S, R>>,
        server: ServerConfig,
        listeners: impl IntoIterator<Item = ListenerConfig>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let listeners = listeners
            .into_iter()
            .filter(|config| config.enabled)
            .map(|config| {
                Listener::new(config, server.clone(), Arc::clone(&pipeline))
                    .with_shutdown(shutdown.clone())
            })
            .collect();

        Self {
            listeners,
            shutdown,
            shutdown_timeout: Duration::from_secs(MANAGER_SHUTDOWN_TIMEOUT_SECS),
        }
    }

    /// Override the overall shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Token cancelled by [`ServerManager::shutdown_all`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind every listener. If one fails, the ones already started are
    /// stopped again and the error is returned.
    pub async fn start_all(&mut self) -> ServerResult<()> {
        for index in 0..self.listeners.len() {
            if let Err(e) = self.listeners[index].start().await {
                warn!(
                    protocol = %self.listeners[index].protocol(),
                    error = %e,
                    "listener failed to start"
                );
                self.stop_listeners().await;
                return Err(e);
            }
        }
        info!(listeners = self.listeners.len(), "all listeners started");
        Ok(())
    }

    /// Stop every listener concurrently within the overall deadline.
    ///
    /// The stop signal stays cancelled, so the manager cannot be restarted.
    pub async fn shutdown_all(&mut self) {
        info!(listeners = self.listeners.len(), "shutting down");
        self.shutdown.cancel();

        let timeout = self.shutdown_timeout;
        if tokio::time::timeout(timeout, self.stop_listeners()).await.is_err() {
            warn!(timeout_secs = timeout.as_secs(), "shutdown deadline exceeded, remaining tasks aborted");
        }
        info!("shutdown complete");
    }

    async fn stop_listeners(&mut self) {
        join_all(self.listeners.iter_mut().map(|listener| listener.shutdown())).await;
    }

    pub fn status(&self) -> Vec<ListenerStatus> {
        self.listeners.iter().map(Listener::status).collect()
    }

    pub fn local_addr(&self, protocol: Protocol) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.protocol() == protocol)
            .and_then(Listener::local_addr)
    }
}
