//! One listening port: an accept task feeding connection handlers.
//!
//! # Dispatch
//!
//! ```text
//!                     DispatchMode::Pooled
//! accept() ──> mpsc queue (bounded) ──> worker 0..N ──> Pipeline::serve
//!
//!                     DispatchMode::PerConnection
//! accept() ──> spawn ──> Pipeline::serve
//! ```
//!
//! In pooled mode the worker count bounds the number of connections served
//! at once; further sockets wait in the queue, and once the queue is full the
//! accept task stops accepting until a worker frees up.
//!
//! # Shutdown
//!
//! [`Listener::shutdown`] cancels the listener's token, which stops the
//! accept task (closing the socket), wakes idle workers and interrupts every
//! pending read. Workers get `shutdown_timeout` to finish; stragglers are
//! aborted. Sockets still queued are closed when the queue is dropped.

use fleetgate_alarm::{AddressResolver, NoAddressResolver};
use fleetgate_core::Protocol;
use fleetgate_storage::{DeviceDirectory, ReportSink};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{DispatchMode, ListenerConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::pipeline::Pipeline;
use crate::tracker::{ConnectionGuard, ConnectionTracker};

/// Pause after a failed `accept()` so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Point-in-time view of a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenerStatus {
    pub protocol: Protocol,
    /// Bound address while running
    pub address: Option<SocketAddr>,
    pub running: bool,
    pub active_connections: usize,
    pub total_connections: u64,
}

/// An accepted socket on its way to a handler.
struct Accepted {
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
}

type Queue = Arc<Mutex<mpsc::Receiver<Accepted>>>;

/// Where the accept task hands sockets.
enum Dispatch<D, S, R> {
    Queue(mpsc::Sender<Accepted>),
    Spawn {
        pipeline: Arc<Pipeline<D, S, R>>,
        tasks: JoinSet<()>,
    },
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    /// Yields the per-connection tasks when it stops
    accept: JoinHandle<JoinSet<()>>,
    workers: JoinSet<()>,
}

/// TCP listener for one protocol.
pub struct Listener<D, S, R = NoAddressResolver> {
    config: ListenerConfig,
    server: ServerConfig,
    pipeline: Arc<Pipeline<D, S, R>>,
    tracker: Arc<ConnectionTracker>,
    shutdown: CancellationToken,
    running: Option<Running>,
}

impl<D, S, R> Listener<D, S, R>
where
    D: DeviceDirectory + 'static,
    S: ReportSink + 'static,
    R: AddressResolver + 'static,
{
    pub fn new(config: ListenerConfig, server: ServerConfig, pipeline: Arc<Pipeline<D, S, R>>) -> Self {
        Self {
            config,
            server,
            pipeline,
            tracker: ConnectionTracker::new(),
            shutdown: CancellationToken::new(),
            running: None,
        }
    }

    /// Tie the listener to a parent stop signal. Cancelling `token` stops
    /// this listener; stopping this listener leaves `token` untouched.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.config.protocol
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn status(&self) -> ListenerStatus {
        ListenerStatus {
            protocol: self.config.protocol,
            address: self.local_addr(),
            running: self.is_running(),
            active_connections: self.tracker.active(),
            total_connections: self.tracker.total(),
        }
    }

    /// Bind the port and start accepting.
    ///
    /// # Errors
    ///
    /// - [`ServerError::AlreadyRunning`] if called twice without `shutdown`
    /// - [`ServerError::Config`] for a zero-sized pool or queue
    /// - [`ServerError::Bind`] if the address is unavailable
    pub async fn start(&mut self) -> ServerResult<SocketAddr> {
        let protocol = self.config.protocol;
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning(protocol));
        }
        self.config.validate()?;

        let addr = format!("{}:{}", self.server.bind_host, self.config.port);
        let socket = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;
        let cancel = self.shutdown.child_token();

        let mut workers = JoinSet::new();
        let dispatch = match self.server.dispatch {
            DispatchMode::Pooled => {
                let (tx, rx) = mpsc::channel(self.config.queue_capacity);
                let queue: Queue = Arc::new(Mutex::new(rx));
                for id in 0..self.config.workers {
                    workers.spawn(worker_loop(
                        id,
                        protocol,
                        Arc::clone(&queue),
                        Arc::clone(&self.pipeline),
                        cancel.clone(),
                    ));
                }
                Dispatch::Queue(tx)
            }
            DispatchMode::PerConnection => Dispatch::Spawn {
                pipeline: Arc::clone(&self.pipeline),
                tasks: JoinSet::new(),
            },
        };

        let accept = tokio::spawn(accept_loop(
            socket,
            protocol,
            dispatch,
            Arc::clone(&self.tracker),
            cancel.clone(),
        ));

        info!(
            protocol = %protocol,
            addr = %local_addr,
            dispatch = ?self.server.dispatch,
            workers = workers.len(),
            "listener started"
        );

        self.running = Some(Running {
            local_addr,
            cancel,
            accept,
            workers,
        });
        Ok(local_addr)
    }

    /// Stop accepting, interrupt every connection and wait for the handlers.
    ///
    /// Does nothing if the listener is not running.
    pub async fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let protocol = self.config.protocol;
        info!(protocol = %protocol, "stopping listener");

        running.cancel.cancel();
        let connections = match running.accept.await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(protocol = %protocol, error = %e, "accept task failed");
                JoinSet::new()
            }
        };

        let deadline = Instant::now() + self.server.shutdown_timeout();
        let aborted = drain(running.workers, deadline).await + drain(connections, deadline).await;
        if aborted > 0 {
            warn!(protocol = %protocol, aborted, "handlers did not stop in time");
        }

        info!(
            protocol = %protocol,
            total_connections = self.tracker.total(),
            "listener stopped"
        );
    }
}

async fn accept_loop<D, S, R>(
    socket: TcpListener,
    protocol: Protocol,
    mut dispatch: Dispatch<D, S, R>,
    tracker: Arc<ConnectionTracker>,
    cancel: CancellationToken,
) -> JoinSet<()>
where
    D: DeviceDirectory + 'static,
    S: ReportSink + 'static,
    R: AddressResolver + 'static,
{
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = socket.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                error!(protocol = %protocol, error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let conn = Accepted {
            stream,
            peer,
            guard: tracker.open(),
        };
        info!(peer = %peer, protocol = %protocol, active = tracker.active(), "connection accepted");

        match &mut dispatch {
            Dispatch::Queue(queue) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = queue.send(conn) => {
                        if sent.is_err() {
                            warn!(protocol = %protocol, "worker queue closed");
                            break;
                        }
                    }
                }
            }
            Dispatch::Spawn { pipeline, tasks } => {
                while let Some(result) = tasks.try_join_next() {
                    log_termination(result);
                }
                let pipeline = Arc::clone(pipeline);
                let cancel = cancel.clone();
                tasks.spawn(async move { serve_connection(&pipeline, protocol, conn, &cancel).await });
            }
        }
    }

    drop(socket);
    debug!(protocol = %protocol, "accept loop stopped");

    match dispatch {
        Dispatch::Spawn { tasks, .. } => tasks,
        Dispatch::Queue(_) => JoinSet::new(),
    }
}

/// Long-lived pooled worker: take a socket, serve it, repeat.
async fn worker_loop<D, S, R>(
    id: usize,
    protocol: Protocol,
    queue: Queue,
    pipeline: Arc<Pipeline<D, S, R>>,
    cancel: CancellationToken,
) where
    D: DeviceDirectory + 'static,
    S: ReportSink + 'static,
    R: AddressResolver + 'static,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = async { queue.lock().await.recv().await } => next,
        };
        let Some(conn) = next else {
            break;
        };
        let peer = conn.peer;
        trace!(worker = id, peer = %peer, "connection dequeued");
        // A panicking handler only loses its own connection; the worker lives on.
        let served = AssertUnwindSafe(serve_connection(&pipeline, protocol, conn, &cancel))
            .catch_unwind()
            .await;
        if let Err(panic) = served {
            error!(
                worker = id,
                peer = %peer,
                protocol = %protocol,
                panic = panic_message(panic.as_ref()),
                "connection handler panicked"
            );
        }
    }
    trace!(worker = id, protocol = %protocol, "worker stopped");
}

async fn serve_connection<D, S, R>(
    pipeline: &Pipeline<D, S, R>,
    protocol: Protocol,
    conn: Accepted,
    cancel: &CancellationToken,
) where
    D: DeviceDirectory,
    S: ReportSink,
    R: AddressResolver,
{
    let Accepted { stream, peer, guard } = conn;
    let reason = pipeline.serve(protocol, stream, peer, cancel).await;
    drop(guard);
    info!(peer = %peer, protocol = %protocol, reason = %reason, "connection closed");
}

/// Join `tasks` until `deadline`, then abort whatever is left. Returns the
/// number of aborted tasks.
async fn drain(mut tasks: JoinSet<()>, deadline: Instant) -> usize {
    let joined = tokio::time::timeout_at(deadline, async {
        while let Some(result) = tasks.join_next().await {
            log_termination(result);
        }
    })
    .await;

    if joined.is_ok() {
        return 0;
    }
    let stragglers = tasks.len();
    tasks.shutdown().await;
    stragglers
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn log_termination(result: Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!(error = %e, "connection handler panicked"),
    }
}
