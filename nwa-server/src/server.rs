use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, Result};
use futures::FutureExt;
use tokio::{net::TcpListener, select, sync::oneshot, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    connection::{Connection, ConnectionFault},
    emulator::Emulator,
};

/// Well-known port of the emulator network access protocol.
pub const DEFAULT_PORT: u16 = 0xBEEF;

/// Room for a few full-bus reads queued behind a client that reads slowly.
pub const DEFAULT_MAX_BACKLOG: usize = 128 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Pause between two accept/poll passes.
    pub poll_interval: Duration,
    /// Receive buffer size per client; also the largest frame a client may send.
    pub buffer_capacity: usize,
    /// Unsent reply bytes a client may accumulate before it is dropped.
    pub max_backlog: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            poll_interval: Duration::from_millis(1),
            buffer_capacity: 1_500_000,
            max_backlog: DEFAULT_MAX_BACKLOG,
        }
    }
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the listener task and, through it, every client connection.
pub struct NwaServer {
    emulator: Arc<dyn Emulator>,
    config: ServerConfig,
    next_id: Arc<AtomicU64>,
    clients: Arc<AtomicUsize>,
    running: Option<RunningServer>,
}

impl NwaServer {
    pub fn new(emulator: Arc<dyn Emulator>, config: ServerConfig) -> Self {
        Self {
            emulator,
            config,
            next_id: Arc::new(AtomicU64::new(1)),
            clients: Arc::new(AtomicUsize::new(0)),
            running: None,
        }
    }

    /// Binds the listener and spawns the polling task. Calling it again while
    /// running returns the existing address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return Ok(running.local_addr);
            }
        }

        let listener = TcpListener::bind(self.config.listen)
            .await
            .with_context(|| format!("failed to bind {}", self.config.listen))?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let poller = Poller {
            listener,
            emulator: Arc::clone(&self.emulator),
            config: self.config.clone(),
            next_id: Arc::clone(&self.next_id),
            clients: Arc::clone(&self.clients),
            connections: Vec::new(),
        };
        let task = tokio::spawn(poller.run(shutdown_rx));

        info!("nwa server listening on {}", local_addr);
        self.running = Some(RunningServer {
            local_addr,
            shutdown,
            task,
        });
        Ok(local_addr)
    }

    /// Signals the polling task, waits for it, and closes every connection.
    pub async fn stop(&mut self) {
        let Some(RunningServer { shutdown, task, .. }) = self.running.take() else {
            return;
        };

        info!(clients = self.connected_clients(), "stopping nwa server");
        let _ = shutdown.send(());
        if let Err(err) = task.await {
            warn!(error = ?err, "server task ended abnormally");
        }
        info!("nwa server stopped");
    }

    pub fn started(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Connections the polling task held at the end of its last pass.
    pub fn connected_clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }
}

/// State owned by the background accept/poll loop.
struct Poller {
    listener: TcpListener,
    emulator: Arc<dyn Emulator>,
    config: ServerConfig,
    next_id: Arc<AtomicU64>,
    clients: Arc<AtomicUsize>,
    connections: Vec<Connection>,
}

impl Poller {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        loop {
            self.accept_pending();
            self.poll_connections().await;
            self.clients.store(self.connections.len(), Ordering::Relaxed);

            select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        for mut connection in self.connections.drain(..) {
            connection.disconnect(ConnectionFault::Closed).await;
            info!(
                id = connection.id(),
                peer = %connection.peer(),
                "client disconnected (server stopping)"
            );
        }
        self.clients.store(0, Ordering::Relaxed);
    }

    // Accepts until the listener has nothing queued; never waits.
    fn accept_pending(&mut self) {
        while let Some(accepted) = self.listener.accept().now_or_never() {
            match accepted {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = ?err, "failed to disable nagle");
                    }
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    info!(id, peer = %peer, "client connected");
                    self.connections.push(Connection::new(
                        id,
                        stream,
                        peer,
                        self.config.buffer_capacity,
                        self.config.max_backlog,
                    ));
                }
                Err(err) => {
                    warn!(error = ?err, "failed to accept connection");
                    break;
                }
            }
        }
    }

    async fn poll_connections(&mut self) {
        self.connections.retain(|connection| {
            if !connection.has_error() {
                return true;
            }
            let reason = connection
                .fault()
                .map(ToString::to_string)
                .unwrap_or_else(|| "socket closed".to_string());
            info!(
                id = connection.id(),
                peer = %connection.peer(),
                name = connection.client_name().unwrap_or_default(),
                %reason,
                "client disconnected"
            );
            false
        });

        for connection in &mut self.connections {
            connection.process(self.emulator.as_ref()).await;
        }
    }
}
