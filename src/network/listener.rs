use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use crate::NodeId;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::protocol::FloodHandler;

const LISTEN_BACKLOG: i32 = 128;

/// Inbound endpoint dedicated to one neighbor edge.
pub struct NeighborListener {
    neighbor: NodeId,
    addr: SocketAddr,
    listener: TcpListener,
}

impl NeighborListener {
    /// Binds with address reuse so back-to-back rounds can rebind the port.
    /// Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr, neighbor: NodeId) -> Result<Self> {
        let bind_err = |source| Error::Bind { addr, source };

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
        socket.set_nonblocking(true).map_err(bind_err)?;

        let listener = TcpListener::from_std(socket.into()).map_err(bind_err)?;
        let addr = listener.local_addr().unwrap_or(addr);

        Ok(Self {
            neighbor,
            addr,
            listener,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn neighbor(&self) -> NodeId {
        self.neighbor
    }

    pub fn spawn(self, node: Arc<Node>) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let neighbor = self.neighbor;
        let addr = self.addr;
        let task = tokio::spawn(self.accept_loop(node, shutdown_rx));

        ListenerHandle {
            neighbor,
            addr,
            shutdown_tx,
            task,
        }
    }

    async fn accept_loop(self, node: Arc<Node>, mut shutdown_rx: broadcast::Receiver<()>) {
        let Self {
            neighbor,
            addr,
            listener,
        } = self;
        let mut handlers = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    debug!(node = node.id(), neighbor, "listener on {} shutting down", addr);
                    break;
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(node = node.id(), neighbor, "flood handler panicked: {}", e);
                        }
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(node = node.id(), neighbor, "connection from {} on {}", peer, addr);
                        let handler = FloodHandler::new(node.clone(), neighbor);
                        handlers.spawn(handler.run(stream));
                    }
                    Err(e) => {
                        debug!(node = node.id(), neighbor, "accept on {} interrupted: {}", addr, e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        // Closing the endpoint refuses anything still trying to connect.
        drop(listener);
        drain(&mut handlers, node.config().handler_grace(), node.id(), neighbor).await;
    }
}

async fn drain(handlers: &mut JoinSet<()>, grace: Duration, node: NodeId, neighbor: NodeId) {
    let finished = tokio::time::timeout(grace, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!(node, neighbor, "aborting {} flood handlers still running", handlers.len());
        handlers.abort_all();
        while handlers.join_next().await.is_some() {}
    }
}

/// Running listener. Dropping it without [`close`](Self::close) leaves the
/// task running until the runtime shuts down.
pub struct ListenerHandle {
    neighbor: NodeId,
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn neighbor(&self) -> NodeId {
        self.neighbor
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting, closes the endpoint and waits for spawned handlers.
    pub async fn close(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(neighbor = self.neighbor, "listener on {} panicked: {}", self.addr, e);
            }
        }
    }
}
