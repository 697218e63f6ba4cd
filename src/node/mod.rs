pub mod state;

pub use state::{AdjacencyMatrix, ListenTimeline, NodeState, NodeStatus, SequenceTable};

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, warn};

use crate::NodeId;
use crate::config::SimulationConfig;
use crate::error::{ConfigError, Error, Result};
use crate::network::{ListenerHandle, LinkTable, NeighborListener, channel};
use crate::protocol::Message;
use crate::sync::CountdownLatch;

#[derive(Debug, Default)]
pub(crate) struct NodeStats {
    received: AtomicU64,
    accepted: AtomicU64,
    stale: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    violations: AtomicU64,
}

impl NodeStats {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_violation(&self) {
        self.violations.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            violations: self.violations.load(Ordering::Relaxed),
        }
    }
}

/// Message counters since the node was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub stale: u64,
    pub sent: u64,
    pub dropped: u64,
    pub violations: u64,
}

struct Outbound {
    addr: SocketAddr,
    // one send in flight per target
    lock: Mutex<()>,
}

/// A router in the simulated network.
///
/// State lives behind a per-node lock; scheduling is external. The
/// coordinator spawns [`Node::run_round`] once per round and each listener
/// spawns flood handlers that share the node through an `Arc`.
pub struct Node {
    id: NodeId,
    node_count: usize,
    config: Arc<SimulationConfig>,
    state: Mutex<NodeState>,
    progress: Notify,
    outbound: BTreeMap<NodeId, Outbound>,
    listen_addrs: BTreeMap<NodeId, SocketAddr>,
    listeners: Mutex<Vec<ListenerHandle>>,
    stats: NodeStats,
}

impl Node {
    pub fn new(
        id: NodeId,
        node_count: usize,
        links: LinkTable,
        config: Arc<SimulationConfig>,
    ) -> Self {
        let outbound = links
            .iter()
            .map(|(neighbor, link)| {
                let out = Outbound {
                    addr: link.send_addr(config.host),
                    lock: Mutex::new(()),
                };
                (neighbor, out)
            })
            .collect();
        let listen_addrs = links
            .iter()
            .map(|(neighbor, link)| (neighbor, link.listen_addr(config.host)))
            .collect();

        Self {
            id,
            node_count,
            state: Mutex::new(NodeState::new(id, node_count, links)),
            config,
            progress: Notify::new(),
            outbound,
            listen_addrs,
            listeners: Mutex::new(Vec::new()),
            stats: NodeStats::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn degree(&self) -> usize {
        self.outbound.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn matrix(&self) -> AdjacencyMatrix {
        self.state.lock().await.matrix().clone()
    }

    pub async fn sequence(&self) -> SequenceTable {
        self.state.lock().await.sequence().clone()
    }

    pub async fn links(&self) -> LinkTable {
        self.state.lock().await.links().clone()
    }

    pub async fn status(&self) -> NodeStatus {
        self.state.lock().await.status()
    }

    pub async fn round(&self) -> u64 {
        self.state.lock().await.round()
    }

    pub async fn timeline(&self) -> ListenTimeline {
        self.state.lock().await.timeline()
    }

    /// Sets the weight of the link to `neighbor` on this side only.
    pub async fn update_weight(&self, neighbor: NodeId, weight: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.set_link_weight(neighbor, weight) {
            return Err(ConfigError::UnknownLink {
                a: self.id,
                b: neighbor,
            }
            .into());
        }
        Ok(())
    }

    /// Binds one listener per neighbor, counting `ready` down as each is
    /// bound. A bind failure aborts the rest; listeners already started stay
    /// registered so [`close_listeners`](Self::close_listeners) reclaims them.
    pub async fn start_listeners(self: &Arc<Self>, ready: &CountdownLatch) -> Result<()> {
        let mut listeners = self.listeners.lock().await;

        if !listeners.is_empty() {
            // already listening from an earlier call
            for _ in listeners.iter() {
                ready.count_down();
            }
            return Ok(());
        }

        for (&neighbor, &addr) in &self.listen_addrs {
            let listener = NeighborListener::bind(addr, neighbor)?;
            debug!(node = self.id, neighbor, "listening on {}", addr);
            listeners.push(listener.spawn(self.clone()));
            ready.count_down();
        }
        drop(listeners);

        self.state.lock().await.mark_listening(Instant::now());
        Ok(())
    }

    /// Closes every listener, waits for their handlers, then counts
    /// `teardown` down once. Safe to call when nothing is listening.
    pub async fn close_listeners(&self, teardown: &CountdownLatch) {
        let handles = std::mem::take(&mut *self.listeners.lock().await);
        let count = handles.len();

        join_all(handles.into_iter().map(ListenerHandle::close)).await;
        if count > 0 {
            debug!(node = self.id, "closed {} listeners", count);
        }

        self.state.lock().await.set_status(NodeStatus::Idle);
        teardown.count_down();
    }

    /// One round: broadcast local link-state, wait until every source has
    /// reached this round, then signal `done`.
    pub async fn run_round(self: Arc<Self>, done: CountdownLatch) -> Result<()> {
        let _signal = done.arm();
        let result = self.execute_round().await;
        self.state.lock().await.set_status(NodeStatus::Done);
        result
    }

    async fn execute_round(&self) -> Result<()> {
        let (round, message, targets) = {
            let mut state = self.state.lock().await;
            let round = state.begin_round();
            let message = Message::broadcast(self.id, round, state.local_link_states());
            let targets: Vec<NodeId> = state.links().neighbors().collect();
            (round, message, targets)
        };

        debug!(node = self.id, round, "broadcasting to {:?}", targets);
        self.send_all(&message, &targets).await;

        self.state.lock().await.set_status(NodeStatus::Converging);
        match self.config.convergence_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.await_convergence())
                .await
                .map_err(|_| Error::ConvergenceTimeout {
                    node: self.id,
                    round,
                    timeout: limit,
                })?,
            None => self.await_convergence().await,
        }

        info!(node = self.id, round, "converged");
        Ok(())
    }

    async fn await_convergence(&self) {
        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().await.is_converged() {
                return;
            }
            notified.await;
        }
    }

    /// Delivers `message` to one neighbor. Failures count as a dropped
    /// message; redundant flood paths make up for it.
    pub async fn send(&self, message: &Message, neighbor: NodeId) -> bool {
        let Some(outbound) = self.outbound.get(&neighbor) else {
            warn!(node = self.id, neighbor, "no link to neighbor, message dropped");
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let _in_flight = outbound.lock.lock().await;
        match channel::send(outbound.addr, message, self.config.connect_timeout()).await {
            Ok(()) => {
                self.stats.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) if e.is_transient() => {
                debug!(node = self.id, neighbor, "message dropped: {}", e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(e) => {
                warn!(node = self.id, neighbor, "message dropped: {}", e);
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Sends a fresh copy of `message` to each target concurrently.
    pub(crate) async fn send_all(&self, message: &Message, targets: &[NodeId]) {
        let sends = targets.iter().map(|&neighbor| {
            let copy = message.relay();
            async move { self.send(&copy, neighbor).await }
        });
        join_all(sends).await;
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().await
    }

    pub(crate) fn notify_progress(&self) {
        self.progress.notify_waiters();
    }

    pub(crate) fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub(crate) fn stats_counters(&self) -> &NodeStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Link;
    use crate::protocol::{FloodHandler, FloodOutcome, LinkState, MessageKind};
    use std::time::Duration;

    fn config() -> Arc<SimulationConfig> {
        Arc::new(SimulationConfig {
            convergence_timeout_ms: Some(200),
            connect_timeout_ms: 100,
            ..Default::default()
        })
    }

    // Ports point at nothing; sends fail fast and count as dropped.
    fn isolated_node(id: NodeId, node_count: usize, neighbors: &[(NodeId, f64)]) -> Arc<Node> {
        let mut links = LinkTable::new();
        for &(neighbor, weight) in neighbors {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let port = probe.local_addr().unwrap().port();
            links.insert(
                neighbor,
                Link {
                    weight,
                    send_port: port,
                    listen_port: port,
                },
            );
        }
        Arc::new(Node::new(id, node_count, links, config()))
    }

    #[tokio::test]
    async fn test_handler_applies_without_sockets() {
        let node = isolated_node(1, 3, &[(2, 1.0)]);
        let handler = FloodHandler::new(node.clone(), 2);

        let msg = Message::broadcast(3, 1, vec![LinkState::new(3, 2, 4.0)]);
        let outcome = handler.process(msg.clone()).await.unwrap();
        assert_eq!(outcome, FloodOutcome::Accepted { forward_to: vec![] });
        assert_eq!(node.matrix().await.get(2, 3), Some(4.0));

        let outcome = handler.process(msg).await.unwrap();
        assert_eq!(outcome, FloodOutcome::Stale { seen: 1 });

        let stats = node.stats();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.stale, 1);
    }

    #[tokio::test]
    async fn test_handler_rejects_non_broadcast() {
        let node = isolated_node(1, 2, &[(2, 1.0)]);
        let handler = FloodHandler::new(node.clone(), 2);

        let msg = Message::new(MessageKind::Acknowledgement, 2, 5, vec![]);
        let err = handler.process(msg).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation { from: 2, .. }));
        assert_eq!(node.sequence().await.get(2), Some(0));
        assert_eq!(node.stats().violations, 1);
    }

    #[tokio::test]
    async fn test_round_times_out_but_still_signals() {
        let node = isolated_node(1, 2, &[(2, 1.0)]);
        let done = CountdownLatch::new(1);

        let err = node.clone().run_round(done.clone()).await.unwrap_err();
        assert!(matches!(err, Error::ConvergenceTimeout { node: 1, round: 1, .. }));
        assert_eq!(done.count(), 0);
        assert_eq!(node.status().await, NodeStatus::Done);
        assert_eq!(node.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_round_completes_when_last_source_arrives() {
        let node = isolated_node(1, 2, &[(2, 1.0)]);
        let done = CountdownLatch::new(1);
        let round = tokio::spawn(node.clone().run_round(done.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        FloodHandler::new(node.clone(), 2)
            .process(Message::broadcast(2, 1, vec![LinkState::new(2, 1, 1.0)]))
            .await
            .unwrap();

        round.await.unwrap().unwrap();
        done.wait().await;
        assert!(node.sequence().await.all_reached(1));
    }

    #[tokio::test]
    async fn test_update_weight_unknown_neighbor() {
        let node = isolated_node(1, 3, &[(2, 1.0)]);
        assert!(node.update_weight(2, 6.0).await.is_ok());
        assert_eq!(node.matrix().await.get(2, 1), Some(6.0));

        let err = node.update_weight(3, 1.0).await.unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::UnknownLink { a: 1, b: 3 })));
    }

    #[tokio::test]
    async fn test_close_without_listeners_counts_down() {
        let node = isolated_node(1, 2, &[(2, 1.0)]);
        let teardown = CountdownLatch::new(1);
        node.close_listeners(&teardown).await;
        assert_eq!(teardown.count(), 0);
        assert_eq!(node.status().await, NodeStatus::Idle);
    }
}
