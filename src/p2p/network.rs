//! Network collaborator contract
//!
//! The controller talks to the transport through the `Network` trait:
//! targeted sends, broadcasts and a view of known peers with their
//! declared chain scores. The transport itself lives outside the core.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use super::Message;

/// What the core tracks about a peer
#[derive(Debug, Clone)]
pub struct PeerData {
    /// Peer's network address
    pub address: SocketAddr,
    /// Best chain score the peer has declared, if any
    pub declared_score: Option<u128>,
    /// Last time the peer was heard from (milliseconds)
    pub last_seen_ms: u64,
}

/// The transport surface the controller depends on
pub trait Network: Send + Sync {
    /// Send a message to one peer
    fn send(&self, peer: SocketAddr, message: Message);

    /// Send a message to every connected peer
    fn broadcast(&self, message: Message);

    /// The peer with the highest declared chain score
    fn best_peer(&self) -> Option<PeerData>;

    /// All known peers
    fn peers(&self) -> HashMap<SocketAddr, PeerData>;
}

/// Book of known peers and their declared scores
#[derive(Debug, Default)]
pub struct PeerBook {
    peers: HashMap<SocketAddr, PeerData>,
}

impl PeerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) a peer
    pub fn register(&mut self, address: SocketAddr, now_ms: u64) {
        self.peers
            .entry(address)
            .and_modify(|peer| peer.last_seen_ms = now_ms)
            .or_insert(PeerData {
                address,
                declared_score: None,
                last_seen_ms: now_ms,
            });
    }

    /// Record a peer's declared chain score
    pub fn record_score(&mut self, address: SocketAddr, score: Option<u128>, now_ms: u64) {
        self.register(address, now_ms);
        if let Some(peer) = self.peers.get_mut(&address) {
            peer.declared_score = score;
            peer.last_seen_ms = now_ms;
        }
    }

    /// The peer with the highest declared score
    pub fn best(&self) -> Option<&PeerData> {
        self.peers
            .values()
            .filter(|peer| peer.declared_score.is_some())
            .max_by_key(|peer| peer.declared_score)
    }

    pub fn all(&self) -> &HashMap<SocketAddr, PeerData> {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// An outbound message together with its destination; `None` means
/// broadcast.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Option<SocketAddr>,
    pub message: Message,
}

/// A `Network` that hands outbound traffic to a channel and reads peer
/// state from a shared book. The transport drains the channel; tests
/// read it directly.
#[derive(Clone)]
pub struct ChannelNetwork {
    outbound: UnboundedSender<Outbound>,
    book: Arc<RwLock<PeerBook>>,
}

impl ChannelNetwork {
    pub fn new(outbound: UnboundedSender<Outbound>, book: Arc<RwLock<PeerBook>>) -> Self {
        Self { outbound, book }
    }
}

impl Network for ChannelNetwork {
    fn send(&self, peer: SocketAddr, message: Message) {
        if self
            .outbound
            .send(Outbound {
                to: Some(peer),
                message,
            })
            .is_err()
        {
            warn!(%peer, "outbound channel closed, dropping message");
        }
    }

    fn broadcast(&self, message: Message) {
        if self
            .outbound
            .send(Outbound { to: None, message })
            .is_err()
        {
            warn!("outbound channel closed, dropping broadcast");
        }
    }

    fn best_peer(&self) -> Option<PeerData> {
        self.book
            .read()
            .expect("peer book lock poisoned")
            .best()
            .cloned()
    }

    fn peers(&self) -> HashMap<SocketAddr, PeerData> {
        self.book
            .read()
            .expect("peer book lock poisoned")
            .all()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_register_and_refresh() {
        let mut book = PeerBook::new();
        let addr = make_addr(8000);

        book.register(addr, 100);
        book.register(addr, 200);

        assert_eq!(book.len(), 1);
        assert_eq!(book.all()[&addr].last_seen_ms, 200);
    }

    #[test]
    fn test_best_peer_by_declared_score() {
        let mut book = PeerBook::new();
        book.record_score(make_addr(8000), Some(10), 1);
        book.record_score(make_addr(8001), Some(30), 1);
        book.record_score(make_addr(8002), None, 1);

        assert_eq!(book.best().unwrap().address, make_addr(8001));
    }

    #[test]
    fn test_no_best_peer_without_scores() {
        let mut book = PeerBook::new();
        book.register(make_addr(8000), 1);
        assert!(book.best().is_none());
    }

    #[test]
    fn test_channel_network_routes_messages() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let book = Arc::new(RwLock::new(PeerBook::new()));
        let network = ChannelNetwork::new(tx, book);

        let addr = make_addr(8000);
        network.send(addr, Message::GetMaxChainScore);
        network.broadcast(Message::MaxChainScore(Some(5)));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.to, Some(addr));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.to, None);
    }
}
