use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::net::transport::PeerId;

use super::tracking::{AckTracker, ReceiveTracker, ReliableInbox};

const MAX_IN_FLIGHT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
}

#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    pub acks: AckTracker,
    pub received: ReceiveTracker,
    pub inbox: ReliableInbox,
    pub created_at: Instant,
    pub last_receive_time: Instant,
    pub last_send_time: Instant,
    /// Data datagrams received since the last ack went out.
    pub unacked_received: u32,
    send_sequence: u32,
    reliable_sequence: u32,
}

impl Peer {
    pub fn new(id: PeerId, addr: SocketAddr, state: ConnectionState, now: Instant) -> Self {
        Self {
            id,
            addr,
            state,
            acks: AckTracker::new(MAX_IN_FLIGHT),
            received: ReceiveTracker::new(),
            inbox: ReliableInbox::new(),
            created_at: now,
            last_receive_time: now,
            last_send_time: now,
            unacked_received: 0,
            send_sequence: 0,
            reliable_sequence: 0,
        }
    }

    /// Datagram sequences start at 1; 0 marks untracked control packets.
    pub fn next_sequence(&mut self) -> u32 {
        self.send_sequence = self.send_sequence.wrapping_add(1);
        if self.send_sequence == 0 {
            self.send_sequence = 1;
        }
        self.send_sequence
    }

    pub fn next_reliable_sequence(&mut self) -> u32 {
        self.reliable_sequence = self.reliable_sequence.wrapping_add(1);
        self.reliable_sequence
    }

    pub fn owes_ack(&self) -> bool {
        self.unacked_received > 0
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.duration_since(self.last_receive_time) > timeout
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_receive_time = now;
    }
}

#[derive(Debug)]
pub struct PeerTable {
    by_addr: HashMap<SocketAddr, PeerId>,
    peers: BTreeMap<PeerId, Peer>,
    next_id: u32,
    max_peers: usize,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self {
            by_addr: HashMap::new(),
            peers: BTreeMap::new(),
            next_id: 0,
            max_peers,
        }
    }

    pub fn insert(
        &mut self,
        addr: SocketAddr,
        state: ConnectionState,
        now: Instant,
    ) -> Option<&mut Peer> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let id = PeerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        self.by_addr.insert(addr, id);
        Some(
            self.peers
                .entry(id)
                .or_insert_with(|| Peer::new(id, addr, state, now)),
        )
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut Peer> {
        let id = self.by_addr.get(addr)?;
        self.peers.get_mut(id)
    }

    pub fn contains_addr(&self, addr: &SocketAddr) -> bool {
        self.by_addr.contains_key(addr)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        self.by_addr.remove(&peer.addr);
        Some(peer)
    }

    pub fn clear(&mut self) {
        self.peers.clear();
        self.by_addr.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }

    pub fn connected_ids(&self) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|p| p.is_connected())
            .map(|p| p.id)
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_connected()).count()
    }

    pub fn timed_out(&self, timeout: Duration, now: Instant) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|p| p.is_connected() && p.is_timed_out(timeout, now))
            .map(|p| p.id)
            .collect()
    }
}
