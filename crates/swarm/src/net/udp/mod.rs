mod packet;
mod peer;
mod tracking;

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use super::stats::{NetworkStats, PacketLossSimulation};
use super::transport::{Delivery, PeerId, Transport, TransportError, TransportEvent};

pub use packet::{MAX_DATAGRAM_SIZE, MAX_PAYLOAD_SIZE, Packet, PacketError, PacketHeader, PacketKind};
pub use peer::{ConnectionState, Peer, PeerTable};
pub use tracking::{AckTracker, ReceiveTracker, ReliableInbox, sequence_greater_than};

pub const MAX_PEERS: usize = 32;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;
const CONNECT_RETRY: Duration = Duration::from_millis(250);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
/// An ack covers its own sequence plus the 32 before it, so a burst is acked at least
/// this often or older datagrams fall out of the bitfield.
const ACK_EVERY: u32 = 32;

#[derive(Debug, Clone)]
pub struct UdpConfig {
    pub max_peers: usize,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub packet_loss: PacketLossSimulation,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_peers: MAX_PEERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            packet_loss: PacketLossSimulation::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Listen,
    Connect,
}

/// Reliable-UDP adapter: a handshake, per-peer ack bitfields, retransmission of
/// reliable payloads with in-order delivery, keepalives and timeouts.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    mode: Mode,
    peers: PeerTable,
    config: UdpConfig,
    events: VecDeque<TransportEvent>,
    stats: NetworkStats,
    recv_buffer: Vec<u8>,
}

impl UdpTransport {
    pub fn listen<A: ToSocketAddrs>(addr: A, config: UdpConfig) -> Result<Self, TransportError> {
        let transport = Self::bind(addr, Mode::Listen, config)?;
        log::info!("Listening for connections on {}", transport.local_addr);
        Ok(transport)
    }

    pub fn connect(host: &str, port: u16, config: UdpConfig) -> Result<Self, TransportError> {
        let server_addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| TransportError::AddressResolution(format!("{host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::AddressResolution(format!("{host}:{port}")))?;

        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let mut transport = Self::bind(bind_addr, Mode::Connect, config)?;
        let now = Instant::now();
        transport
            .peers
            .insert(server_addr, ConnectionState::Connecting, now);
        transport
            .send_control(server_addr, PacketKind::Connect)
            .map_err(TransportError::ConnectionFailed)?;

        log::info!("Connecting to {}", server_addr);
        Ok(transport)
    }

    fn bind<A: ToSocketAddrs>(addr: A, mode: Mode, config: UdpConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(TransportError::HostCreation)?;
        socket
            .set_nonblocking(true)
            .map_err(TransportError::HostCreation)?;
        let local_addr = socket.local_addr().map_err(TransportError::HostCreation)?;

        Ok(Self {
            socket,
            local_addr,
            mode,
            peers: PeerTable::new(config.max_peers),
            config,
            events: VecDeque::new(),
            stats: NetworkStats::default(),
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE],
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn service(&mut self) -> Result<(), TransportError> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => {
                    let packet = match Packet::decode(&self.recv_buffer[..size]) {
                        Ok(packet) => packet,
                        Err(e) => {
                            log::debug!("Dropping datagram from {}: {}", addr, e);
                            continue;
                        }
                    };
                    self.stats.record_received(size);
                    self.handle_packet(packet, addr, Instant::now());
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable surfaces here on some platforms; timeouts handle it.
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.maintain(Instant::now());
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr, now: Instant) {
        match packet.header.kind {
            PacketKind::Connect => self.handle_connect(addr, now),
            PacketKind::Accept => {
                if let Some(peer) = self.peers.get_by_addr_mut(&addr) {
                    peer.touch(now);
                    if peer.state == ConnectionState::Connecting {
                        peer.state = ConnectionState::Connected;
                        self.events.push_back(TransportEvent::Connected(peer.id));
                    }
                }
            }
            PacketKind::Data => self.handle_data(packet, addr, now),
            PacketKind::Ack => {
                if let Some(peer) = self.peers.get_by_addr_mut(&addr) {
                    peer.touch(now);
                    peer.acks
                        .process_ack(packet.header.ack, packet.header.ack_bitfield, now);
                }
            }
            PacketKind::Disconnect => {
                let Some(id) = self.peers.get_by_addr_mut(&addr).map(|p| p.id) else {
                    return;
                };
                self.peers.remove(id);
                self.events.push_back(TransportEvent::Disconnected(id));
            }
        }
    }

    fn handle_connect(&mut self, addr: SocketAddr, now: Instant) {
        if self.mode != Mode::Listen {
            return;
        }

        if let Some(peer) = self.peers.get_by_addr_mut(&addr) {
            peer.touch(now);
            let _ = self.send_control(addr, PacketKind::Accept);
            return;
        }

        let Some(id) = self
            .peers
            .insert(addr, ConnectionState::Connected, now)
            .map(|peer| peer.id)
        else {
            log::warn!("Refusing {}: peer limit of {} reached", addr, self.config.max_peers);
            let _ = self.send_control(addr, PacketKind::Disconnect);
            return;
        };

        if let Err(e) = self.send_control(addr, PacketKind::Accept) {
            log::warn!("Failed to accept {}: {}", addr, e);
        }
        log::info!("{} connected from {}", id, addr);
        self.events.push_back(TransportEvent::Connected(id));
    }

    fn handle_data(&mut self, packet: Packet, addr: SocketAddr, now: Instant) {
        let Self {
            socket,
            peers,
            stats,
            config,
            events,
            ..
        } = self;

        let Some(peer) = peers.get_by_addr_mut(&addr) else {
            return;
        };

        peer.touch(now);
        if peer.state == ConnectionState::Connecting {
            // The accept was lost; data from the host implies it.
            peer.state = ConnectionState::Connected;
            events.push_back(TransportEvent::Connected(peer.id));
        }

        peer.acks
            .process_ack(packet.header.ack, packet.header.ack_bitfield, now);

        let fresh = peer.received.record_received(packet.header.sequence);
        peer.unacked_received += 1;
        if peer.unacked_received >= ACK_EVERY {
            if let Err(e) = transmit_ack(socket, stats, config, peer, now) {
                log::debug!("Ack to {} failed: {}", peer.addr, e);
            }
        }

        if !fresh {
            return;
        }

        let id = peer.id;
        match packet.reliable_sequence {
            Some(sequence) => {
                for payload in peer.inbox.accept(sequence, packet.payload) {
                    events.push_back(TransportEvent::Received { peer: id, payload });
                }
            }
            None => events.push_back(TransportEvent::Received {
                peer: id,
                payload: packet.payload,
            }),
        }
    }

    fn maintain(&mut self, now: Instant) {
        if self.mode == Mode::Connect {
            self.maintain_handshake(now);
        }

        for id in self.peers.timed_out(self.config.timeout, now) {
            log::info!("{} timed out", id);
            self.peers.remove(id);
            self.events.push_back(TransportEvent::Disconnected(id));
        }

        let Self {
            socket,
            peers,
            stats,
            config,
            ..
        } = self;

        for peer in peers.iter_mut().filter(|p| p.is_connected()) {
            for (reliable_sequence, payload) in peer.acks.due_resends(now) {
                stats.record_lost();
                if let Err(e) =
                    transmit_data(socket, stats, config, peer, Some(reliable_sequence), payload, now)
                {
                    log::warn!("Resend to {} failed: {}", peer.addr, e);
                }
            }

            let idle = now.duration_since(peer.last_send_time) >= KEEPALIVE_INTERVAL;
            if peer.owes_ack() || idle {
                if let Err(e) = transmit_ack(socket, stats, config, peer, now) {
                    log::debug!("Ack to {} failed: {}", peer.addr, e);
                }
            }
        }
    }

    fn maintain_handshake(&mut self, now: Instant) {
        let pending: Vec<(PeerId, SocketAddr, bool)> = self
            .peers
            .iter()
            .filter(|p| p.state == ConnectionState::Connecting)
            .map(|p| {
                (
                    p.id,
                    p.addr,
                    now.duration_since(p.created_at) > self.config.connect_timeout,
                )
            })
            .collect();

        for (id, addr, expired) in pending {
            if expired {
                log::warn!("No answer from {}", addr);
                self.peers.remove(id);
                self.events.push_back(TransportEvent::Disconnected(id));
                continue;
            }

            let retry_due = self
                .peers
                .get(id)
                .is_some_and(|p| now.duration_since(p.last_send_time) >= CONNECT_RETRY);
            if retry_due {
                let _ = self.send_control(addr, PacketKind::Connect);
                if let Some(peer) = self.peers.get_mut(id) {
                    peer.last_send_time = now;
                }
            }
        }
    }

    fn send_control(&mut self, addr: SocketAddr, kind: PacketKind) -> io::Result<()> {
        let bytes = Packet::control(kind).encode().map_err(io::Error::other)?;
        let sent = self.socket.send_to(&bytes, addr)?;
        self.stats.record_sent(sent);
        Ok(())
    }
}

fn transmit(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    config: &UdpConfig,
    addr: SocketAddr,
    packet: &Packet,
) -> io::Result<()> {
    let bytes = packet.encode().map_err(io::Error::other)?;
    stats.record_sent(bytes.len());

    if config.packet_loss.should_drop() {
        return Ok(());
    }

    match socket.send_to(&bytes, addr) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            stats.record_lost();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn transmit_data(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    config: &UdpConfig,
    peer: &mut Peer,
    reliable_sequence: Option<u32>,
    payload: Vec<u8>,
    now: Instant,
) -> io::Result<()> {
    let sequence = peer.next_sequence();
    let (ack, ack_bitfield) = peer.received.ack_data();
    let header = PacketHeader::new(PacketKind::Data, sequence, ack, ack_bitfield);
    let packet = Packet::data(header, reliable_sequence, payload);

    peer.acks.track_packet(sequence, reliable_sequence, now);
    peer.last_send_time = now;
    peer.unacked_received = 0;
    transmit(socket, stats, config, peer.addr, &packet)
}

fn transmit_ack(
    socket: &UdpSocket,
    stats: &mut NetworkStats,
    config: &UdpConfig,
    peer: &mut Peer,
    now: Instant,
) -> io::Result<()> {
    let (ack, ack_bitfield) = peer.received.ack_data();
    peer.last_send_time = now;
    peer.unacked_received = 0;
    transmit(socket, stats, config, peer.addr, &Packet::ack(ack, ack_bitfield))
}

impl Transport for UdpTransport {
    fn name(&self) -> &'static str {
        "UDP"
    }

    fn send(
        &mut self,
        peer: PeerId,
        payload: &[u8],
        delivery: Delivery,
    ) -> Result<(), TransportError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let Self {
            socket,
            peers,
            stats,
            config,
            ..
        } = self;

        let target = peers
            .get_mut(peer)
            .filter(|p| p.is_connected())
            .ok_or(TransportError::UnknownPeer(peer))?;

        let now = Instant::now();
        let reliable_sequence = if delivery.is_reliable() {
            let sequence = target.next_reliable_sequence();
            target.acks.retain_reliable(sequence, payload.to_vec(), now);
            Some(sequence)
        } else {
            None
        };

        transmit_data(
            socket,
            stats,
            config,
            target,
            reliable_sequence,
            payload.to_vec(),
            now,
        )?;
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8], delivery: Delivery) -> Result<(), TransportError> {
        let mut result = Ok(());
        for id in self.peers.connected_ids() {
            if let Err(e) = self.send(id, payload, delivery) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn poll(&mut self) -> Result<Option<TransportEvent>, TransportError> {
        if self.events.is_empty() {
            self.service()?;
        }
        Ok(self.events.pop_front())
    }

    fn round_trip_time(&self, peer: PeerId) -> Option<Duration> {
        self.peers
            .get(peer)
            .filter(|p| p.is_connected())
            .map(|p| Duration::from_secs_f32(p.acks.srtt().max(0.0) / 1000.0))
    }

    fn peer_count(&self) -> usize {
        self.peers.connected_count()
    }

    fn stats(&self) -> NetworkStats {
        let mut stats = self.stats.clone();
        let connected: Vec<&Peer> = self.peers.iter().filter(|p| p.is_connected()).collect();
        if !connected.is_empty() {
            let n = connected.len() as f32;
            stats.rtt_ms = connected.iter().map(|p| p.acks.srtt()).sum::<f32>() / n;
            stats.rtt_variance = connected.iter().map(|p| p.acks.rtt_var()).sum::<f32>() / n;
        }
        stats
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        let Self {
            socket,
            peers,
            stats,
            config,
            ..
        } = self;

        let now = Instant::now();
        for peer in peers.iter_mut().filter(|p| p.owes_ack()) {
            transmit_ack(socket, stats, config, peer, now)?;
        }
        Ok(())
    }

    fn disconnect_all(&mut self) {
        let addrs: Vec<SocketAddr> = self.peers.iter().map(|p| p.addr).collect();
        for addr in addrs {
            if let Err(e) = self.send_control(addr, PacketKind::Disconnect) {
                log::debug!("Disconnect to {} failed: {}", addr, e);
            }
        }
        self.peers.clear();
        self.events.clear();
    }
}
