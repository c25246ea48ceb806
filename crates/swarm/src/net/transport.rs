use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use super::stats::NetworkStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Unreliable,
    Reliable,
}

impl Delivery {
    pub fn is_reliable(&self) -> bool {
        matches!(self, Self::Reliable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Received { peer: PeerId, payload: Vec<u8> },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported network transport \"{0}\"")]
    Unsupported(String),
    #[error("Host creation failed: {0}")]
    HostCreation(io::Error),
    #[error("Address assignment failed: {0}")]
    AddressResolution(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(io::Error),
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

/// Selects the concrete adapter behind [`Transport`]. New adapters get a variant here
/// and an arm in [`crate::net::listen`] / [`crate::net::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Udp,
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Ok(Self::Udp),
            _ => Err(TransportError::Unsupported(s.to_string())),
        }
    }
}

/// The narrow surface the replication roles use. Connection setup belongs to the
/// adapter constructors.
pub trait Transport {
    fn name(&self) -> &'static str;

    fn send(&mut self, peer: PeerId, payload: &[u8], delivery: Delivery)
    -> Result<(), TransportError>;

    fn broadcast(&mut self, payload: &[u8], delivery: Delivery) -> Result<(), TransportError>;

    /// Next pending event, never blocking. `None` once nothing is left this frame.
    fn poll(&mut self) -> Result<Option<TransportEvent>, TransportError>;

    fn round_trip_time(&self, peer: PeerId) -> Option<Duration>;

    fn peer_count(&self) -> usize;

    fn stats(&self) -> NetworkStats;

    fn flush(&mut self) -> Result<(), TransportError>;

    fn disconnect_all(&mut self);
}
