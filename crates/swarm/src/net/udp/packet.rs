use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const PROTOCOL_MAGIC: u32 = 0x5357_524D;
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
/// Archived header, reliable sequence, payload length and alignment padding.
const PACKET_OVERHEAD: usize = 64;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - PACKET_OVERHEAD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketKind {
    Connect,
    Accept,
    Data,
    Ack,
    Disconnect,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("bad protocol magic {0:#010x}")]
    BadMagic(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub kind: PacketKind,
    pub sequence: u32,
    pub ack: u32,
    pub ack_bitfield: u32,
}

impl PacketHeader {
    pub fn new(kind: PacketKind, sequence: u32, ack: u32, ack_bitfield: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            kind,
            sequence,
            ack,
            ack_bitfield,
        }
    }

    /// Control packets carry sequence 0, which is never tracked or acknowledged.
    pub fn control(kind: PacketKind) -> Self {
        Self::new(kind, 0, 0, 0)
    }
}

/// One datagram. Only `Data` packets carry a payload; `reliable_sequence` orders the
/// reliable ones.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub reliable_sequence: Option<u32>,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn control(kind: PacketKind) -> Self {
        Self {
            header: PacketHeader::control(kind),
            reliable_sequence: None,
            payload: Vec::new(),
        }
    }

    pub fn ack(ack: u32, ack_bitfield: u32) -> Self {
        Self {
            header: PacketHeader::new(PacketKind::Ack, 0, ack, ack_bitfield),
            reliable_sequence: None,
            payload: Vec::new(),
        }
    }

    pub fn data(header: PacketHeader, reliable_sequence: Option<u32>, payload: Vec<u8>) -> Self {
        Self {
            header,
            reliable_sequence,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    /// Validates and copies out a received datagram. Anything without our magic is
    /// rejected.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        // Receive buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);

        let packet = rkyv::from_bytes::<Self, rancor::Error>(&aligned)
            .map_err(PacketError::Deserialize)?;
        if packet.header.magic != PROTOCOL_MAGIC {
            return Err(PacketError::BadMagic(packet.header.magic));
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_packet(reliable_sequence: Option<u32>, payload: Vec<u8>) -> Packet {
        Packet::data(
            PacketHeader::new(PacketKind::Data, 7, 3, 0b101),
            reliable_sequence,
            payload,
        )
    }

    #[test]
    fn test_reliable_data_roundtrip() {
        let packet = data_packet(Some(2), vec![1, 2, 3]);

        let bytes = packet.encode().unwrap();
        assert_eq!(Packet::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_control_packets_have_no_payload() {
        let bytes = Packet::control(PacketKind::Connect).encode().unwrap();
        let decoded = Packet::decode(&bytes).unwrap();

        assert_eq!(decoded.header, PacketHeader::control(PacketKind::Connect));
        assert!(decoded.payload.is_empty());
        assert!(bytes.len() <= PACKET_OVERHEAD);
    }

    #[test]
    fn test_largest_payload_fits_one_datagram() {
        let bytes = data_packet(Some(u32::MAX), vec![0xAB; MAX_PAYLOAD_SIZE])
            .encode()
            .unwrap();
        assert!(bytes.len() <= MAX_DATAGRAM_SIZE, "{} bytes", bytes.len());
    }

    #[test]
    fn test_decode_reads_unaligned_input() {
        let bytes = data_packet(None, vec![9; 5]).encode().unwrap();
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);

        assert_eq!(Packet::decode(&shifted[1..]).unwrap().payload, vec![9; 5]);
    }

    #[test]
    fn test_rejects_foreign_datagrams() {
        assert!(matches!(
            Packet::decode(&[0; 4]),
            Err(PacketError::Deserialize(_))
        ));
        assert!(matches!(
            Packet::decode(&[0xFF; 48]),
            Err(PacketError::Deserialize(_))
        ));

        let mut foreign = Packet::control(PacketKind::Ack);
        foreign.header.magic = 0xDEAD_BEEF;
        let bytes = foreign.encode().unwrap();
        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::BadMagic(0xDEAD_BEEF))
        ));
    }
}
