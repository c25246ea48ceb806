use glam::Vec2;

use crate::store::{Entity, EntityStore, Rgb};

use super::transport::Delivery;
use super::udp::MAX_PAYLOAD_SIZE;

/// Largest unpadded message: a Spawn (kind, id, four floats, three color bytes).
pub const MAX_MESSAGE_SIZE: usize = 2 + 5 + 4 * 5 + 3 * 2;

const BLOB_HEADER_SIZE: usize = 5;

/// Padding that still lets every message fit in one transport payload.
pub const MAX_REDUNDANT_BYTES: usize = MAX_PAYLOAD_SIZE - MAX_MESSAGE_SIZE - BLOB_HEADER_SIZE;

const TAG_U8: u8 = 0x20;
const TAG_U32: u8 = 0x40;
const TAG_F32: u8 = 0x62;
const TAG_BLOB: u8 = 0xC0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    Spawn = 0x0A,
    Move = 0x0B,
    Destroy = 0x0C,
}

impl MessageKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0A => Some(Self::Spawn),
            0x0B => Some(Self::Move),
            0x0C => Some(Self::Destroy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("message truncated at byte {0}")]
    Truncated(usize),
    #[error("expected type tag {expected:#04x} at byte {offset}, found {found:#04x}")]
    UnexpectedTag { offset: usize, expected: u8, found: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRecord {
    pub id: Entity,
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRecord {
    pub id: Entity,
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Authoritative host to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerMessage {
    Spawn(SpawnRecord),
    Move(MoveRecord),
    Destroy { cutoff: Entity },
}

impl ServerMessage {
    pub fn spawn(store: &EntityStore, id: Entity) -> Option<Self> {
        Some(Self::Spawn(SpawnRecord {
            id,
            position: store.position(id)?,
            velocity: store.velocity(id)?,
            color: store.color(id)?.rgb(),
        }))
    }

    pub fn movement(store: &EntityStore, id: Entity) -> Option<Self> {
        Some(Self::Move(MoveRecord {
            id,
            position: store.position(id)?,
            velocity: store.velocity(id)?,
        }))
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Spawn(_) => MessageKind::Spawn,
            Self::Move(_) => MessageKind::Move,
            Self::Destroy { .. } => MessageKind::Destroy,
        }
    }

    pub fn delivery(&self) -> Delivery {
        match self {
            Self::Move(_) => Delivery::Unreliable,
            Self::Spawn(_) | Self::Destroy { .. } => Delivery::Reliable,
        }
    }
}

/// Observer to authoritative host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientMessage {
    SpawnRequest { position: Vec2 },
}

impl ClientMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SpawnRequest { .. } => MessageKind::Spawn,
        }
    }

    pub fn delivery(&self) -> Delivery {
        Delivery::Reliable
    }
}

/// Encodes and decodes messages as a tagged value list, optionally padded with a
/// zero-filled blob for bandwidth experiments.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    padding: Vec<u8>,
}

impl MessageCodec {
    pub fn new(redundant_bytes: usize) -> Self {
        Self {
            padding: vec![0u8; redundant_bytes.min(MAX_REDUNDANT_BYTES)],
        }
    }

    pub fn redundant_bytes(&self) -> usize {
        self.padding.len()
    }

    pub fn encode_server(&self, message: &ServerMessage) -> Vec<u8> {
        let mut writer = ListWriter::with_capacity(32 + self.padding.len());
        writer.u8(message.kind() as u8);

        match message {
            ServerMessage::Spawn(record) => {
                writer.u32(record.id);
                writer.vec2(record.position);
                writer.vec2(record.velocity);
                writer.u8(record.color.r);
                writer.u8(record.color.g);
                writer.u8(record.color.b);
            }
            ServerMessage::Move(record) => {
                writer.u32(record.id);
                writer.vec2(record.position);
                writer.vec2(record.velocity);
            }
            ServerMessage::Destroy { cutoff } => {
                writer.u32(*cutoff);
            }
        }

        self.finish(writer)
    }

    pub fn encode_client(&self, message: &ClientMessage) -> Vec<u8> {
        let mut writer = ListWriter::with_capacity(16 + self.padding.len());
        writer.u8(message.kind() as u8);

        match message {
            ClientMessage::SpawnRequest { position } => writer.vec2(*position),
        }

        self.finish(writer)
    }

    fn finish(&self, mut writer: ListWriter) -> Vec<u8> {
        if !self.padding.is_empty() {
            writer.blob(&self.padding);
        }
        writer.into_inner()
    }

    /// Returns `Ok(None)` for kinds the observer does not understand.
    pub fn decode_server(data: &[u8]) -> Result<Option<ServerMessage>, CodecError> {
        let mut reader = ListReader::new(data);
        let Some(kind) = MessageKind::from_byte(reader.u8()?) else {
            return Ok(None);
        };

        let message = match kind {
            MessageKind::Spawn => ServerMessage::Spawn(SpawnRecord {
                id: reader.u32()?,
                position: reader.vec2()?,
                velocity: reader.vec2()?,
                color: Rgb::new(reader.u8()?, reader.u8()?, reader.u8()?),
            }),
            MessageKind::Move => ServerMessage::Move(MoveRecord {
                id: reader.u32()?,
                position: reader.vec2()?,
                velocity: reader.vec2()?,
            }),
            MessageKind::Destroy => ServerMessage::Destroy {
                cutoff: reader.u32()?,
            },
        };

        Ok(Some(message))
    }

    /// Returns `Ok(None)` for kinds the host does not accept from observers.
    pub fn decode_client(data: &[u8]) -> Result<Option<ClientMessage>, CodecError> {
        let mut reader = ListReader::new(data);
        match MessageKind::from_byte(reader.u8()?) {
            Some(MessageKind::Spawn) => Ok(Some(ClientMessage::SpawnRequest {
                position: reader.vec2()?,
            })),
            _ => Ok(None),
        }
    }
}

struct ListWriter {
    buf: Vec<u8>,
}

impl ListWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(TAG_U8);
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.buf.push(TAG_U32);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn f32(&mut self, value: f32) {
        self.buf.push(TAG_F32);
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn vec2(&mut self, value: Vec2) {
        self.f32(value.x);
        self.f32(value.y);
    }

    fn blob(&mut self, data: &[u8]) {
        self.buf.push(TAG_BLOB);
        self.buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(data);
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct ListReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ListReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn value<const N: usize>(&mut self, tag: u8) -> Result<[u8; N], CodecError> {
        let found = *self
            .data
            .get(self.offset)
            .ok_or(CodecError::Truncated(self.offset))?;
        if found != tag {
            return Err(CodecError::UnexpectedTag {
                offset: self.offset,
                expected: tag,
                found,
            });
        }

        let start = self.offset + 1;
        let bytes = self
            .data
            .get(start..start + N)
            .ok_or(CodecError::Truncated(self.data.len()))?;
        self.offset = start + N;

        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.value::<1>(TAG_U8).map(|[b]| b)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.value::<4>(TAG_U32).map(u32::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32, CodecError> {
        self.value::<4>(TAG_F32).map(f32::from_le_bytes)
    }

    fn vec2(&mut self) -> Result<Vec2, CodecError> {
        Ok(Vec2::new(self.f32()?, self.f32()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> ServerMessage {
        ServerMessage::Spawn(SpawnRecord {
            id: 5,
            position: Vec2::new(50.0, 50.0),
            velocity: Vec2::new(10.0, 0.0),
            color: Rgb::new(94, 8, 255),
        })
    }

    #[test]
    fn test_spawn_layout() {
        let bytes = MessageCodec::default().encode_server(&spawn());

        assert_eq!(&bytes[..2], &[TAG_U8, 0x0A]);
        assert_eq!(&bytes[2..7], &[TAG_U32, 5, 0, 0, 0]);
        assert_eq!(bytes[7], TAG_F32);
        assert_eq!(&bytes[8..12], &50.0f32.to_le_bytes());
        assert_eq!(bytes.len(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_destroy_roundtrip() {
        let codec = MessageCodec::default();
        let bytes = codec.encode_server(&ServerMessage::Destroy { cutoff: 90 });

        assert_eq!(
            MessageCodec::decode_server(&bytes),
            Ok(Some(ServerMessage::Destroy { cutoff: 90 }))
        );
    }

    #[test]
    fn test_padding_is_ignored_on_decode() {
        let codec = MessageCodec::new(256);
        let plain = MessageCodec::default().encode_server(&spawn());
        let padded = codec.encode_server(&spawn());

        assert_eq!(padded.len(), plain.len() + BLOB_HEADER_SIZE + 256);
        assert_eq!(MessageCodec::decode_server(&padded), Ok(Some(spawn())));
    }

    #[test]
    fn test_padding_is_clamped() {
        let codec = MessageCodec::new(MAX_REDUNDANT_BYTES * 2);
        assert_eq!(codec.redundant_bytes(), MAX_REDUNDANT_BYTES);
    }

    #[test]
    fn test_fully_padded_spawn_fits_one_payload() {
        let codec = MessageCodec::new(MAX_REDUNDANT_BYTES);
        assert_eq!(codec.encode_server(&spawn()).len(), MAX_PAYLOAD_SIZE);

        let request = ClientMessage::SpawnRequest { position: Vec2::ONE };
        assert!(codec.encode_client(&request).len() < MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let bytes = [TAG_U8, 0x7F, TAG_U32, 1, 0, 0, 0];
        assert_eq!(MessageCodec::decode_server(&bytes), Ok(None));
        assert_eq!(MessageCodec::decode_client(&bytes), Ok(None));
    }

    #[test]
    fn test_host_ignores_server_kinds() {
        let bytes = MessageCodec::default().encode_server(&ServerMessage::Destroy { cutoff: 3 });
        assert_eq!(MessageCodec::decode_client(&bytes), Ok(None));
    }

    #[test]
    fn test_spawn_request_roundtrip() {
        let codec = MessageCodec::new(8);
        let request = ClientMessage::SpawnRequest {
            position: Vec2::new(320.5, 17.25),
        };

        let bytes = codec.encode_client(&request);
        assert_eq!(MessageCodec::decode_client(&bytes), Ok(Some(request)));
    }

    #[test]
    fn test_truncated_message() {
        let bytes = MessageCodec::default().encode_server(&spawn());
        let result = MessageCodec::decode_server(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(CodecError::Truncated(_))));
        assert_eq!(MessageCodec::decode_server(&[]), Err(CodecError::Truncated(0)));
    }

    #[test]
    fn test_wrong_tag() {
        let mut bytes = MessageCodec::default().encode_server(&ServerMessage::Destroy { cutoff: 1 });
        bytes[2] = TAG_F32;

        assert_eq!(
            MessageCodec::decode_server(&bytes),
            Err(CodecError::UnexpectedTag {
                offset: 2,
                expected: TAG_U32,
                found: TAG_F32
            })
        );
    }

    #[test]
    fn test_delivery_policy() {
        let movement = ServerMessage::Move(MoveRecord {
            id: 0,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
        });

        assert_eq!(spawn().delivery(), Delivery::Reliable);
        assert_eq!(movement.delivery(), Delivery::Unreliable);
        assert_eq!(
            ServerMessage::Destroy { cutoff: 0 }.delivery(),
            Delivery::Reliable
        );
    }
}
