use std::time::{Duration, Instant};

use glam::Vec2;

use crate::input::FrameInput;
use crate::net::{
    ClientMessage, MessageCodec, NetworkStats, PeerId, ServerMessage, Transport, TransportError,
};
use crate::store::{EntityStore, MAX_ENTITIES};

use super::{Role, Status};

/// Scales an entity's speed into the distance it may glide per second.
pub const MOVEMENT_CAP: f32 = 80.0;

/// Moves `position` towards `target` by at most `step`, landing exactly on the target
/// once it is within reach.
#[inline]
pub fn step_towards(position: Vec2, target: Vec2, step: f32) -> Vec2 {
    let to_target = target - position;
    let square_distance = to_target.length_squared();

    if square_distance == 0.0 || (step >= 0.0 && square_distance <= step * step) {
        return target;
    }

    position + to_target / square_distance.sqrt() * step
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientTelemetry {
    pub entities: u32,
    pub rtt_ms: u32,
    pub worst_lag_ms: f32,
    pub network: NetworkStats,
}

/// Observer: mirrors the host's entities and hides update gaps by gliding each entity
/// towards its last reported position.
pub struct ClientReplica {
    store: EntityStore,
    codec: MessageCodec,
    status: Status,
    server: Option<PeerId>,
    last_move: Option<Instant>,
    worst_lag: Duration,
    rtt: Option<Duration>,
    network: NetworkStats,
}

impl ClientReplica {
    pub fn new(redundant_bytes: usize) -> Self {
        Self::with_capacity(redundant_bytes, MAX_ENTITIES)
    }

    pub fn with_capacity(redundant_bytes: usize, capacity: u32) -> Self {
        Self {
            store: EntityStore::mirror(capacity),
            codec: MessageCodec::new(redundant_bytes),
            status: Status::Connecting,
            server: None,
            last_move: None,
            worst_lag: Duration::ZERO,
            rtt: None,
            network: NetworkStats::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_some()
    }

    pub fn telemetry(&self) -> ClientTelemetry {
        ClientTelemetry {
            entities: self.store.count(),
            rtt_ms: self.rtt.map_or(0, |rtt| rtt.as_millis() as u32),
            worst_lag_ms: self.worst_lag.as_secs_f32() * 1000.0,
            network: self.network.clone(),
        }
    }

    /// Glides every entity with a known destination towards it.
    pub fn interpolate(&mut self, dt: f32) {
        let (positions, destinations, velocities) = self.store.interpolation_mut();

        for ((position, destination), velocity) in
            positions.iter_mut().zip(destinations).zip(velocities)
        {
            if *destination == Vec2::ZERO {
                continue;
            }
            *position = step_towards(*position, *destination, velocity.length() * MOVEMENT_CAP * dt);
        }
    }

    fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Spawn(record) => {
                if let Err(e) =
                    self.store
                        .insert(record.id, record.position, record.velocity, record.color)
                {
                    log::warn!("Ignoring spawn: {}", e);
                }
            }
            ServerMessage::Move(record) => {
                self.record_move_arrival(Instant::now());
                if let Err(e) = self
                    .store
                    .set_destination(record.id, record.position, record.velocity)
                {
                    log::debug!("Ignoring move: {}", e);
                }
            }
            ServerMessage::Destroy { cutoff } => {
                if let Err(e) = self.store.truncate(cutoff) {
                    log::warn!("Ignoring destroy: {}", e);
                }
            }
        }
    }

    fn record_move_arrival(&mut self, now: Instant) {
        if let Some(last) = self.last_move {
            self.worst_lag = self.worst_lag.max(now.duration_since(last));
        }
        self.last_move = Some(now);
    }
}

impl Role for ClientReplica {
    fn on_connect(
        &mut self,
        peer: PeerId,
        _transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        log::info!("Connected to server as {}", peer);
        self.server = Some(peer);
        self.status = Status::Connected;
        Ok(())
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        if self.server.is_some_and(|server| server != peer) {
            return;
        }

        log::info!("Disconnected from server");
        self.server = None;
        self.status = Status::Disconnected;
        self.store.reset();
        self.last_move = None;
        self.worst_lag = Duration::ZERO;
        self.rtt = None;
    }

    fn on_receive(
        &mut self,
        peer: PeerId,
        payload: &[u8],
        _transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        match MessageCodec::decode_server(payload) {
            Ok(Some(message)) => self.apply(message),
            Ok(None) => {}
            Err(e) => log::warn!("Dropping message from {}: {}", peer, e),
        }
        Ok(())
    }

    fn tick(
        &mut self,
        dt: f32,
        input: &FrameInput,
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        if let Some(server) = self.server {
            if input.spawn() {
                let message = ClientMessage::SpawnRequest {
                    position: input.pointer,
                };
                transport.send(server, &self.codec.encode_client(&message), message.delivery())?;
            }
            self.rtt = transport.round_trip_time(server);
        }
        self.network = transport.stats();

        if self.store.exists() {
            self.interpolate(dt);
        }

        Ok(())
    }

    fn store(&self) -> &EntityStore {
        &self.store
    }

    fn status(&self) -> Status {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::net::SpawnRecord;
    use crate::net::test_support::RecordingTransport;
    use crate::store::PALETTE;

    fn replica() -> ClientReplica {
        ClientReplica::with_capacity(0, 64)
    }

    fn encode(message: ServerMessage) -> Vec<u8> {
        MessageCodec::new(0).encode_server(&message)
    }

    fn spawn(id: u32, position: Vec2, velocity: Vec2) -> Vec<u8> {
        encode(ServerMessage::Spawn(SpawnRecord {
            id,
            position,
            velocity,
            color: PALETTE[2].rgb(),
        }))
    }

    #[test]
    fn step_snaps_within_reach() {
        let target = Vec2::new(10.0, 0.0);
        assert_eq!(step_towards(Vec2::new(9.5, 0.0), target, 1.0), target);
        assert_eq!(step_towards(target, target, 0.0), target);
    }

    #[test]
    fn step_moves_along_straight_line() {
        let next = step_towards(Vec2::ZERO, Vec2::new(30.0, 40.0), 5.0);
        assert!(next.abs_diff_eq(Vec2::new(3.0, 4.0), 1e-5));
    }

    #[test]
    fn spawn_writes_mirror_slot() {
        let mut client = replica();
        let mut transport = RecordingTransport::default();

        client
            .on_receive(PeerId(0), &spawn(5, Vec2::new(50.0, 50.0), Vec2::new(10.0, 0.0)), &mut transport)
            .unwrap();

        let store = client.store();
        assert_eq!(store.count(), 6);
        assert_eq!(store.position(5), Some(Vec2::new(50.0, 50.0)));
        assert_eq!(store.color(5), Some(PALETTE[2]));
        assert_eq!(store.destination(5), Some(Vec2::ZERO));
    }

    #[test]
    fn move_sets_destination_without_snapping() {
        let mut client = replica();
        let mut transport = RecordingTransport::default();
        client
            .on_receive(PeerId(0), &spawn(5, Vec2::new(50.0, 50.0), Vec2::new(10.0, 0.0)), &mut transport)
            .unwrap();

        let movement = encode(ServerMessage::Move(crate::net::MoveRecord {
            id: 5,
            position: Vec2::new(60.0, 50.0),
            velocity: Vec2::new(10.0, 0.0),
        }));
        client.on_receive(PeerId(0), &movement, &mut transport).unwrap();

        assert_eq!(client.store().destination(5), Some(Vec2::new(60.0, 50.0)));
        assert_eq!(client.store().position(5), Some(Vec2::new(50.0, 50.0)));
    }

    #[test]
    fn destroy_truncates_mirror() {
        let mut client = replica();
        let mut transport = RecordingTransport::default();
        for id in 0..20 {
            client
                .on_receive(PeerId(0), &spawn(id, Vec2::ONE, Vec2::ONE), &mut transport)
                .unwrap();
        }

        client
            .on_receive(PeerId(0), &encode(ServerMessage::Destroy { cutoff: 10 }), &mut transport)
            .unwrap();

        assert_eq!(client.store().count(), 10);
        assert!(client.store().exists());
        assert_eq!(client.store().colors().len(), 10);
    }

    #[test]
    fn out_of_range_spawn_is_dropped() {
        let mut client = replica();
        let mut transport = RecordingTransport::default();

        client
            .on_receive(PeerId(0), &spawn(64, Vec2::ONE, Vec2::ONE), &mut transport)
            .unwrap();

        assert_eq!(client.store().count(), 0);
    }

    #[test]
    fn spawn_request_only_when_connected() {
        let mut client = replica();
        let mut transport = RecordingTransport::default();
        let input = FrameInput::spawn_at(Vec2::new(12.0, 34.0));

        client.tick(0.016, &input, &mut transport).unwrap();
        assert!(transport.sent.is_empty());

        client.on_connect(PeerId(0), &mut transport).unwrap();
        client.tick(0.016, &input, &mut transport).unwrap();

        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transport.sent[0].peer, Some(PeerId(0)));
        assert!(transport.sent[0].delivery.is_reliable());
        assert_eq!(
            MessageCodec::decode_client(&transport.sent[0].payload).unwrap(),
            Some(ClientMessage::SpawnRequest {
                position: Vec2::new(12.0, 34.0)
            })
        );
    }

    #[test]
    fn disconnect_clears_everything() {
        let mut client = replica();
        let mut transport = RecordingTransport {
            rtt: Some(Duration::from_millis(40)),
            ..RecordingTransport::default()
        };
        client.on_connect(PeerId(0), &mut transport).unwrap();
        client
            .on_receive(PeerId(0), &spawn(0, Vec2::ONE, Vec2::ONE), &mut transport)
            .unwrap();
        client.tick(0.016, &FrameInput::idle(), &mut transport).unwrap();
        assert_eq!(client.telemetry().rtt_ms, 40);

        client.on_disconnect(PeerId(0));

        assert_eq!(client.status(), Status::Disconnected);
        assert_eq!(client.store().count(), 0);
        assert!(!client.store().exists());
        assert_eq!(client.store().color(0), None);
        assert_eq!(client.telemetry().rtt_ms, 0);
        assert_eq!(client.telemetry().worst_lag_ms, 0.0);
        assert_eq!(client.store().capacity(), 64);
    }

    #[test]
    fn worst_lag_keeps_the_longest_gap() {
        let mut client = replica();
        let start = Instant::now();

        client.record_move_arrival(start);
        client.record_move_arrival(start + Duration::from_millis(30));
        client.record_move_arrival(start + Duration::from_millis(40));

        assert_eq!(client.worst_lag, Duration::from_millis(30));
    }

    #[test]
    fn interpolation_skips_entities_without_destination() {
        let mut client = replica();
        let mut transport = RecordingTransport::default();
        client
            .on_receive(PeerId(0), &spawn(0, Vec2::new(5.0, 5.0), Vec2::ONE), &mut transport)
            .unwrap();

        client.interpolate(1.0);

        assert_eq!(client.store().position(0), Some(Vec2::new(5.0, 5.0)));
    }
}
