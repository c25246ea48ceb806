use std::collections::BTreeSet;
use std::ops::Range;

use glam::Vec2;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::input::FrameInput;
use crate::net::udp::MAX_PEERS;
use crate::net::{ClientMessage, Delivery, MessageCodec, PeerId, ServerMessage, Transport, TransportError};
use crate::settings::Settings;
use crate::store::{Entity, EntityStore, MAX_ENTITIES};

use super::timer::SendTimer;
use super::{Role, Status};

/// Entities created per spawn trigger and removed per destroy trigger.
pub const BATCH_SIZE: u32 = 10;
/// Multiplier applied to every velocity when integrating.
pub const SPEED: f32 = 80.0;
/// Side of the square drawn for one entity.
pub const ENTITY_EXTENT: f32 = 32.0;
/// How far past its center an entity may travel before bouncing.
pub const ENTITY_MARGIN: f32 = 8.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ServerTelemetry {
    pub entities: u32,
    pub connected: usize,
    pub max_clients: usize,
    pub send_rate: u32,
    pub messages_per_second: u64,
}

/// Authoritative simulation: owns entity identity, integrates motion and feeds observers.
pub struct ServerSimulation {
    store: EntityStore,
    rng: StdRng,
    bounds: Vec2,
    batch_size: u32,
    codec: MessageCodec,
    timer: SendTimer,
    peers: BTreeSet<PeerId>,
}

impl ServerSimulation {
    pub fn new(settings: &Settings) -> Self {
        Self::with_rng(settings, StdRng::from_entropy())
    }

    pub fn with_rng(settings: &Settings, rng: StdRng) -> Self {
        Self {
            store: EntityStore::authoritative(MAX_ENTITIES),
            rng,
            bounds: Vec2::new(
                settings.display.width as f32,
                settings.display.height as f32,
            ),
            batch_size: BATCH_SIZE,
            codec: MessageCodec::new(settings.network.redundant_bytes),
            timer: SendTimer::new(settings.network.send_rate),
            peers: BTreeSet::new(),
        }
    }

    /// Replaces the store with an empty one of the given capacity.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.store = EntityStore::authoritative(capacity);
        self
    }

    pub fn bounds(&self) -> Vec2 {
        self.bounds
    }

    pub fn connected(&self) -> usize {
        self.peers.len()
    }

    pub fn telemetry(&self) -> ServerTelemetry {
        let connected = self.peers.len();
        ServerTelemetry {
            entities: self.store.count(),
            connected,
            max_clients: MAX_PEERS,
            send_rate: self.timer.rate(),
            messages_per_second: connected as u64
                * self.store.count() as u64
                * self.timer.rate() as u64,
        }
    }

    /// Allocates a batch at `origin` and, when observers are connected, announces it.
    /// A failed announcement is logged and the rest of the batch is still sent.
    pub fn spawn(&mut self, origin: Vec2, transport: &mut dyn Transport) -> Range<Entity> {
        let spawned = self
            .store
            .allocate_batch(origin, self.batch_size, &mut self.rng);

        if !self.peers.is_empty() {
            for id in spawned.clone() {
                self.broadcast(id, ServerMessage::spawn, transport);
            }
        }

        spawned
    }

    /// Advances every entity and bounces it off the world edges.
    pub fn integrate(&mut self, dt: f32) {
        let bounds = self.bounds;
        let half = ENTITY_EXTENT / 2.0;
        let (positions, velocities) = self.store.motion_mut();

        for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
            *position += *velocity * SPEED * dt;

            if position.x + half + ENTITY_MARGIN > bounds.x || position.x + half - ENTITY_MARGIN < 0.0 {
                velocity.x = -velocity.x;
            }
            if position.y + half + ENTITY_MARGIN > bounds.y || position.y + half - ENTITY_MARGIN < 0.0 {
                velocity.y = -velocity.y;
            }
        }
    }

    /// Removes the most recent batch. Returns the new entity count.
    pub fn destroy(&mut self, transport: &mut dyn Transport) -> Option<Entity> {
        if !self.store.exists() {
            return None;
        }

        let cutoff = self.store.count().saturating_sub(self.batch_size);
        self.store.truncate(cutoff).ok()?;

        if !self.peers.is_empty() {
            let message = ServerMessage::Destroy { cutoff };
            let result = transport.broadcast(&self.codec.encode_server(&message), message.delivery());
            log_failed_send(result, &message);
        }

        Some(cutoff)
    }

    fn broadcast_positions(&mut self, transport: &mut dyn Transport) {
        for id in 0..self.store.count() {
            self.broadcast(id, ServerMessage::movement, transport);
        }
    }

    fn broadcast(
        &self,
        id: Entity,
        build: fn(&EntityStore, Entity) -> Option<ServerMessage>,
        transport: &mut dyn Transport,
    ) {
        if let Some(message) = build(&self.store, id) {
            let result = transport.broadcast(&self.codec.encode_server(&message), message.delivery());
            log_failed_send(result, &message);
        }
    }
}

fn log_failed_send(result: Result<(), TransportError>, message: &ServerMessage) {
    if let Err(e) = result {
        log::warn!("{:?} send failed: {}", message.kind(), e);
    }
}

impl Role for ServerSimulation {
    fn on_connect(
        &mut self,
        peer: PeerId,
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        self.peers.insert(peer);
        log::info!("{} connected ({}/{})", peer, self.peers.len(), MAX_PEERS);

        if !self.store.exists() {
            return Ok(());
        }

        for id in 0..self.store.count() {
            if let Some(message) = ServerMessage::spawn(&self.store, id) {
                let result = transport.send(peer, &self.codec.encode_server(&message), Delivery::Reliable);
                log_failed_send(result, &message);
            }
        }
        log::debug!("Sent {} entities to {}", self.store.count(), peer);
        Ok(())
    }

    fn on_disconnect(&mut self, peer: PeerId) {
        if self.peers.remove(&peer) {
            log::info!("{} disconnected ({}/{})", peer, self.peers.len(), MAX_PEERS);
        }
    }

    fn on_receive(
        &mut self,
        peer: PeerId,
        payload: &[u8],
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError> {
        match MessageCodec::decode_client(payload) {
            Ok(Some(ClientMessage::SpawnRequest { position })) => {
                self.spawn(position, transport);
            }
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
        self.timer.accumulate(dt);

        if input.spawn() {
            self.spawn(input.pointer, transport);
        }

        if self.store.exists() {
            self.integrate(dt);

            if !self.peers.is_empty() && self.timer.consume() {
                self.broadcast_positions(transport);
            }
        }

        if input.destroy_requested() {
            self.destroy(transport);
        }

        Ok(())
    }

    fn store(&self) -> &EntityStore {
        &self.store
    }

    fn status(&self) -> Status {
        Status::Listening
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::net::test_support::RecordingTransport;

    fn simulation() -> ServerSimulation {
        ServerSimulation::with_rng(&Settings::default(), StdRng::seed_from_u64(7)).with_capacity(64)
    }

    #[test]
    fn spawn_without_peers_sends_nothing() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();

        let spawned = server.spawn(Vec2::new(100.0, 100.0), &mut transport);

        assert_eq!(spawned, 0..10);
        assert_eq!(server.store().count(), 10);
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn spawn_announces_exactly_the_new_batch() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.spawn(Vec2::ZERO, &mut transport);
        server.on_connect(PeerId(0), &mut transport).unwrap();
        transport.sent.clear();

        server.spawn(Vec2::ZERO, &mut transport);

        let ids: Vec<_> = transport
            .sent
            .iter()
            .map(|sent| match MessageCodec::decode_server(&sent.payload) {
                Ok(Some(ServerMessage::Spawn(record))) => record.id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, (10..20).collect::<Vec<_>>());
        assert!(transport.sent.iter().all(|s| s.peer.is_none() && s.delivery.is_reliable()));
    }

    #[test]
    fn spawn_is_capped_by_capacity() {
        let mut server = ServerSimulation::with_rng(&Settings::default(), StdRng::seed_from_u64(1))
            .with_capacity(15);
        let mut transport = RecordingTransport::default();

        server.spawn(Vec2::ZERO, &mut transport);
        let second = server.spawn(Vec2::ZERO, &mut transport);

        assert_eq!(second, 10..15);
        assert_eq!(server.store().count(), 15);
    }

    #[test]
    fn integrate_reflects_at_edges() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.spawn(Vec2::new(790.0, 300.0), &mut transport);

        let before: Vec<f32> = server.store().velocities().iter().map(|v| v.x).collect();
        server.integrate(0.0);
        let after: Vec<f32> = server.store().velocities().iter().map(|v| v.x).collect();

        for (b, a) in before.iter().zip(&after) {
            assert_eq!(*a, -*b);
        }
    }

    #[test]
    fn integrate_moves_by_velocity_times_speed() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.spawn(Vec2::new(400.0, 300.0), &mut transport);
        let velocity = server.store().velocity(0).unwrap();

        server.integrate(0.01);

        let expected = Vec2::new(400.0, 300.0) + velocity * SPEED * 0.01;
        assert!(server.store().position(0).unwrap().abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn destroy_truncates_last_batch_and_broadcasts_cutoff() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.on_connect(PeerId(3), &mut transport).unwrap();
        server.spawn(Vec2::ZERO, &mut transport);
        server.spawn(Vec2::ZERO, &mut transport);
        transport.sent.clear();

        assert_eq!(server.destroy(&mut transport), Some(10));
        assert_eq!(server.store().count(), 10);
        assert_eq!(
            MessageCodec::decode_server(&transport.sent[0].payload).unwrap(),
            Some(ServerMessage::Destroy { cutoff: 10 })
        );

        assert_eq!(server.destroy(&mut transport), Some(0));
        assert!(!server.store().exists());
        assert_eq!(server.destroy(&mut transport), None);
    }

    #[test]
    fn failed_sends_do_not_skip_integration_or_destroy() {
        let mut server = simulation();
        let mut transport = RecordingTransport {
            fail_sends: true,
            ..RecordingTransport::default()
        };
        server.spawn(Vec2::new(400.0, 300.0), &mut transport);
        server.on_connect(PeerId(0), &mut transport).unwrap();
        server.spawn(Vec2::new(400.0, 300.0), &mut transport);
        assert_eq!(server.store().count(), 20);

        let velocity = server.store().velocity(0).unwrap();
        server.tick(0.1, &FrameInput::destroy(), &mut transport).unwrap();

        let expected = Vec2::new(400.0, 300.0) + velocity * SPEED * 0.1;
        assert!(server.store().position(0).unwrap().abs_diff_eq(expected, 1e-3));
        assert_eq!(server.store().count(), 10);
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn late_joiner_receives_every_active_entity() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.spawn(Vec2::new(100.0, 100.0), &mut transport);

        server.on_connect(PeerId(1), &mut transport).unwrap();

        assert_eq!(transport.sent.len(), 10);
        assert!(transport.sent.iter().all(|s| s.peer == Some(PeerId(1))));
    }

    #[test]
    fn moves_follow_the_send_rate() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.on_connect(PeerId(0), &mut transport).unwrap();
        server.spawn(Vec2::new(400.0, 300.0), &mut transport);
        transport.sent.clear();

        for _ in 0..60 {
            server.tick(1.0 / 60.0, &FrameInput::idle(), &mut transport).unwrap();
        }

        let flushes = transport.sent.len() / 10;
        assert!((14..=15).contains(&flushes), "{flushes} flushes");
        assert!(transport.sent.iter().all(|s| !s.delivery.is_reliable()));
    }

    #[test]
    fn spawn_request_from_observer_spawns_a_batch() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.on_connect(PeerId(0), &mut transport).unwrap();

        let request = MessageCodec::new(0)
            .encode_client(&ClientMessage::SpawnRequest { position: Vec2::new(5.0, 6.0) });
        server.on_receive(PeerId(0), &request, &mut transport).unwrap();

        assert_eq!(server.store().count(), 10);
        assert_eq!(server.store().position(9), Some(Vec2::new(5.0, 6.0)));
        assert_eq!(transport.sent.len(), 10);
    }

    #[test]
    fn telemetry_counts_messages_per_second() {
        let mut server = simulation();
        let mut transport = RecordingTransport::default();
        server.on_connect(PeerId(0), &mut transport).unwrap();
        server.on_connect(PeerId(1), &mut transport).unwrap();
        server.spawn(Vec2::ZERO, &mut transport);

        let telemetry = server.telemetry();
        assert_eq!(telemetry.connected, 2);
        assert_eq!(telemetry.max_clients, 32);
        assert_eq!(telemetry.messages_per_second, 2 * 10 * 15);

        server.on_disconnect(PeerId(1));
        assert_eq!(server.connected(), 1);
    }
}
