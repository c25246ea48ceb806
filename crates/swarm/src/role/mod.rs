mod client;
mod server;
mod timer;

use std::fmt;

pub use client::{ClientReplica, ClientTelemetry, MOVEMENT_CAP, step_towards};
pub use server::{BATCH_SIZE, ENTITY_EXTENT, ENTITY_MARGIN, SPEED, ServerSimulation, ServerTelemetry};
pub use timer::SendTimer;

use crate::input::FrameInput;
use crate::net::{PeerId, Transport, TransportError};
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Listening,
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Listening => "Listening for connections",
            Self::Connecting => "Connecting to server...",
            Self::Connected => "Connected to server",
            Self::Disconnected => "Disconnected from server",
        })
    }
}

/// One side of the replication session. The session drains transport events into the
/// `on_*` hooks, then calls [`Role::tick`] once per frame.
pub trait Role {
    fn on_connect(&mut self, peer: PeerId, transport: &mut dyn Transport)
    -> Result<(), TransportError>;

    fn on_disconnect(&mut self, peer: PeerId);

    fn on_receive(
        &mut self,
        peer: PeerId,
        payload: &[u8],
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError>;

    fn tick(
        &mut self,
        dt: f32,
        input: &FrameInput,
        transport: &mut dyn Transport,
    ) -> Result<(), TransportError>;

    fn store(&self) -> &EntityStore;

    fn status(&self) -> Status;
}
