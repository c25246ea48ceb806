pub mod input;
pub mod net;
pub mod role;
pub mod session;
pub mod settings;
pub mod store;
pub mod telemetry;

pub use input::{FrameInput, Triggers, Viewport};
pub use net::{
    ClientMessage, CodecError, Delivery, MessageCodec, MessageKind, NetworkStats,
    PacketLossSimulation, PeerId, ServerMessage, Transport, TransportError, TransportEvent,
    TransportKind, UdpConfig, UdpTransport,
};
pub use role::{
    ClientReplica, ClientTelemetry, Role, SendTimer, ServerSimulation, ServerTelemetry, Status,
};
pub use session::{FrameClock, Session, frame_budget};
pub use settings::{DEFAULT_PORT, DEFAULT_SETTINGS_PATH, Settings, SettingsError};
pub use store::{Entity, EntityStore, MAX_ENTITIES, PALETTE, Rgb, Rgba, StoreError};
pub use telemetry::FrameStats;
