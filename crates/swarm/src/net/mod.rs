mod protocol;
mod stats;
mod transport;
pub mod udp;

pub use protocol::{
    ClientMessage, CodecError, MAX_REDUNDANT_BYTES, MessageCodec, MessageKind, MoveRecord,
    ServerMessage, SpawnRecord,
};
pub use stats::{NetworkStats, PacketLossSimulation};
pub use transport::{Delivery, PeerId, Transport, TransportError, TransportEvent, TransportKind};
pub use udp::{UdpConfig, UdpTransport};

use crate::settings::NetworkSettings;

fn udp_config(settings: &NetworkSettings) -> UdpConfig {
    UdpConfig {
        packet_loss: PacketLossSimulation::with_loss(settings.simulated_loss),
        ..UdpConfig::default()
    }
}

/// Opens the configured adapter as a host on every interface at `settings.port`.
pub fn listen(settings: &NetworkSettings) -> Result<Box<dyn Transport>, TransportError> {
    match settings.transport.parse::<TransportKind>()? {
        TransportKind::Udp => Ok(Box::new(UdpTransport::listen(
            ("0.0.0.0", settings.port),
            udp_config(settings),
        )?)),
    }
}

/// Opens the configured adapter and starts connecting to `settings.ip:settings.port`.
pub fn connect(settings: &NetworkSettings) -> Result<Box<dyn Transport>, TransportError> {
    match settings.transport.parse::<TransportKind>()? {
        TransportKind::Udp => Ok(Box::new(UdpTransport::connect(
            &settings.ip,
            settings.port,
            udp_config(settings),
        )?)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_transport_is_unsupported() {
        let settings = NetworkSettings {
            transport: "hypernet".into(),
            ..NetworkSettings::default()
        };

        assert!(matches!(listen(&settings), Err(TransportError::Unsupported(_))));
        assert!(matches!(connect(&settings), Err(TransportError::Unsupported(_))));
    }

    #[test]
    fn unresolvable_host_fails_address_assignment() {
        let settings = NetworkSettings {
            ip: "host.invalid".into(),
            ..NetworkSettings::default()
        };

        assert!(matches!(
            connect(&settings),
            Err(TransportError::AddressResolution(_))
        ));
    }
}
