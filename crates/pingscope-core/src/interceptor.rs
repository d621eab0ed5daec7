use chrono::{DateTime, Utc};

use crate::ids::{ClientId, ConnectionId};

/// Identity of the client that owns a connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInformation {
    client_id: ClientId,
}

impl ClientInformation {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }
}

/// Read-only metadata of a received PINGREQ. The packet has no payload.
#[derive(Clone, Debug)]
pub struct PingReqPacket {
    pub connection_id: ConnectionId,
    pub received_at: DateTime<Utc>,
}

/// What an interceptor sees for one inbound PINGREQ.
#[derive(Clone, Debug)]
pub struct PingReqInboundInput {
    client_information: ClientInformation,
    packet: PingReqPacket,
}

impl PingReqInboundInput {
    pub fn new(client_information: ClientInformation, packet: PingReqPacket) -> Self {
        Self {
            client_information,
            packet,
        }
    }

    pub fn client_information(&self) -> &ClientInformation {
        &self.client_information
    }

    pub fn packet(&self) -> &PingReqPacket {
        &self.packet
    }
}

/// Output side of a PINGREQ interception.
///
/// PINGREQ carries nothing an interceptor may change; the type keeps the
/// interceptor signature uniform with other packet types.
#[derive(Clone, Debug, Default)]
pub struct PingReqInboundOutput {
    _private: (),
}

impl PingReqInboundOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-connection observer of inbound PINGREQ packets.
///
/// Called synchronously on the broker's packet-processing thread, so
/// implementations must return promptly and must not block.
pub trait PingReqInboundInterceptor: Send + Sync {
    /// Name used by the host when reporting interceptor faults.
    fn name(&self) -> &str;

    fn on_inbound_ping_req(&self, input: &PingReqInboundInput, output: &mut PingReqInboundOutput);
}
