//! MUDP: raw `MeshPacket`s over UDP multicast, no radio attached.
//!
//! Meshtastic nodes with UDP enabled listen on 224.0.0.69:4403. Packets are
//! encrypted with the channel key and tagged with the channel hash, the same
//! as a radio would put them on the air. With no key they go out `decoded`.

use std::io;
use std::net::SocketAddr;

use adsb_mesh_core::AircraftSummary;
use tokio::net::UdpSocket;

use super::{Sink, SinkError};
use crate::crypto::ChannelKey;
use crate::proto::{node_num_from_id, Data, MeshPacket, PacketIds, Payload, PortNum, User};

/// How the gateway presents itself to the mesh.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
    pub long_name: String,
    pub short_name: String,
}

pub struct MudpSink {
    socket: UdpSocket,
    target: SocketAddr,
    node_num: u32,
    user: User,
    /// `None` sends plaintext.
    channel: Option<ChannelKey>,
    ids: PacketIds,
}

impl MudpSink {
    /// Resolve `target` (host:port) and open a sending socket.
    pub async fn bind(
        target: &str,
        identity: NodeIdentity,
        channel: Option<ChannelKey>,
    ) -> Result<Self, SinkError> {
        let target = tokio::net::lookup_host(target)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("cannot resolve {target}"))
            })?;

        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;
        if let SocketAddr::V4(v4) = target {
            if v4.ip().is_multicast() {
                // Keep it on the local segment
                socket.set_multicast_ttl_v4(1)?;
                socket.set_multicast_loop_v4(true)?;
            }
        }

        Ok(MudpSink {
            socket,
            target,
            node_num: node_num_from_id(&identity.node_id),
            user: User {
                id: identity.node_id,
                long_name: identity.long_name,
                short_name: identity.short_name,
            },
            channel,
            ids: PacketIds::new(),
        })
    }

    pub fn node_num(&self) -> u32 {
        self.node_num
    }

    /// Broadcast our `User` record so nodes show a name instead of a number.
    pub async fn announce(&self) -> Result<(), SinkError> {
        let data = Data {
            portnum: PortNum::NodeInfo,
            payload: self.user.encode(),
        };
        self.send_packet(data).await?;
        log::debug!("Announced MUDP node {} ({})", self.user.id, self.user.long_name);
        Ok(())
    }

    pub fn encrypted(&self) -> bool {
        self.channel.is_some()
    }

    fn packet(&self, data: Data) -> Result<MeshPacket, SinkError> {
        let id = self.ids.next();
        let Some(key) = &self.channel else {
            return Ok(MeshPacket::broadcast(self.node_num, id, data));
        };
        let sealed = key.crypt(id, self.node_num, &data.encode())?;
        Ok(MeshPacket {
            channel: key.hash() as u32,
            payload: Payload::Encrypted(sealed),
            ..MeshPacket::broadcast(self.node_num, id, data)
        })
    }

    async fn send_packet(&self, data: Data) -> Result<(), SinkError> {
        let packet = self.packet(data)?;
        self.socket.send_to(&packet.encode(), self.target).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for MudpSink {
    fn name(&self) -> &str {
        "mudp"
    }

    async fn send(&self, summary: &AircraftSummary) -> Result<(), SinkError> {
        let text = summary.to_text();
        self.send_packet(Data::text(&text)?).await?;
        log::info!("Sent via MUDP: {text}");
        Ok(())
    }
}
