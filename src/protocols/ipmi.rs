//! IPMI capability probe
//!
//! RMCP/ASF Presence Ping over UDP 623. The ping is pre-authentication, so
//! no credential exchange happens here; a Presence Pong with the IPMI bit
//! set proves a BMC is listening. Session setup (RAKP) is left to the
//! update-execution collaborator.

use super::{ManagementProtocol, ProbeReport, ProtocolCapability, ProtocolProbe};
use crate::credentials::CredentialCandidate;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

const RMCP_VERSION: u8 = 0x06;
const RMCP_SEQ_NO_ACK: u8 = 0xFF;
const RMCP_CLASS_ASF: u8 = 0x06;
const ASF_IANA: [u8; 4] = [0x00, 0x00, 0x11, 0xBE];
const ASF_PRESENCE_PING: u8 = 0x80;
const ASF_PRESENCE_PONG: u8 = 0x40;
/// Supported Entities bit: IPMI supported
const PONG_IPMI_BIT: u8 = 0x80;

/// RMCP presence probe
pub struct IpmiProbe {
    timeout: Duration,
    port: u16,
}

impl IpmiProbe {
    pub fn new(timeout: Duration, port: u16) -> Self {
        Self { timeout, port }
    }

    /// Build a 12-byte ASF Presence Ping datagram
    fn build_ping(tag: u8) -> [u8; 12] {
        [
            RMCP_VERSION,
            0x00, // reserved
            RMCP_SEQ_NO_ACK,
            RMCP_CLASS_ASF,
            ASF_IANA[0],
            ASF_IANA[1],
            ASF_IANA[2],
            ASF_IANA[3],
            ASF_PRESENCE_PING,
            tag,
            0x00, // reserved
            0x00, // data length
        ]
    }

    /// Parse a Presence Pong; returns whether the IPMI bit is set
    fn parse_pong(datagram: &[u8], expected_tag: u8) -> Option<bool> {
        if datagram.len() < 12 {
            return None;
        }
        if datagram[3] != RMCP_CLASS_ASF || datagram[4..8] != ASF_IANA {
            return None;
        }
        if datagram[8] != ASF_PRESENCE_PONG || datagram[9] != expected_tag {
            return None;
        }
        // Pong data: IANA(4) + OEM(4) + Supported Entities(1) at offset 20
        let ipmi_supported = datagram
            .get(20)
            .map(|entities| entities & PONG_IPMI_BIT != 0)
            .unwrap_or(false);
        Some(ipmi_supported)
    }

    async fn ping(&self, address: Ipv4Addr) -> std::io::Result<Option<bool>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let target = SocketAddr::from((address, self.port));

        // Tag derived from the address keeps retransmitted pongs attributable
        let tag = address.octets()[3];
        socket.send_to(&Self::build_ping(tag), target).await?;

        let mut buf = [0u8; 64];
        loop {
            let (size, from) = socket.recv_from(&mut buf).await?;
            if from.ip() != std::net::IpAddr::V4(address) {
                continue;
            }
            if let Some(supported) = Self::parse_pong(&buf[..size], tag) {
                return Ok(Some(supported));
            }
        }
    }
}

#[async_trait]
impl ProtocolProbe for IpmiProbe {
    fn protocol(&self) -> ManagementProtocol {
        ManagementProtocol::Ipmi
    }

    async fn probe(&self, address: Ipv4Addr, _credential: &CredentialCandidate) -> ProbeReport {
        let start = Instant::now();

        let capability = match timeout(self.timeout, self.ping(address)).await {
            Ok(Ok(Some(true))) => ProtocolCapability::healthy(ManagementProtocol::Ipmi)
                .with_latency(start.elapsed())
                .with_manager_type("BMC"),
            Ok(Ok(Some(false))) => {
                // ASF responder without IPMI support
                ProtocolCapability::unreachable(ManagementProtocol::Ipmi)
                    .transport_connected()
                    .with_latency(start.elapsed())
            }
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => {
                ProtocolCapability::unreachable(ManagementProtocol::Ipmi)
            }
        };

        ProbeReport::capability_only(capability)
    }
}
