//! Out-of-band management protocol probes
//!
//! One probe per protocol, all sharing the same contract: a bounded-time
//! capability check against one address with one credential. Probes never
//! return errors; every failure mode is folded into the capability record.

pub mod ipmi;
pub mod racadm;
pub mod redfish;
pub mod ssh;
pub mod wsman;

use crate::config::DiscoveryConfig;
use crate::credentials::CredentialCandidate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

pub use ipmi::IpmiProbe;
pub use racadm::RacadmProbe;
pub use redfish::RedfishProbe;
pub use ssh::SshProbe;
pub use wsman::WsManProbe;

/// Management protocols the engine knows how to probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagementProtocol {
    Redfish,
    WsMan,
    Racadm,
    Ipmi,
    Ssh,
}

impl ManagementProtocol {
    /// Full protocol set, in preference order
    pub fn all() -> &'static [ManagementProtocol] {
        &[
            ManagementProtocol::Redfish,
            ManagementProtocol::WsMan,
            ManagementProtocol::Racadm,
            ManagementProtocol::Ipmi,
            ManagementProtocol::Ssh,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ManagementProtocol::Redfish => "redfish",
            ManagementProtocol::WsMan => "wsman",
            ManagementProtocol::Racadm => "racadm",
            ManagementProtocol::Ipmi => "ipmi",
            ManagementProtocol::Ssh => "ssh",
        }
    }

    /// Preference ranking: 1 is most preferred
    pub fn default_priority(&self) -> u8 {
        match self {
            ManagementProtocol::Redfish => 1,
            ManagementProtocol::WsMan => 2,
            ManagementProtocol::Racadm => 3,
            ManagementProtocol::Ipmi => 4,
            ManagementProtocol::Ssh => 5,
        }
    }

    /// Firmware update delivery modes the protocol can drive
    pub fn update_modes(&self) -> Vec<UpdateMode> {
        match self {
            ManagementProtocol::Redfish => vec![UpdateMode::Online, UpdateMode::Staged],
            ManagementProtocol::WsMan => vec![UpdateMode::Staged],
            ManagementProtocol::Racadm => vec![UpdateMode::Online],
            ManagementProtocol::Ipmi | ManagementProtocol::Ssh => Vec::new(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redfish" => Some(ManagementProtocol::Redfish),
            "wsman" | "ws-man" => Some(ManagementProtocol::WsMan),
            "racadm" => Some(ManagementProtocol::Racadm),
            "ipmi" => Some(ManagementProtocol::Ipmi),
            "ssh" => Some(ManagementProtocol::Ssh),
            _ => None,
        }
    }
}

impl std::fmt::Display for ManagementProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Health classification of one protocol on one host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Healthy,
    Degraded,
    Unreachable,
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Healthy => write!(f, "healthy"),
            ProbeStatus::Degraded => write!(f, "degraded"),
            ProbeStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Firmware update delivery mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Applied immediately without a host reboot
    Online,
    /// Staged to the controller, applied at next reboot
    Staged,
}

/// Capability record for one protocol on one host in one discovery run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolCapability {
    pub protocol: ManagementProtocol,
    pub supported: bool,
    pub manager_type: Option<String>,
    pub firmware_version: Option<String>,
    pub update_modes: Vec<UpdateMode>,
    /// 1 = most preferred
    pub priority: u8,
    pub latency: Option<Duration>,
    pub status: ProbeStatus,
    /// A TCP/TLS handshake (or datagram exchange) reached the service
    pub transport_connected: bool,
    /// The service answered but rejected the credential
    pub auth_rejected: bool,
}

impl ProtocolCapability {
    /// Baseline record: nothing reached, nothing supported
    pub fn unreachable(protocol: ManagementProtocol) -> Self {
        Self {
            protocol,
            supported: false,
            manager_type: None,
            firmware_version: None,
            update_modes: Vec::new(),
            priority: protocol.default_priority(),
            latency: None,
            status: ProbeStatus::Unreachable,
            transport_connected: false,
            auth_rejected: false,
        }
    }

    /// Record for a verified, fully usable protocol
    pub fn healthy(protocol: ManagementProtocol) -> Self {
        Self {
            supported: true,
            update_modes: protocol.update_modes(),
            status: ProbeStatus::Healthy,
            transport_connected: true,
            ..Self::unreachable(protocol)
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_manager_type(mut self, manager_type: impl Into<String>) -> Self {
        self.manager_type = Some(manager_type.into());
        self
    }

    pub fn with_firmware_version(mut self, version: impl Into<String>) -> Self {
        self.firmware_version = Some(version.into());
        self
    }

    pub fn degraded(mut self) -> Self {
        self.status = ProbeStatus::Degraded;
        self
    }

    pub fn transport_connected(mut self) -> Self {
        self.transport_connected = true;
        self
    }

    pub fn auth_rejected(mut self) -> Self {
        self.auth_rejected = true;
        self.transport_connected = true;
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }
}

/// Power state reported by a management controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

impl Default for PowerState {
    fn default() -> Self {
        PowerState::Unknown
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// System identity extracted while probing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: Option<String>,
    pub model: Option<String>,
    pub service_tag: Option<String>,
    pub bios_version: Option<String>,
    #[serde(default)]
    pub power_state: PowerState,
}

impl SystemInfo {
    /// Fill fields this record is missing from a lower-preference source
    pub fn merge_missing_from(&mut self, other: &SystemInfo) {
        if self.hostname.is_none() {
            self.hostname = other.hostname.clone();
        }
        if self.model.is_none() {
            self.model = other.model.clone();
        }
        if self.service_tag.is_none() {
            self.service_tag = other.service_tag.clone();
        }
        if self.bios_version.is_none() {
            self.bios_version = other.bios_version.clone();
        }
        if self.power_state == PowerState::Unknown {
            self.power_state = other.power_state;
        }
    }
}

/// Management controller identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerInfo {
    pub manager_type: Option<String>,
    pub firmware_version: Option<String>,
}

/// Everything one probe learned about one protocol on one host
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub capability: ProtocolCapability,
    pub system: Option<SystemInfo>,
    pub manager: Option<ManagerInfo>,
}

impl ProbeReport {
    pub fn capability_only(capability: ProtocolCapability) -> Self {
        Self {
            capability,
            system: None,
            manager: None,
        }
    }
}

/// A bounded-time capability check for one protocol
#[async_trait]
pub trait ProtocolProbe: Send + Sync {
    fn protocol(&self) -> ManagementProtocol;

    /// Probe one address with one credential. Must complete within the
    /// configured timeout plus small overhead and must never error.
    async fn probe(&self, address: Ipv4Addr, credential: &CredentialCandidate) -> ProbeReport;
}

/// Build the probe set selected by the configuration
pub fn build_probe_set(config: &DiscoveryConfig) -> crate::Result<Vec<Arc<dyn ProtocolProbe>>> {
    let timeout = config.timeout_duration();
    let mut probes: Vec<Arc<dyn ProtocolProbe>> = Vec::with_capacity(config.protocols.len());

    for protocol in &config.protocols {
        let probe: Arc<dyn ProtocolProbe> = match protocol {
            ManagementProtocol::Redfish => {
                Arc::new(RedfishProbe::new(timeout, config.fetch_manager_info)?)
            }
            ManagementProtocol::WsMan => Arc::new(WsManProbe::new(timeout)?),
            ManagementProtocol::Racadm => Arc::new(RacadmProbe::new(timeout)?),
            ManagementProtocol::Ipmi => Arc::new(IpmiProbe::new(timeout, config.ipmi_port)),
            ManagementProtocol::Ssh => Arc::new(SshProbe::new(timeout, config.ssh_port)),
        };
        probes.push(probe);
    }

    Ok(probes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(ManagementProtocol::Redfish.default_priority() < ManagementProtocol::WsMan.default_priority());
        assert!(ManagementProtocol::Ipmi.default_priority() < ManagementProtocol::Ssh.default_priority());
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!(ManagementProtocol::parse("Redfish"), Some(ManagementProtocol::Redfish));
        assert_eq!(ManagementProtocol::parse("ws-man"), Some(ManagementProtocol::WsMan));
        assert_eq!(ManagementProtocol::parse("telnet"), None);
    }

    #[test]
    fn test_unreachable_capability_shape() {
        let cap = ProtocolCapability::unreachable(ManagementProtocol::Ipmi);
        assert!(!cap.supported);
        assert_eq!(cap.status, ProbeStatus::Unreachable);
        assert_eq!(cap.priority, 4);
        assert!(cap.update_modes.is_empty());
    }

    #[test]
    fn test_auth_rejected_implies_transport() {
        let cap = ProtocolCapability::unreachable(ManagementProtocol::Redfish).auth_rejected();
        assert!(cap.transport_connected);
        assert!(cap.auth_rejected);
        assert!(!cap.supported);
    }

    #[test]
    fn test_system_info_merge_prefers_existing() {
        let mut primary = SystemInfo {
            model: Some("PowerEdge R750".to_string()),
            ..Default::default()
        };
        let secondary = SystemInfo {
            model: Some("PowerEdge R640".to_string()),
            service_tag: Some("ABC1234".to_string()),
            power_state: PowerState::On,
            ..Default::default()
        };
        primary.merge_missing_from(&secondary);
        assert_eq!(primary.model.as_deref(), Some("PowerEdge R750"));
        assert_eq!(primary.service_tag.as_deref(), Some("ABC1234"));
        assert_eq!(primary.power_state, PowerState::On);
    }
}
