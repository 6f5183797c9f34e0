//! Redfish capability probe
//!
//! Walks the Systems collection of a Redfish service (iDRAC 7+), extracts
//! system identity from the first ComputerSystem resource, and fetches the
//! manager resource for controller firmware details. Any transport failure,
//! timeout, or non-2xx response is folded into the capability record.

use super::{
    ManagementProtocol, ManagerInfo, PowerState, ProbeReport, ProtocolCapability, ProtocolProbe,
    SystemInfo,
};
use crate::credentials::CredentialCandidate;
use async_trait::async_trait;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

const SYSTEMS_PATH: &str = "/redfish/v1/Systems";
const MANAGERS_PATH: &str = "/redfish/v1/Managers";

/// Redfish REST probe
pub struct RedfishProbe {
    client: reqwest::Client,
    fetch_manager_info: bool,
}

#[derive(Debug, Deserialize)]
struct ResourceCollection {
    #[serde(rename = "Members", default)]
    members: Vec<ODataRef>,
}

#[derive(Debug, Deserialize)]
struct ODataRef {
    #[serde(rename = "@odata.id")]
    odata_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ComputerSystem {
    host_name: Option<String>,
    model: Option<String>,
    /// Dell populates the service tag in SKU
    #[serde(rename = "SKU")]
    sku: Option<String>,
    serial_number: Option<String>,
    bios_version: Option<String>,
    power_state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Manager {
    manager_type: Option<String>,
    firmware_version: Option<String>,
}

impl RedfishProbe {
    pub fn new(timeout: Duration, fetch_manager_info: bool) -> crate::Result<Self> {
        // Management controllers ship self-signed certificates; verification
        // is disabled the same way racadm and OpenManage clients do it.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| crate::DiscoveryError::ConfigError(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            client,
            fetch_manager_info,
        })
    }

    fn base_url(address: Ipv4Addr, credential: &CredentialCandidate) -> String {
        format!("{}://{}:{}", credential.scheme, address, credential.port)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        credential: &CredentialCandidate,
    ) -> Result<T, reqwest::Error> {
        self.client
            .get(url)
            .basic_auth(&credential.username, Some(&credential.secret))
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    fn parse_system(system: ComputerSystem) -> SystemInfo {
        let power_state = match system.power_state.as_deref() {
            Some("On") => PowerState::On,
            Some("Off") => PowerState::Off,
            _ => PowerState::Unknown,
        };
        SystemInfo {
            hostname: system.host_name,
            model: system.model,
            service_tag: system.sku.or(system.serial_number),
            bios_version: system.bios_version,
            power_state,
        }
    }

    async fn fetch_manager(
        &self,
        base: &str,
        credential: &CredentialCandidate,
    ) -> Option<ManagerInfo> {
        let collection: ResourceCollection = self
            .get_json(&format!("{}{}", base, MANAGERS_PATH), credential)
            .await
            .ok()?;
        let member = collection.members.first()?;
        let manager: Manager = self
            .get_json(&format!("{}{}", base, member.odata_id), credential)
            .await
            .ok()?;
        Some(ManagerInfo {
            manager_type: manager.manager_type,
            firmware_version: manager.firmware_version,
        })
    }
}

#[async_trait]
impl ProtocolProbe for RedfishProbe {
    fn protocol(&self) -> ManagementProtocol {
        ManagementProtocol::Redfish
    }

    async fn probe(&self, address: Ipv4Addr, credential: &CredentialCandidate) -> ProbeReport {
        let base = Self::base_url(address, credential);
        let start = Instant::now();

        let response = match self
            .client
            .get(format!("{}{}", base, SYSTEMS_PATH))
            .basic_auth(&credential.username, Some(&credential.secret))
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let mut cap = ProtocolCapability::unreachable(ManagementProtocol::Redfish);
                // A body/decode error after the exchange still proves transport
                if !(e.is_connect() || e.is_timeout()) {
                    cap = cap.transport_connected();
                }
                log::debug!("redfish {}: {}", address, e);
                return ProbeReport::capability_only(cap);
            }
        };

        let latency = start.elapsed();
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let cap = ProtocolCapability::unreachable(ManagementProtocol::Redfish)
                .auth_rejected()
                .with_latency(latency);
            return ProbeReport::capability_only(cap);
        }

        if !status.is_success() {
            let cap = ProtocolCapability::unreachable(ManagementProtocol::Redfish)
                .transport_connected()
                .with_latency(latency);
            return ProbeReport::capability_only(cap);
        }

        let collection: ResourceCollection = match response.json().await {
            Ok(collection) => collection,
            Err(e) => {
                log::debug!("redfish {}: systems collection unparseable: {}", address, e);
                let cap = ProtocolCapability::healthy(ManagementProtocol::Redfish)
                    .with_latency(latency)
                    .degraded();
                return ProbeReport::capability_only(cap);
            }
        };

        let mut capability =
            ProtocolCapability::healthy(ManagementProtocol::Redfish).with_latency(latency);

        let system = match collection.members.first() {
            Some(member) => {
                match self
                    .get_json::<ComputerSystem>(&format!("{}{}", base, member.odata_id), credential)
                    .await
                {
                    Ok(system) => Some(Self::parse_system(system)),
                    Err(e) => {
                        log::debug!("redfish {}: system resource failed: {}", address, e);
                        capability = capability.degraded();
                        None
                    }
                }
            }
            None => {
                capability = capability.degraded();
                None
            }
        };

        let manager = if self.fetch_manager_info {
            match self.fetch_manager(&base, credential).await {
                Some(manager) => {
                    if let Some(version) = &manager.firmware_version {
                        capability = capability.with_firmware_version(version.clone());
                    }
                    if let Some(kind) = &manager.manager_type {
                        capability = capability.with_manager_type(kind.clone());
                    }
                    Some(manager)
                }
                None => {
                    // Manager info unavailable: result still useful, protocol degraded
                    capability = capability.degraded();
                    None
                }
            }
        } else {
            None
        };

        ProbeReport {
            capability,
            system,
            manager,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Scheme;

    #[test]
    fn test_base_url_uses_candidate_scheme_and_port() {
        let credential = CredentialCandidate::new("root", "calvin")
            .with_port(8443)
            .with_scheme(Scheme::Https);
        assert_eq!(
            RedfishProbe::base_url(Ipv4Addr::new(10, 0, 0, 1), &credential),
            "https://10.0.0.1:8443"
        );
    }

    #[test]
    fn test_parse_systems_collection() {
        let body = r#"{
            "@odata.id": "/redfish/v1/Systems",
            "Members": [{"@odata.id": "/redfish/v1/Systems/System.Embedded.1"}],
            "Members@odata.count": 1
        }"#;
        let collection: ResourceCollection = serde_json::from_str(body).unwrap();
        assert_eq!(collection.members.len(), 1);
        assert_eq!(
            collection.members[0].odata_id,
            "/redfish/v1/Systems/System.Embedded.1"
        );
    }

    #[test]
    fn test_parse_computer_system() {
        let body = r#"{
            "HostName": "db-host-04",
            "Model": "PowerEdge R750",
            "SKU": "7FK2T34",
            "SerialNumber": "CN7792214C0001",
            "BiosVersion": "1.8.2",
            "PowerState": "On"
        }"#;
        let system: ComputerSystem = serde_json::from_str(body).unwrap();
        let info = RedfishProbe::parse_system(system);
        assert_eq!(info.hostname.as_deref(), Some("db-host-04"));
        assert_eq!(info.model.as_deref(), Some("PowerEdge R750"));
        assert_eq!(info.service_tag.as_deref(), Some("7FK2T34"));
        assert_eq!(info.bios_version.as_deref(), Some("1.8.2"));
        assert_eq!(info.power_state, PowerState::On);
    }

    #[test]
    fn test_serial_number_fallback_for_service_tag() {
        let body = r#"{"SerialNumber": "CN7792214C0001", "PowerState": "Off"}"#;
        let system: ComputerSystem = serde_json::from_str(body).unwrap();
        let info = RedfishProbe::parse_system(system);
        assert_eq!(info.service_tag.as_deref(), Some("CN7792214C0001"));
        assert_eq!(info.power_state, PowerState::Off);
    }

    #[test]
    fn test_parse_manager() {
        let body = r#"{
            "ManagerType": "BMC",
            "FirmwareVersion": "6.10.30.00",
            "Model": "14G Monolithic"
        }"#;
        let manager: Manager = serde_json::from_str(body).unwrap();
        assert_eq!(manager.manager_type.as_deref(), Some("BMC"));
        assert_eq!(manager.firmware_version.as_deref(), Some("6.10.30.00"));
    }
}
