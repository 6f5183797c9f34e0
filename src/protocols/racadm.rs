//! Remote RACADM capability probe
//!
//! Remote RACADM rides the iDRAC web service, so the probe detects the
//! iDRAC HTTPS surface: response headers and login-page markers. A web
//! server that answers but is not an iDRAC does not support RACADM.

use super::{ManagementProtocol, ProbeReport, ProtocolCapability, ProtocolProbe};
use crate::credentials::CredentialCandidate;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Markers that identify a Dell remote-access controller web surface
const IDRAC_MARKERS: &[&str] = &[
    "idrac",
    "integrated dell remote access",
    "remote access controller",
    "restgui",
];

/// Remote RACADM probe
pub struct RacadmProbe {
    client: reqwest::Client,
}

impl RacadmProbe {
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| crate::DiscoveryError::ConfigError(format!("HTTP client init failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Detect iDRAC markers in the server header or response body
    fn detect_idrac(server_header: Option<&str>, body: &str) -> bool {
        let haystacks = [server_header.unwrap_or(""), body];
        haystacks.iter().any(|haystack| {
            let lowered = haystack.to_ascii_lowercase();
            IDRAC_MARKERS.iter().any(|marker| lowered.contains(marker))
        })
    }
}

#[async_trait]
impl ProtocolProbe for RacadmProbe {
    fn protocol(&self) -> ManagementProtocol {
        ManagementProtocol::Racadm
    }

    async fn probe(&self, address: Ipv4Addr, credential: &CredentialCandidate) -> ProbeReport {
        let url = format!("{}://{}:{}/", credential.scheme, address, credential.port);
        let start = Instant::now();

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                let mut cap = ProtocolCapability::unreachable(ManagementProtocol::Racadm);
                if !(e.is_connect() || e.is_timeout()) {
                    cap = cap.transport_connected();
                }
                log::debug!("racadm {}: {}", address, e);
                return ProbeReport::capability_only(cap);
            }
        };

        let latency = start.elapsed();
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let cap = ProtocolCapability::unreachable(ManagementProtocol::Racadm)
                .auth_rejected()
                .with_latency(latency);
            return ProbeReport::capability_only(cap);
        }

        let server_header = response
            .headers()
            .get(reqwest::header::SERVER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.unwrap_or_default();

        let capability = if Self::detect_idrac(server_header.as_deref(), &body) {
            ProtocolCapability::healthy(ManagementProtocol::Racadm)
                .with_latency(latency)
                .with_manager_type("iDRAC")
        } else {
            // Some web server answered, but RACADM is not served here
            ProtocolCapability::unreachable(ManagementProtocol::Racadm)
                .transport_connected()
                .with_latency(latency)
        };

        ProbeReport::capability_only(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_idrac_by_server_header() {
        assert!(RacadmProbe::detect_idrac(Some("iDRAC/9"), ""));
        assert!(!RacadmProbe::detect_idrac(Some("Mbedthis-Appweb/2.4.2"), ""));
    }

    #[test]
    fn test_detect_idrac_by_login_page() {
        let body = r#"<html><title>Integrated Dell Remote Access Controller 9</title></html>"#;
        assert!(RacadmProbe::detect_idrac(None, body));
    }

    #[test]
    fn test_detect_idrac_by_restgui_redirect() {
        let body = r#"<script>window.location="/restgui/start.html"</script>"#;
        assert!(RacadmProbe::detect_idrac(None, body));
    }

    #[test]
    fn test_plain_web_server_is_not_idrac() {
        assert!(!RacadmProbe::detect_idrac(
            Some("nginx/1.25.3"),
            "<html><body>It works!</body></html>"
        ));
    }
}
