//! WS-Man capability probe
//!
//! Sends the DMTF Identify envelope to the /wsman endpoint and parses the
//! IdentifyResponse body. A host answering Identify with a product vendor
//! speaks WS-Man; anything else on the port does not.

use super::{ManagementProtocol, ProbeReport, ProtocolCapability, ProtocolProbe};
use crate::credentials::CredentialCandidate;
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

const IDENTIFY_ENVELOPE: &str = r#"<?xml version="1.0" encoding="UTF-8"?><s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:wsmid="http://schemas.dmtf.org/wbem/wsman/identity/1/wsmanidentity.xsd"><s:Header/><s:Body><wsmid:Identify/></s:Body></s:Envelope>"#;

/// Identity fields extracted from a WS-Man IdentifyResponse
#[derive(Debug, Default, PartialEq)]
pub(crate) struct IdentifyResponse {
    pub product_vendor: Option<String>,
    pub product_version: Option<String>,
    pub protocol_version: Option<String>,
}

impl IdentifyResponse {
    fn is_valid(&self) -> bool {
        self.product_vendor.is_some() || self.protocol_version.is_some()
    }
}

/// WS-Man SOAP probe
pub struct WsManProbe {
    client: reqwest::Client,
}

impl WsManProbe {
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| crate::DiscoveryError::ConfigError(format!("HTTP client init failed: {}", e)))?;

        Ok(Self { client })
    }

    /// Pull vendor/version text out of an IdentifyResponse document
    pub(crate) fn parse_identify(body: &str) -> IdentifyResponse {
        let mut reader = Reader::from_str(body);
        reader.trim_text(true);

        let mut response = IdentifyResponse::default();
        let mut current: Vec<u8> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    current = e.local_name().as_ref().to_vec();
                }
                Ok(Event::Text(t)) => {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => continue,
                    };
                    match current.as_slice() {
                        b"ProductVendor" => response.product_vendor = Some(text),
                        b"ProductVersion" => response.product_version = Some(text),
                        b"ProtocolVersion" => response.protocol_version = Some(text),
                        _ => {}
                    }
                }
                Ok(Event::End(_)) => current.clear(),
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
        }

        response
    }
}

#[async_trait]
impl ProtocolProbe for WsManProbe {
    fn protocol(&self) -> ManagementProtocol {
        ManagementProtocol::WsMan
    }

    async fn probe(&self, address: Ipv4Addr, credential: &CredentialCandidate) -> ProbeReport {
        let url = format!(
            "{}://{}:{}/wsman",
            credential.scheme, address, credential.port
        );
        let start = Instant::now();

        let response = match self
            .client
            .post(&url)
            .basic_auth(&credential.username, Some(&credential.secret))
            .header("Content-Type", "application/soap+xml;charset=UTF-8")
            .body(IDENTIFY_ENVELOPE)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let mut cap = ProtocolCapability::unreachable(ManagementProtocol::WsMan);
                if !(e.is_connect() || e.is_timeout()) {
                    cap = cap.transport_connected();
                }
                log::debug!("wsman {}: {}", address, e);
                return ProbeReport::capability_only(cap);
            }
        };

        let latency = start.elapsed();
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let cap = ProtocolCapability::unreachable(ManagementProtocol::WsMan)
                .auth_rejected()
                .with_latency(latency);
            return ProbeReport::capability_only(cap);
        }

        if !status.is_success() {
            let cap = ProtocolCapability::unreachable(ManagementProtocol::WsMan)
                .transport_connected()
                .with_latency(latency);
            return ProbeReport::capability_only(cap);
        }

        let body = response.text().await.unwrap_or_default();
        let identify = Self::parse_identify(&body);

        if !identify.is_valid() {
            // Something answered on the port, but it does not speak WS-Man
            let cap = ProtocolCapability::unreachable(ManagementProtocol::WsMan)
                .transport_connected()
                .with_latency(latency);
            return ProbeReport::capability_only(cap);
        }

        let mut capability =
            ProtocolCapability::healthy(ManagementProtocol::WsMan).with_latency(latency);
        if let Some(vendor) = &identify.product_vendor {
            capability = capability.with_manager_type(vendor.clone());
        }
        if let Some(version) = &identify.product_version {
            capability = capability.with_firmware_version(version.clone());
        }

        ProbeReport::capability_only(capability)
    }
}
