//! SSH capability probe
//!
//! Connects to the SSH port and reads the server version banner. The server
//! speaks first per RFC 4253, so no bytes are written. iDRACs expose a
//! restricted SSH shell usable for racadm and SMCLP.

use super::{ManagementProtocol, ProbeReport, ProtocolCapability, ProtocolProbe};
use crate::credentials::CredentialCandidate;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// SSH banner probe
pub struct SshProbe {
    timeout: Duration,
    port: u16,
}

impl SshProbe {
    pub fn new(timeout: Duration, port: u16) -> Self {
        Self { timeout, port }
    }

    /// Extract the software identifier from an `SSH-2.0-…` banner line
    fn parse_banner(banner: &str) -> Option<String> {
        let line = banner.lines().find(|l| l.starts_with("SSH-"))?;
        let line = line.trim_end_matches('\r');
        // "SSH-protoversion-softwareversion [comments]"
        let software = line.splitn(3, '-').nth(2)?;
        Some(software.split_whitespace().next().unwrap_or(software).to_string())
    }

    async fn read_banner(&self, stream: &mut TcpStream) -> std::io::Result<String> {
        let mut buf = [0u8; 256];
        let size = stream.read(&mut buf).await?;
        Ok(String::from_utf8_lossy(&buf[..size]).into_owned())
    }
}

#[async_trait]
impl ProtocolProbe for SshProbe {
    fn protocol(&self) -> ManagementProtocol {
        ManagementProtocol::Ssh
    }

    async fn probe(&self, address: Ipv4Addr, _credential: &CredentialCandidate) -> ProbeReport {
        let target = SocketAddr::from((address, self.port));
        let start = Instant::now();

        let mut stream = match timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                log::debug!("ssh {}: {}", address, e);
                return ProbeReport::capability_only(ProtocolCapability::unreachable(
                    ManagementProtocol::Ssh,
                ));
            }
            Err(_) => {
                return ProbeReport::capability_only(ProtocolCapability::unreachable(
                    ManagementProtocol::Ssh,
                ));
            }
        };

        let remaining = self.timeout.saturating_sub(start.elapsed());
        let capability = match timeout(remaining, self.read_banner(&mut stream)).await {
            Ok(Ok(banner)) => match Self::parse_banner(&banner) {
                Some(software) => ProtocolCapability::healthy(ManagementProtocol::Ssh)
                    .with_latency(start.elapsed())
                    .with_manager_type(software),
                None => {
                    // Connected, but whatever is listening is not an SSH server
                    ProtocolCapability::unreachable(ManagementProtocol::Ssh)
                        .transport_connected()
                        .with_latency(start.elapsed())
                }
            },
            // Connect succeeded; the listener just never identified itself
            Ok(Err(_)) | Err(_) => ProtocolCapability::unreachable(ManagementProtocol::Ssh)
                .transport_connected(),
        };

        ProbeReport::capability_only(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_openssh_banner() {
        let software = SshProbe::parse_banner("SSH-2.0-OpenSSH_9.3\r\n");
        assert_eq!(software.as_deref(), Some("OpenSSH_9.3"));
    }

    #[test]
    fn test_parse_idrac_banner() {
        let software = SshProbe::parse_banner("SSH-2.0-dropbear_2019.78\r\n");
        assert_eq!(software.as_deref(), Some("dropbear_2019.78"));
    }

    #[test]
    fn test_parse_banner_with_comment() {
        let software = SshProbe::parse_banner("SSH-2.0-OpenSSH_8.0 FIPS\r\n");
        assert_eq!(software.as_deref(), Some("OpenSSH_8.0"));
    }

    #[test]
    fn test_parse_non_ssh_banner() {
        assert_eq!(SshProbe::parse_banner("HTTP/1.1 400 Bad Request\r\n"), None);
        assert_eq!(SshProbe::parse_banner(""), None);
    }

    #[tokio::test]
    async fn test_probe_reads_banner_from_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"SSH-2.0-OpenSSH_9.3\r\n").await.unwrap();
        });

        let probe = SshProbe::new(Duration::from_secs(2), port);
        let credential = CredentialCandidate::new("root", "calvin");
        let report = probe.probe(Ipv4Addr::LOCALHOST, &credential).await;

        assert!(report.capability.supported);
        assert!(report.capability.is_healthy());
        assert_eq!(report.capability.manager_type.as_deref(), Some("OpenSSH_9.3"));
        assert!(report.capability.latency.is_some());
    }

    #[tokio::test]
    async fn test_probe_completes_against_silent_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let probe = SshProbe::new(Duration::from_millis(300), port);
        let credential = CredentialCandidate::new("root", "calvin");
        let start = Instant::now();
        let report = probe.probe(Ipv4Addr::LOCALHOST, &credential).await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!report.capability.supported);
        assert!(report.capability.transport_connected);
    }

    #[tokio::test]
    async fn test_probe_against_refused_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = SshProbe::new(Duration::from_millis(500), port);
        let credential = CredentialCandidate::new("root", "calvin");
        let report = probe.probe(Ipv4Addr::LOCALHOST, &credential).await;

        assert!(!report.capability.supported);
        assert!(!report.capability.transport_connected);
    }
}
