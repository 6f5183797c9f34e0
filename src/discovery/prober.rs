//! Single-host probing
//!
//! Tries credential candidates sequentially and probes every enabled
//! protocol concurrently for each candidate. The first credential that
//! yields any supported protocol wins, and its full capability set becomes
//! the host's record, so operators see the complete management surface.

use super::{HostDiscoveryResult, HostOutcome};
use crate::compliance::ComplianceEvaluator;
use crate::credentials::{CredentialCandidate, CredentialResolver};
use crate::error::SkipReason;
use crate::protocols::{ManagerInfo, ProbeReport, ProtocolProbe, SystemInfo};
use chrono::Utc;
use futures::future::join_all;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Probes one address across all enabled protocols
pub struct HostProber {
    probes: Arc<Vec<Arc<dyn ProtocolProbe>>>,
    resolver: Arc<CredentialResolver>,
    evaluator: Arc<ComplianceEvaluator>,
}

impl HostProber {
    pub fn new(
        probes: Vec<Arc<dyn ProtocolProbe>>,
        resolver: Arc<CredentialResolver>,
        evaluator: Arc<ComplianceEvaluator>,
    ) -> Self {
        Self {
            probes: Arc::new(probes),
            resolver,
            evaluator,
        }
    }

    /// Discover one address. Never errors; all failure modes are outcomes.
    pub async fn discover(&self, address: Ipv4Addr, cancel: &CancellationToken) -> HostOutcome {
        let candidates = self.resolver.resolve(address);
        if candidates.is_empty() {
            return HostOutcome::Skipped {
                address,
                reason: SkipReason::NoCredentials,
            };
        }

        let mut any_transport = false;

        for candidate in &candidates {
            if cancel.is_cancelled() {
                return HostOutcome::Skipped {
                    address,
                    reason: SkipReason::Cancelled,
                };
            }

            let reports = self.probe_all(address, candidate).await;

            any_transport |= reports.iter().any(|r| r.capability.transport_connected);

            if reports.iter().any(|r| r.capability.supported) {
                return HostOutcome::Discovered(Box::new(self.assemble(address, reports)));
            }

            log::debug!(
                "{}: credential '{}' yielded no supported protocol",
                address,
                candidate.username
            );
        }

        let reason = if any_transport {
            SkipReason::AuthFailed
        } else {
            SkipReason::Unreachable
        };
        HostOutcome::Skipped { address, reason }
    }

    /// Run every enabled protocol probe concurrently with one credential
    async fn probe_all(&self, address: Ipv4Addr, candidate: &CredentialCandidate) -> Vec<ProbeReport> {
        let futures = self
            .probes
            .iter()
            .map(|probe| probe.probe(address, candidate));
        join_all(futures).await
    }

    /// Join probe reports into a host result: identity merged in protocol
    /// preference order, healthiest protocol derived, compliance computed.
    fn assemble(&self, address: Ipv4Addr, reports: Vec<ProbeReport>) -> HostDiscoveryResult {
        let mut by_preference: Vec<&ProbeReport> = reports.iter().collect();
        by_preference.sort_by_key(|r| r.capability.priority);

        let mut system = SystemInfo::default();
        let mut manager = ManagerInfo::default();
        for report in &by_preference {
            if let Some(info) = &report.system {
                system.merge_missing_from(info);
            }
            if let Some(info) = &report.manager {
                if manager.manager_type.is_none() {
                    manager.manager_type = info.manager_type.clone();
                }
                if manager.firmware_version.is_none() {
                    manager.firmware_version = info.firmware_version.clone();
                }
            }
        }

        let protocols: Vec<_> = reports.iter().map(|r| r.capability.clone()).collect();
        let healthiest_protocol = HostDiscoveryResult::healthiest(&protocols);

        let compliance = if system.model.is_some() || system.bios_version.is_some() {
            Some(self.evaluator.evaluate(
                system.model.as_deref(),
                system.bios_version.as_deref(),
                manager.firmware_version.as_deref(),
            ))
        } else {
            None
        };

        HostDiscoveryResult {
            address,
            hostname: system.hostname,
            model: system.model,
            service_tag: system.service_tag,
            bios_version: system.bios_version,
            idrac_version: manager.firmware_version,
            power_state: system.power_state,
            protocols,
            healthiest_protocol,
            compliance,
            discovered_at: Utc::now(),
        }
    }
}
