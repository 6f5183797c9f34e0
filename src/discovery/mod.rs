//! Discovery orchestration: per-host probing and the run coordinator

pub mod coordinator;
pub mod prober;

use crate::compliance::ComplianceSnapshot;
use crate::error::{FailureStage, SkipReason};
use crate::protocols::{PowerState, ProtocolCapability};
use crate::utils::AddressSpaceSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub use coordinator::DiscoveryCoordinator;
pub use prober::HostProber;

/// Everything discovered about one host in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostDiscoveryResult {
    pub address: Ipv4Addr,
    pub hostname: Option<String>,
    pub model: Option<String>,
    pub service_tag: Option<String>,
    pub bios_version: Option<String>,
    pub idrac_version: Option<String>,
    pub power_state: PowerState,
    /// Exactly one capability record per probed protocol
    pub protocols: Vec<ProtocolCapability>,
    pub healthiest_protocol: Option<ProtocolCapability>,
    pub compliance: Option<ComplianceSnapshot>,
    pub discovered_at: DateTime<Utc>,
}

impl HostDiscoveryResult {
    /// The lowest-priority-value healthy capability, if any
    pub fn healthiest(capabilities: &[ProtocolCapability]) -> Option<ProtocolCapability> {
        capabilities
            .iter()
            .filter(|c| c.is_healthy())
            .min_by_key(|c| c.priority)
            .cloned()
    }
}

/// Outcome of probing one address
#[derive(Debug, Clone)]
pub enum HostOutcome {
    Discovered(Box<HostDiscoveryResult>),
    Skipped { address: Ipv4Addr, reason: SkipReason },
}

impl HostOutcome {
    pub fn address(&self) -> Ipv4Addr {
        match self {
            HostOutcome::Discovered(result) => result.address,
            HostOutcome::Skipped { address, .. } => *address,
        }
    }
}

/// Run lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Expanding,
    Scanning,
    Aggregating,
    Done,
}

/// Observable progress of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryProgress {
    pub state: RunState,
    pub total: usize,
    pub dispatched: usize,
    pub completed: usize,
}

impl DiscoveryProgress {
    pub fn new(total: usize) -> Self {
        Self {
            state: RunState::Expanding,
            total,
            dispatched: 0,
            completed: 0,
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total > 0 {
            (self.completed as f64 / self.total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Structured per-host failure record for the operational-events collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub address: Ipv4Addr,
    pub stage: FailureStage,
    pub reason: String,
}

/// Ephemeral aggregate of one discovery invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRun {
    pub requested: AddressSpaceSpec,
    pub results: Vec<HostDiscoveryResult>,
    pub skipped: Vec<SkippedHost>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub cancelled: bool,
}

/// A host that terminated without a discovery result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedHost {
    pub address: Ipv4Addr,
    pub reason: SkipReason,
}

impl DiscoveryRun {
    /// Aggregate counts for operator-facing rendering
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.results.len() + self.skipped.len(),
            healthy: 0,
            degraded: 0,
            unreachable: 0,
            auth_failed: 0,
            no_credentials: 0,
        };

        for result in &self.results {
            if result.healthiest_protocol.is_some() {
                summary.healthy += 1;
            } else {
                summary.degraded += 1;
            }
        }

        for skipped in &self.skipped {
            match skipped.reason {
                SkipReason::Unreachable | SkipReason::Cancelled => summary.unreachable += 1,
                SkipReason::AuthFailed => summary.auth_failed += 1,
                SkipReason::NoCredentials => summary.no_credentials += 1,
            }
        }

        summary
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}

/// Per-run counts, stable under cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    /// Hosts with at least one healthy protocol
    pub healthy: usize,
    /// Hosts discovered but with no healthy protocol
    pub degraded: usize,
    pub unreachable: usize,
    pub auth_failed: usize,
    pub no_credentials: usize,
}
