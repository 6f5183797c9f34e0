//! Inventory upserts
//!
//! Merges discovery results into the persistent inventory, keyed by address.
//! Protocol capability lists are union-merged: entries for protocols probed
//! this run replace their predecessors, entries for protocols not attempted
//! are retained with their last-known status. Later discoveries win by
//! `discovered_at`; merging is safe to invoke concurrently.

use crate::compliance::ComplianceSnapshot;
use crate::discovery::HostDiscoveryResult;
use crate::protocols::{PowerState, ProtocolCapability};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

/// A persistent inventory row, keyed by address.
///
/// Addresses are not stable device identities (DHCP, NIC replacement); the
/// service tag is stored so a future migration can re-key on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub address: Ipv4Addr,
    pub hostname: Option<String>,
    pub model: Option<String>,
    pub service_tag: Option<String>,
    pub bios_version: Option<String>,
    pub idrac_version: Option<String>,
    pub power_state: PowerState,
    pub protocols: Vec<ProtocolCapability>,
    pub healthiest_protocol: Option<ProtocolCapability>,
    pub compliance: Option<ComplianceSnapshot>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl InventoryRecord {
    fn from_result(result: &HostDiscoveryResult) -> Self {
        Self {
            address: result.address,
            hostname: result.hostname.clone(),
            model: result.model.clone(),
            service_tag: result.service_tag.clone(),
            bios_version: result.bios_version.clone(),
            idrac_version: result.idrac_version.clone(),
            power_state: result.power_state,
            protocols: result.protocols.clone(),
            healthiest_protocol: result.healthiest_protocol.clone(),
            compliance: result.compliance.clone(),
            first_seen: result.discovered_at,
            last_seen: result.discovered_at,
        }
    }

    /// Content equality, ignoring timestamps
    fn same_content_as(&self, result: &HostDiscoveryResult) -> bool {
        self.hostname == result.hostname
            && self.model == result.model
            && self.service_tag == result.service_tag
            && self.bios_version == result.bios_version
            && self.idrac_version == result.idrac_version
            && self.power_state == result.power_state
            && self.protocols == result.protocols
            && self.compliance == result.compliance
    }

    /// Apply a newer discovery: identity fields replaced, protocol list
    /// union-merged so un-probed protocols keep their last-known entry.
    fn apply(&mut self, result: &HostDiscoveryResult) {
        self.hostname = result.hostname.clone();
        self.model = result.model.clone();
        self.service_tag = result.service_tag.clone();
        self.bios_version = result.bios_version.clone();
        self.idrac_version = result.idrac_version.clone();
        self.power_state = result.power_state;
        self.compliance = result.compliance.clone();
        self.last_seen = result.discovered_at;

        let mut merged = result.protocols.clone();
        for stale in &self.protocols {
            if !merged.iter().any(|c| c.protocol == stale.protocol) {
                merged.push(stale.clone());
            }
        }
        self.protocols = merged;
        self.healthiest_protocol = crate::discovery::HostDiscoveryResult::healthiest(&self.protocols);
    }
}

/// Counts returned by one merge invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Upserts discovery results into the inventory
#[derive(Debug, Default)]
pub struct InventoryMerger {
    records: RwLock<HashMap<Ipv4Addr, InventoryRecord>>,
}

impl InventoryMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a batch of results. Idempotent: merging the same batch twice
    /// reports every row unchanged the second time.
    pub fn merge(&self, results: &[HostDiscoveryResult]) -> MergeSummary {
        let mut summary = MergeSummary::default();
        let mut records = self.records.write().expect("inventory lock poisoned");

        for result in results {
            match records.get_mut(&result.address) {
                None => {
                    records.insert(result.address, InventoryRecord::from_result(result));
                    summary.inserted += 1;
                }
                Some(existing) => {
                    if result.discovered_at < existing.last_seen {
                        // A concurrent merge already applied a newer discovery
                        summary.unchanged += 1;
                    } else if existing.same_content_as(result) {
                        summary.unchanged += 1;
                    } else {
                        existing.apply(result);
                        summary.updated += 1;
                    }
                }
            }
        }

        summary
    }

    pub fn get(&self, address: Ipv4Addr) -> Option<InventoryRecord> {
        self.records
            .read()
            .expect("inventory lock poisoned")
            .get(&address)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("inventory lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all records, ordered by address
    pub fn snapshot(&self) -> Vec<InventoryRecord> {
        let records = self.records.read().expect("inventory lock poisoned");
        let mut all: Vec<InventoryRecord> = records.values().cloned().collect();
        all.sort_by_key(|r| r.address);
        all
    }
}
