//! Firmware compliance evaluation
//!
//! Pure comparison of discovered BIOS/iDRAC versions against a baseline
//! table. Version comparison is ordinal (segment-wise numeric), never
//! lexicographic: "2.83.82.82" is newer than "2.9.10.10".

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

/// A firmware version split into comparable segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareVersion {
    segments: Vec<u64>,
    /// Non-numeric suffix, compared lexically as a final tiebreak
    suffix: String,
}

impl FirmwareVersion {
    /// Parse a dotted version string. Non-numeric trailing characters of a
    /// segment become the suffix ("1.8.2A" -> [1, 8, 2] + "A").
    pub fn parse(version: &str) -> Self {
        let mut segments = Vec::new();
        let mut suffix = String::new();

        for part in version.trim().split('.') {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            let rest = &part[digits.len()..];
            match digits.parse::<u64>() {
                Ok(n) => segments.push(n),
                Err(_) => {
                    suffix = part.to_string();
                    break;
                }
            }
            if !rest.is_empty() {
                suffix = rest.to_string();
                break;
            }
        }

        Self { segments, suffix }
    }
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        self.suffix.cmp(&other.suffix)
    }
}

/// Expected firmware levels for one server line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareBaseline {
    /// Model prefix this baseline applies to, e.g. "PowerEdge R7"
    pub model_prefix: String,
    pub bios_version: String,
    pub idrac_version: String,
    /// Whether bringing BIOS up to baseline needs a host reboot
    pub bios_reboot_required: bool,
    /// False once the line is out of support
    pub supported: bool,
}

/// Baseline table, externally supplied or built in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineTable {
    #[serde(default)]
    pub baselines: Vec<FirmwareBaseline>,
}

impl BaselineTable {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| crate::DiscoveryError::ConfigError(format!("Failed to parse baselines: {}", e)))
    }

    /// Longest matching model prefix wins
    pub fn lookup(&self, model: &str) -> Option<&FirmwareBaseline> {
        self.baselines
            .iter()
            .filter(|b| model.starts_with(&b.model_prefix))
            .max_by_key(|b| b.model_prefix.len())
    }
}

/// Current-generation PowerEdge baselines, used when no table is supplied
static BUILTIN_BASELINES: Lazy<BaselineTable> = Lazy::new(|| BaselineTable {
    baselines: vec![
        FirmwareBaseline {
            model_prefix: "PowerEdge R6".to_string(),
            bios_version: "2.12.4".to_string(),
            idrac_version: "6.10.30.00".to_string(),
            bios_reboot_required: true,
            supported: true,
        },
        FirmwareBaseline {
            model_prefix: "PowerEdge R7".to_string(),
            bios_version: "2.12.4".to_string(),
            idrac_version: "6.10.30.00".to_string(),
            bios_reboot_required: true,
            supported: true,
        },
        FirmwareBaseline {
            model_prefix: "PowerEdge R8".to_string(),
            bios_version: "1.8.2".to_string(),
            idrac_version: "6.10.30.00".to_string(),
            bios_reboot_required: true,
            supported: true,
        },
        FirmwareBaseline {
            model_prefix: "PowerEdge R230".to_string(),
            bios_version: "2.9.0".to_string(),
            idrac_version: "2.85.85.85".to_string(),
            bios_reboot_required: true,
            supported: false,
        },
    ],
});

/// Update readiness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    MaintenanceRequired,
    NotSupported,
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Ready => write!(f, "ready"),
            Readiness::MaintenanceRequired => write!(f, "maintenance_required"),
            Readiness::NotSupported => write!(f, "not_supported"),
        }
    }
}

/// Compliance classification for one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    pub bios_outdated: bool,
    pub idrac_outdated: bool,
    pub available_update_count: u32,
    pub readiness: Readiness,
}

/// Evaluates discovered firmware versions against a baseline table
pub struct ComplianceEvaluator {
    table: BaselineTable,
}

impl ComplianceEvaluator {
    pub fn new(table: BaselineTable) -> Self {
        Self { table }
    }

    /// Evaluator backed by the built-in PowerEdge table
    pub fn builtin() -> Self {
        Self::new(BUILTIN_BASELINES.clone())
    }

    /// Compare discovered versions against the baseline for `model`
    pub fn evaluate(
        &self,
        model: Option<&str>,
        bios_version: Option<&str>,
        idrac_version: Option<&str>,
    ) -> ComplianceSnapshot {
        let baseline = model.and_then(|m| self.table.lookup(m));

        let baseline = match baseline {
            Some(b) if b.supported => b,
            _ => {
                return ComplianceSnapshot {
                    bios_outdated: false,
                    idrac_outdated: false,
                    available_update_count: 0,
                    readiness: Readiness::NotSupported,
                }
            }
        };

        let bios_outdated = bios_version
            .map(|v| FirmwareVersion::parse(v) < FirmwareVersion::parse(&baseline.bios_version))
            .unwrap_or(false);
        let idrac_outdated = idrac_version
            .map(|v| FirmwareVersion::parse(v) < FirmwareVersion::parse(&baseline.idrac_version))
            .unwrap_or(false);

        let available_update_count = bios_outdated as u32 + idrac_outdated as u32;

        // iDRAC updates apply online; only reboot-class drift forces a window
        let readiness = if bios_outdated && baseline.bios_reboot_required {
            Readiness::MaintenanceRequired
        } else {
            Readiness::Ready
        };

        ComplianceSnapshot {
            bios_outdated,
            idrac_outdated,
            available_update_count,
            readiness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison_is_ordinal_not_lexicographic() {
        // Lexicographically "2.83..." < "2.9..." — ordinally it is newer
        assert!(FirmwareVersion::parse("2.83.82.82") > FirmwareVersion::parse("2.9.10.10"));
        assert!(FirmwareVersion::parse("6.10.30.00") > FirmwareVersion::parse("6.9.30.00"));
        assert!(FirmwareVersion::parse("1.8.2") < FirmwareVersion::parse("1.10.0"));
    }

    #[test]
    fn test_version_equal_with_shorter_form() {
        assert_eq!(
            FirmwareVersion::parse("2.10").cmp(&FirmwareVersion::parse("2.10.0.0")),
            Ordering::Equal
        );
    }

    #[test]
    fn test_version_suffix_tiebreak() {
        assert!(FirmwareVersion::parse("1.8.2A") > FirmwareVersion::parse("1.8.2"));
        assert!(FirmwareVersion::parse("1.8.2A") < FirmwareVersion::parse("1.8.2B"));
    }

    fn table() -> BaselineTable {
        BaselineTable {
            baselines: vec![
                FirmwareBaseline {
                    model_prefix: "PowerEdge R7".to_string(),
                    bios_version: "2.12.4".to_string(),
                    idrac_version: "6.10.30.00".to_string(),
                    bios_reboot_required: true,
                    supported: true,
                },
                FirmwareBaseline {
                    model_prefix: "PowerEdge R740xd".to_string(),
                    bios_version: "2.19.1".to_string(),
                    idrac_version: "6.10.30.00".to_string(),
                    bios_reboot_required: true,
                    supported: true,
                },
            ],
        }
    }

    #[test]
    fn test_longest_model_prefix_wins() {
        let table = table();
        let baseline = table.lookup("PowerEdge R740xd").unwrap();
        assert_eq!(baseline.bios_version, "2.19.1");
    }

    #[test]
    fn test_current_host_is_ready() {
        let evaluator = ComplianceEvaluator::new(table());
        let snapshot = evaluator.evaluate(Some("PowerEdge R750"), Some("2.12.4"), Some("6.10.30.00"));
        assert!(!snapshot.bios_outdated);
        assert!(!snapshot.idrac_outdated);
        assert_eq!(snapshot.available_update_count, 0);
        assert_eq!(snapshot.readiness, Readiness::Ready);
    }

    #[test]
    fn test_outdated_bios_requires_maintenance() {
        let evaluator = ComplianceEvaluator::new(table());
        let snapshot = evaluator.evaluate(Some("PowerEdge R750"), Some("2.9.4"), Some("6.10.30.00"));
        assert!(snapshot.bios_outdated);
        assert_eq!(snapshot.available_update_count, 1);
        assert_eq!(snapshot.readiness, Readiness::MaintenanceRequired);
    }

    #[test]
    fn test_outdated_idrac_alone_stays_ready() {
        let evaluator = ComplianceEvaluator::new(table());
        let snapshot = evaluator.evaluate(Some("PowerEdge R750"), Some("2.12.4"), Some("5.00.10.20"));
        assert!(snapshot.idrac_outdated);
        assert_eq!(snapshot.available_update_count, 1);
        assert_eq!(snapshot.readiness, Readiness::Ready);
    }

    #[test]
    fn test_unknown_model_is_not_supported() {
        let evaluator = ComplianceEvaluator::new(table());
        let snapshot = evaluator.evaluate(Some("ProLiant DL380"), Some("2.12.4"), None);
        assert_eq!(snapshot.readiness, Readiness::NotSupported);
        assert_eq!(snapshot.available_update_count, 0);
    }

    #[test]
    fn test_missing_model_is_not_supported() {
        let evaluator = ComplianceEvaluator::new(table());
        let snapshot = evaluator.evaluate(None, Some("2.12.4"), Some("6.10.30.00"));
        assert_eq!(snapshot.readiness, Readiness::NotSupported);
    }

    #[test]
    fn test_builtin_table_covers_poweredge() {
        let evaluator = ComplianceEvaluator::builtin();
        let snapshot = evaluator.evaluate(Some("PowerEdge R750"), Some("1.0.0"), Some("1.0.0"));
        assert_eq!(snapshot.readiness, Readiness::MaintenanceRequired);
        assert_eq!(snapshot.available_update_count, 2);
    }

    #[test]
    fn test_out_of_support_line() {
        let evaluator = ComplianceEvaluator::builtin();
        let snapshot = evaluator.evaluate(Some("PowerEdge R230"), Some("1.0.0"), Some("1.0.0"));
        assert_eq!(snapshot.readiness, Readiness::NotSupported);
    }
}
