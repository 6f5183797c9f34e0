//! Credential profiles, scope assignments, and scan-time resolution
//!
//! Profiles and assignments are owned by an external admin collaborator; this
//! module is a read-only consumer. Resolution is deterministic: the same
//! address and assignment set always yields the same candidate ordering.

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use uuid::Uuid;

/// Transport scheme used to reach a management endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, reusable set of management-interface credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub secret: String,
    pub port: u16,
    pub scheme: Scheme,
    /// Lower values are tried first among equally specific matches
    pub priority_order: u32,
    /// Default profiles sort after non-default profiles
    pub is_default: bool,
}

impl CredentialProfile {
    pub fn new(name: impl Into<String>, username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            username: username.into(),
            secret: secret.into(),
            port: 443,
            scheme: Scheme::Https,
            priority_order: 100,
            is_default: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_priority(mut self, priority_order: u32) -> Self {
        self.priority_order = priority_order;
        self
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }
}

/// A subnet (optionally with VLAN) registered as belonging to a datacenter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpScope {
    pub subnet: Ipv4Network,
    pub vlan: Option<u16>,
    pub description: Option<String>,
}

impl IpScope {
    pub fn new(subnet: Ipv4Network) -> Self {
        Self {
            subnet,
            vlan: None,
            description: None,
        }
    }

    pub fn with_vlan(mut self, vlan: u16) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        self.subnet.contains(address)
    }
}

/// Binds a credential profile to an IP scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialAssignment {
    pub profile_id: Uuid,
    pub scope: IpScope,
}

impl CredentialAssignment {
    pub fn new(profile_id: Uuid, scope: IpScope) -> Self {
        Self { profile_id, scope }
    }
}

/// A concrete credential to try against one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialCandidate {
    pub username: String,
    pub secret: String,
    pub port: u16,
    pub scheme: Scheme,
}

impl CredentialCandidate {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            port: 443,
            scheme: Scheme::Https,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }
}

impl From<&CredentialProfile> for CredentialCandidate {
    fn from(profile: &CredentialProfile) -> Self {
        Self {
            username: profile.username.clone(),
            secret: profile.secret.clone(),
            port: profile.port,
            scheme: profile.scheme,
        }
    }
}

/// Profile and assignment data loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(default)]
    pub profiles: Vec<CredentialProfile>,
    #[serde(default)]
    pub assignments: Vec<CredentialAssignment>,
}

impl ProfileSet {
    /// Load a profile set from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| crate::DiscoveryError::ConfigError(format!("Failed to parse profile set: {}", e)))
    }
}

/// Resolves the ordered credential candidates for a target address
///
/// Matching assignments sort by most specific subnet first (longer prefix
/// wins), then profile priority order ascending, then default profiles last,
/// then profile id for a stable total order. A manual fallback credential, if
/// configured for the run, is appended as the lowest-priority candidate.
pub struct CredentialResolver {
    profiles: HashMap<Uuid, CredentialProfile>,
    assignments: Vec<CredentialAssignment>,
    fallback: Option<CredentialCandidate>,
}

impl CredentialResolver {
    pub fn new(profiles: Vec<CredentialProfile>, assignments: Vec<CredentialAssignment>) -> Self {
        let profiles = profiles.into_iter().map(|p| (p.id, p)).collect();
        Self {
            profiles,
            assignments,
            fallback: None,
        }
    }

    pub fn from_profile_set(set: ProfileSet) -> Self {
        Self::new(set.profiles, set.assignments)
    }

    pub fn with_fallback(mut self, fallback: CredentialCandidate) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// True when no assignment and no fallback could ever produce a candidate.
    /// A run started against such a resolver is a configuration error.
    pub fn is_empty(&self) -> bool {
        self.fallback.is_none()
            && !self
                .assignments
                .iter()
                .any(|a| self.profiles.contains_key(&a.profile_id))
    }

    /// Resolve the ordered credential candidates for `address`
    pub fn resolve(&self, address: Ipv4Addr) -> Vec<CredentialCandidate> {
        let mut matches: Vec<(&CredentialAssignment, &CredentialProfile)> = self
            .assignments
            .iter()
            .filter(|a| a.scope.contains(address))
            .filter_map(|a| self.profiles.get(&a.profile_id).map(|p| (a, p)))
            .collect();

        matches.sort_by_key(|(a, p)| {
            (
                Reverse(a.scope.subnet.prefix()),
                p.priority_order,
                p.is_default,
                p.id,
            )
        });

        let mut candidates: Vec<CredentialCandidate> = Vec::with_capacity(matches.len() + 1);
        for (_, profile) in matches {
            let candidate = CredentialCandidate::from(profile);
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }

        if let Some(fallback) = &self.fallback {
            if !candidates.contains(fallback) {
                candidates.push(fallback.clone());
            }
        }

        candidates
    }
}
