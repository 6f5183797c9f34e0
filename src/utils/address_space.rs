//! Address space expansion
//!
//! Turns a range expression or a set of datacenter IP scopes into a finite,
//! order-preserving, de-duplicated sequence of addresses. The sequence is
//! lazy and restartable: it stores interval segments, not materialized
//! addresses, so a /16-class space costs a handful of tuples.

use crate::credentials::IpScope;
use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Address space to discover: an explicit range or registered scopes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressSpaceSpec {
    /// Inclusive IPv4 range within a single /24
    Range { start: Ipv4Addr, end: Ipv4Addr },
    /// Datacenter-registered subnets
    Scopes(Vec<IpScope>),
}

impl AddressSpaceSpec {
    /// Parse a range expression of the form `a.b.c.start-end`.
    ///
    /// The right-hand side may be a bare last octet (`10.0.0.1-30`) or a
    /// full address within the same /24 (`10.0.0.1-10.0.0.30`).
    pub fn parse_range(expr: &str) -> crate::Result<Self> {
        let (lhs, rhs) = expr
            .split_once('-')
            .ok_or_else(|| DiscoveryError::InvalidAddressSpace(format!("Not a range expression: {}", expr)))?;

        let start: Ipv4Addr = lhs
            .trim()
            .parse()
            .map_err(|_| DiscoveryError::InvalidAddressSpace(format!("Invalid start address: {}", lhs)))?;

        let rhs = rhs.trim();
        let end: Ipv4Addr = if rhs.contains('.') {
            rhs.parse()
                .map_err(|_| DiscoveryError::InvalidAddressSpace(format!("Invalid end address: {}", rhs)))?
        } else {
            let last: u8 = rhs
                .parse()
                .map_err(|_| DiscoveryError::InvalidAddressSpace(format!("Invalid end octet: {}", rhs)))?;
            let o = start.octets();
            Ipv4Addr::new(o[0], o[1], o[2], last)
        };

        Ok(AddressSpaceSpec::Range { start, end })
    }
}

impl std::fmt::Display for AddressSpaceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressSpaceSpec::Range { start, end } => write!(f, "{}-{}", start, end),
            AddressSpaceSpec::Scopes(scopes) => {
                let subnets: Vec<String> = scopes.iter().map(|s| s.subnet.to_string()).collect();
                write!(f, "{}", subnets.join(","))
            }
        }
    }
}

/// Expands address space specs into address sequences
pub struct AddressSpaceExpander;

impl AddressSpaceExpander {
    /// Expand a spec into a deterministic, de-duplicated address sequence
    pub fn expand(spec: &AddressSpaceSpec) -> crate::Result<AddressSequence> {
        match spec {
            AddressSpaceSpec::Range { start, end } => {
                let s = start.octets();
                let e = end.octets();
                if s[..3] != e[..3] {
                    return Err(DiscoveryError::InvalidAddressSpace(format!(
                        "Range {}-{} crosses a /24 boundary",
                        start, end
                    )));
                }
                if s[3] > e[3] {
                    return Err(DiscoveryError::InvalidAddressSpace(format!(
                        "Range start {} is after end {}",
                        start, end
                    )));
                }
                Ok(AddressSequence {
                    segments: vec![(u32::from(*start), u32::from(*end))],
                })
            }
            AddressSpaceSpec::Scopes(scopes) => {
                if scopes.is_empty() {
                    return Err(DiscoveryError::InvalidAddressSpace(
                        "No scopes supplied".to_string(),
                    ));
                }

                let mut sequence = AddressSequence { segments: Vec::new() };
                for scope in scopes {
                    let prefix = scope.subnet.prefix();
                    if !(16..=30).contains(&prefix) {
                        return Err(DiscoveryError::InvalidAddressSpace(format!(
                            "Unsupported scope prefix /{} for {}",
                            prefix, scope.subnet
                        )));
                    }
                    // Usable hosts only: network and broadcast addresses excluded,
                    // so a /24 yields exactly .1-.254.
                    let network = u32::from(scope.subnet.network());
                    let broadcast = u32::from(scope.subnet.broadcast());
                    sequence.push_segment(network + 1, broadcast - 1);
                }
                Ok(sequence)
            }
        }
    }
}

/// A finite, restartable sequence of addresses stored as inclusive segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSequence {
    segments: Vec<(u32, u32)>,
}

impl AddressSequence {
    /// Append a segment, subtracting any addresses already covered so each
    /// address appears at most once, in first-seen order.
    fn push_segment(&mut self, start: u32, end: u32) {
        let mut covered: Vec<(u32, u32)> = self.segments.clone();
        covered.sort_unstable();

        let mut cursor = start;
        let mut fresh: Vec<(u32, u32)> = Vec::new();
        for &(cs, ce) in &covered {
            if ce < cursor {
                continue;
            }
            if cs > end {
                break;
            }
            if cs > cursor {
                fresh.push((cursor, cs - 1));
            }
            cursor = cursor.max(ce.saturating_add(1));
            if cursor > end {
                break;
            }
        }
        if cursor <= end {
            fresh.push((cursor, end));
        }

        self.segments.extend(fresh);
    }

    /// Total number of addresses in the sequence
    pub fn len(&self) -> usize {
        self.segments
            .iter()
            .map(|(s, e)| (e - s + 1) as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate the sequence from the start; calling again restarts it
    pub fn iter(&self) -> AddressIter<'_> {
        AddressIter {
            segments: &self.segments,
            segment_idx: 0,
            next: self.segments.first().map(|(s, _)| *s),
        }
    }
}

impl<'a> IntoIterator for &'a AddressSequence {
    type Item = Ipv4Addr;
    type IntoIter = AddressIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over an [`AddressSequence`]
pub struct AddressIter<'a> {
    segments: &'a [(u32, u32)],
    segment_idx: usize,
    next: Option<u32>,
}

impl Iterator for AddressIter<'_> {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let (_, end) = self.segments[self.segment_idx];

        self.next = if current < end {
            Some(current + 1)
        } else {
            self.segment_idx += 1;
            self.segments.get(self.segment_idx).map(|(s, _)| *s)
        };

        Some(Ipv4Addr::from(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(s: &str) -> IpScope {
        IpScope::new(s.parse().unwrap())
    }

    #[test]
    fn test_range_expansion_count_and_order() {
        let spec = AddressSpaceSpec::parse_range("10.0.0.5-10.0.0.9").unwrap();
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        let addrs: Vec<Ipv4Addr> = seq.iter().collect();
        assert_eq!(seq.len(), 5);
        assert_eq!(addrs.first().unwrap(), &Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(addrs.last().unwrap(), &Ipv4Addr::new(10, 0, 0, 9));
        assert!(addrs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_range_short_form() {
        let spec = AddressSpaceSpec::parse_range("192.168.10.1-30").unwrap();
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        assert_eq!(seq.len(), 30);
    }

    #[test]
    fn test_single_address_range() {
        let spec = AddressSpaceSpec::parse_range("10.0.0.7-7").unwrap();
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        assert_eq!(seq.iter().collect::<Vec<_>>(), vec![Ipv4Addr::new(10, 0, 0, 7)]);
    }

    #[test]
    fn test_reversed_range_rejected() {
        let spec = AddressSpaceSpec::parse_range("10.0.0.9-10.0.0.5").unwrap();
        assert!(AddressSpaceExpander::expand(&spec).is_err());
    }

    #[test]
    fn test_cross_subnet_range_rejected() {
        let spec = AddressSpaceSpec::parse_range("10.0.0.200-10.0.1.10").unwrap();
        assert!(AddressSpaceExpander::expand(&spec).is_err());
    }

    #[test]
    fn test_slash_24_yields_254_usable_hosts() {
        let spec = AddressSpaceSpec::Scopes(vec![scope("10.20.30.0/24")]);
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        assert_eq!(seq.len(), 254);
        let addrs: Vec<Ipv4Addr> = seq.iter().collect();
        assert_eq!(addrs[0], Ipv4Addr::new(10, 20, 30, 1));
        assert_eq!(addrs[253], Ipv4Addr::new(10, 20, 30, 254));
    }

    #[test]
    fn test_overlapping_scopes_deduplicate() {
        let spec = AddressSpaceSpec::Scopes(vec![scope("10.0.0.0/25"), scope("10.0.0.0/24")]);
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        assert_eq!(seq.len(), 254);

        let addrs: Vec<Ipv4Addr> = seq.iter().collect();
        let mut unique = addrs.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), addrs.len());

        // First-seen order: the /25 contributes .1-.126 first, then the
        // remainder of the /24.
        assert_eq!(addrs[0], Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(addrs[126], Ipv4Addr::new(10, 0, 0, 127));
    }

    #[test]
    fn test_identical_scopes_probe_once() {
        let spec = AddressSpaceSpec::Scopes(vec![scope("10.9.0.0/24"), scope("10.9.0.0/24")]);
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        assert_eq!(seq.len(), 254);
    }

    #[test]
    fn test_host_prefix_rejected() {
        let spec = AddressSpaceSpec::Scopes(vec![scope("10.0.0.1/32")]);
        assert!(AddressSpaceExpander::expand(&spec).is_err());
    }

    #[test]
    fn test_iteration_is_restartable() {
        let spec = AddressSpaceSpec::Scopes(vec![scope("10.1.2.0/28")]);
        let seq = AddressSpaceExpander::expand(&spec).unwrap();
        let first: Vec<Ipv4Addr> = seq.iter().collect();
        let second: Vec<Ipv4Addr> = seq.iter().collect();
        assert_eq!(first, second);
    }
}
