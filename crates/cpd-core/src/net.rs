//! Local address enumeration and ranking.
//!
//! A sender has to tell the operator which address to hand to the other
//! machine. Hosts routinely carry several IPv4 addresses (Wi-Fi, wired,
//! Docker bridges, VirtualBox host adapters), so this module ranks the
//! enumerated addresses by how likely each one is to be the real LAN
//! address and puts the best guess first.
//!
//! The ranking is a heuristic over fixed prefix rules. It only decides
//! which address is *shown first*; every ranked address remains usable
//! for connecting.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::error::{Error, Result};

/// A candidate address with its heuristic rank. Lower rank = preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedAddress {
    /// The interface address
    pub address: Ipv4Addr,
    /// Heuristic preference score (lower is better)
    pub rank: u8,
}

/// Rank an address by likelihood of being the main LAN connection.
///
/// Common home/office subnets score best; known virtual-adapter subnets
/// score worst. Everything else gets a middling default.
#[must_use]
pub fn rank_address(address: Ipv4Addr) -> u8 {
    let [a, b, c, _] = address.octets();

    match (a, b, c) {
        (192, 168, 1 | 0 | 2 | 100) => 0,
        (192, 168, 56) => 10, // VirtualBox host-only adapter
        (172, 16, _) => 5,    // Docker / VM bridges
        (10, _, _) => 3,
        _ => 2,
    }
}

/// Enumerate non-loopback IPv4 interface addresses, best guess first.
///
/// Ties keep the order the OS enumerated the interfaces in (stable sort).
/// Returns an empty list when the host has no usable IPv4 address.
#[must_use]
pub fn ranked_addresses() -> Vec<RankedAddress> {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };

    let candidates = interfaces.into_iter().filter_map(|iface| {
        if iface.is_loopback() {
            return None;
        }
        match iface.ip() {
            IpAddr::V4(address) => Some(address),
            IpAddr::V6(_) => None,
        }
    });

    rank_candidates(candidates)
}

/// Rank an arbitrary candidate set. Split out from [`ranked_addresses`]
/// so the ordering policy is testable without real interfaces.
pub fn rank_candidates<I>(candidates: I) -> Vec<RankedAddress>
where
    I: IntoIterator<Item = Ipv4Addr>,
{
    let mut ranked: Vec<RankedAddress> = candidates
        .into_iter()
        .map(|address| RankedAddress {
            address,
            rank: rank_address(address),
        })
        .collect();

    ranked.sort_by_key(|candidate| candidate.rank);
    ranked
}

/// Best-effort local address via the outbound routing table.
///
/// Connecting a UDP socket to a public resolver never sends a packet but
/// makes the OS pick the source address it would route through. Used as a
/// fallback when interface enumeration comes up empty.
fn outbound_local_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:53").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(address) => Some(address),
        IpAddr::V6(_) => None,
    }
}

/// Produce the address list advertised to the operator.
///
/// # Errors
///
/// Returns [`Error::NoNetwork`] when neither interface enumeration nor the
/// outbound-routing fallback yields an address; a session cannot start
/// without something to advertise.
pub fn advertised_addresses() -> Result<Vec<RankedAddress>> {
    let ranked = ranked_addresses();
    if !ranked.is_empty() {
        return Ok(ranked);
    }

    tracing::debug!("no interface addresses found, falling back to outbound route");

    outbound_local_ip()
        .map(|address| {
            vec![RankedAddress {
                address,
                rank: rank_address(address),
            }]
        })
        .ok_or(Error::NoNetwork)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_rank_home_subnets_preferred() {
        assert_eq!(rank_address(ip("192.168.1.10")), 0);
        assert_eq!(rank_address(ip("192.168.0.42")), 0);
        assert_eq!(rank_address(ip("192.168.2.7")), 0);
        assert_eq!(rank_address(ip("192.168.100.3")), 0);
    }

    #[test]
    fn test_rank_virtual_adapters_deprioritized() {
        assert_eq!(rank_address(ip("192.168.56.1")), 10);
        assert_eq!(rank_address(ip("172.16.0.9")), 5);
        assert_eq!(rank_address(ip("10.0.0.5")), 3);
    }

    #[test]
    fn test_rank_default() {
        assert_eq!(rank_address(ip("192.168.33.5")), 2);
        assert_eq!(rank_address(ip("172.17.0.2")), 2);
        assert_eq!(rank_address(ip("100.103.164.32")), 2);
    }

    #[test]
    fn test_home_address_beats_virtualbox() {
        let ranked = rank_candidates([ip("192.168.56.1"), ip("192.168.1.15")]);
        assert_eq!(ranked[0].address, ip("192.168.1.15"));
        assert_eq!(ranked[1].address, ip("192.168.56.1"));
    }

    #[test]
    fn test_ordering_consistent_with_rank_table() {
        let ranked = rank_candidates([
            ip("10.1.2.3"),
            ip("192.168.56.2"),
            ip("203.0.113.9"),
            ip("192.168.0.8"),
            ip("172.16.4.4"),
        ]);
        let ranks: Vec<u8> = ranked.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![0, 2, 3, 5, 10]);
    }

    #[test]
    fn test_ties_preserve_enumeration_order() {
        let ranked = rank_candidates([ip("192.168.1.10"), ip("192.168.0.20"), ip("10.0.0.1")]);
        assert_eq!(ranked[0].address, ip("192.168.1.10"));
        assert_eq!(ranked[1].address, ip("192.168.0.20"));
    }

    #[test]
    fn test_empty_candidate_set() {
        assert!(rank_candidates([]).is_empty());
    }
}
