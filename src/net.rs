//! LAN address discovery
//!
//! Discovery runs each time an address is resolved, never once per process,
//! so a changed network (new DHCP lease, Wi-Fi switch) is picked up by the
//! next server or session that gets constructed.

use std::net::{IpAddr, Ipv4Addr};
use sysinfo::Networks;
use tracing::debug;

use crate::error::SyncError;

/// Pick the IPv4 address of the machine's LAN interface, if any.
///
/// Private-range addresses win over public ones; loopback and link-local
/// addresses are ignored. Interfaces are visited in name order so the pick
/// is stable between calls.
pub fn auto_ip() -> Option<IpAddr> {
	let networks = Networks::new_with_refreshed_list();
	let mut names: Vec<&String> = networks.list().keys().collect();
	names.sort();

	let candidates: Vec<Ipv4Addr> = names
		.into_iter()
		.flat_map(|name| networks.list()[name].ip_networks().iter())
		.filter_map(|net| match net.addr {
			IpAddr::V4(v4) => Some(v4),
			IpAddr::V6(_) => None,
		})
		.collect();

	let picked = pick_lan_address(&candidates);
	debug!("Interface discovery: {:?} from {:?}", picked, candidates);
	picked.map(IpAddr::V4)
}

fn pick_lan_address(candidates: &[Ipv4Addr]) -> Option<Ipv4Addr> {
	let usable = || candidates.iter().filter(|ip| !ip.is_loopback() && !ip.is_link_local());
	usable().find(|ip| ip.is_private()).or_else(|| usable().next()).copied()
}

/// Resolve the configured address, falling back to discovery, then to
/// `fallback`
pub fn resolve_address(configured: Option<&str>, fallback: IpAddr) -> Result<IpAddr, SyncError> {
	match configured {
		Some(text) => text.trim().parse::<IpAddr>().map_err(|e| SyncError::InvalidConfig {
			message: format!("invalid IP address {:?}: {}", text, e),
		}),
		None => Ok(auto_ip().unwrap_or(fallback)),
	}
}


// vim: ts=4
