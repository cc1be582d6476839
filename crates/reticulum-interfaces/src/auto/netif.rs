//! Network interface enumeration and eligibility filtering.
//!
//! Enumeration wraps `getifaddrs` on Unix. Selection is a pipeline of
//! independent predicates combined by logical AND; the first predicate an
//! interface fails is logged as the reason it was left out.

use std::net::Ipv6Addr;

use tracing::{debug, info};

use crate::error::InterfaceError;

/// An OS network interface as enumerated, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    /// OS interface name (e.g. "en0", "eth0").
    pub name: String,
    /// OS interface index (for `IPV6_MULTICAST_IF`, `IPV6_JOIN_GROUP`).
    pub index: u32,
    pub loopback: bool,
    /// First IPv6 link-local (fe80::/10) address, if any.
    pub link_local: Option<Ipv6Addr>,
}

/// An interface that passed selection and will be adopted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub index: u32,
    pub addr: Ipv6Addr,
}

impl LocalInterface {
    /// The address as peers hash it: compressed, without a scope suffix.
    pub fn address_string(&self) -> String {
        self.addr.to_string()
    }
}

impl TryFrom<&NetInterface> for LocalInterface {
    type Error = InterfaceError;

    fn try_from(iface: &NetInterface) -> Result<Self, Self::Error> {
        let addr = iface
            .link_local
            .ok_or_else(|| InterfaceError::AddressResolution {
                ifname: iface.name.clone(),
            })?;
        Ok(Self {
            name: iface.name.clone(),
            index: iface.index,
            addr,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Android,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            "android" => Platform::Android,
            _ => Platform::Other,
        }
    }

    /// Virtual interfaces that never carry peers on this platform.
    pub fn ignored_interfaces(self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["awdl0", "llw0", "lo0", "en5"],
            Platform::Android => &["dummy0", "lo", "tun0"],
            Platform::Linux | Platform::Other => &[],
        }
    }
}

/// Inputs every predicate sees.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub platform: Platform,
    /// Allow-list; empty means every interface.
    pub devices: &'a [String],
    pub ignored: &'a [String],
}

/// Returns `true` to keep the interface.
pub type Predicate = fn(&NetInterface, &Selection<'_>) -> bool;

fn listed(list: &[String], name: &str) -> bool {
    list.iter().any(|n| n == name)
}

pub fn not_loopback(iface: &NetInterface, _: &Selection<'_>) -> bool {
    !iface.loopback
}

/// Platform virtual interfaces are skipped unless explicitly allowed.
pub fn not_platform_ignored(iface: &NetInterface, sel: &Selection<'_>) -> bool {
    !sel.platform.ignored_interfaces().contains(&iface.name.as_str())
        || listed(sel.devices, &iface.name)
}

pub fn not_ignored(iface: &NetInterface, sel: &Selection<'_>) -> bool {
    !listed(sel.ignored, &iface.name)
}

pub fn in_allow_list(iface: &NetInterface, sel: &Selection<'_>) -> bool {
    sel.devices.is_empty() || listed(sel.devices, &iface.name)
}

pub fn has_link_local(iface: &NetInterface, _: &Selection<'_>) -> bool {
    iface.link_local.is_some()
}

/// The selection pipeline, in evaluation order.
pub const PIPELINE: [(&str, Predicate); 5] = [
    ("loopback", not_loopback),
    ("platform virtual interface", not_platform_ignored),
    ("ignored_interfaces", not_ignored),
    ("not in devices", in_allow_list),
    ("no link-local address", has_link_local),
];

/// The first predicate `iface` fails, if any.
pub fn rejection(iface: &NetInterface, sel: &Selection<'_>) -> Option<&'static str> {
    PIPELINE
        .iter()
        .find(|(_, keep)| !keep(iface, sel))
        .map(|(reason, _)| *reason)
}

/// Filter `candidates` down to the interfaces discovery runs on.
pub fn select(candidates: &[NetInterface], sel: &Selection<'_>) -> Vec<LocalInterface> {
    let mut selected = Vec::new();
    for iface in candidates {
        if let Some(reason) = rejection(iface, sel) {
            info!(ifname = %iface.name, reason, "interface excluded from discovery");
            continue;
        }
        match LocalInterface::try_from(iface) {
            Ok(local) => selected.push(local),
            Err(e) => debug!(ifname = %iface.name, error = %e, "interface excluded"),
        }
    }
    selected
}

/// Where interface lists come from.
pub trait InterfaceSource: Send + Sync {
    fn enumerate(&self) -> Result<Vec<NetInterface>, InterfaceError>;
}

/// The host's interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

#[cfg(unix)]
impl InterfaceSource for SystemInterfaces {
    fn enumerate(&self) -> Result<Vec<NetInterface>, InterfaceError> {
        use std::collections::BTreeMap;

        use nix::net::if_::InterfaceFlags;

        let addrs =
            nix::ifaddrs::getifaddrs().map_err(|e| InterfaceError::Enumeration(e.to_string()))?;

        let mut seen: BTreeMap<String, NetInterface> = BTreeMap::new();
        for ifaddr in addrs {
            let name = ifaddr.interface_name.clone();
            if !seen.contains_key(&name) {
                match nix::net::if_::if_nametoindex(name.as_str()) {
                    Ok(index) => {
                        seen.insert(
                            name.clone(),
                            NetInterface {
                                name: name.clone(),
                                index,
                                loopback: false,
                                link_local: None,
                            },
                        );
                    }
                    Err(e) => {
                        debug!(ifname = %name, error = %e, "no interface index, skipping");
                        continue;
                    }
                }
            }
            let Some(entry) = seen.get_mut(&name) else {
                continue;
            };
            if ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK) {
                entry.loopback = true;
            }
            // First link-local wins per interface.
            if entry.link_local.is_none()
                && let Some(sin6) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in6())
                && is_link_local(sin6.ip())
            {
                entry.link_local = Some(sin6.ip());
            }
        }
        Ok(seen.into_values().collect())
    }
}

#[cfg(not(unix))]
impl InterfaceSource for SystemInterfaces {
    fn enumerate(&self) -> Result<Vec<NetInterface>, InterfaceError> {
        Err(InterfaceError::Enumeration(format!(
            "interface enumeration is not available on {}",
            std::env::consts::OS
        )))
    }
}

/// Check whether an IPv6 address is link-local (fe80::/10).
pub fn is_link_local(addr: Ipv6Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 0xFE && (octets[1] & 0xC0) == 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, index: u32, link_local: Option<&str>) -> NetInterface {
        NetInterface {
            name: name.to_string(),
            index,
            loopback: false,
            link_local: link_local.map(|a| a.parse().unwrap()),
        }
    }

    fn names(selected: &[LocalInterface]) -> Vec<&str> {
        selected.iter().map(|l| l.name.as_str()).collect()
    }

    fn sel<'a>(devices: &'a [String], ignored: &'a [String]) -> Selection<'a> {
        Selection {
            platform: Platform::Linux,
            devices,
            ignored,
        }
    }

    #[test]
    fn loopback_never_selected() {
        let mut lo = iface("lo", 1, Some("fe80::1"));
        lo.loopback = true;
        let eth = iface("eth0", 2, Some("fe80::2"));
        let devices = vec!["lo".to_string(), "eth0".to_string()];
        let selected = select(&[lo.clone(), eth], &sel(&devices, &[]));
        assert_eq!(names(&selected), vec!["eth0"]);
        assert_eq!(rejection(&lo, &sel(&devices, &[])), Some("loopback"));
    }

    #[test]
    fn ignored_interfaces_never_selected() {
        let ignored = vec!["wlan0".to_string()];
        let devices = vec!["wlan0".to_string(), "eth0".to_string()];
        let candidates = [
            iface("eth0", 2, Some("fe80::2")),
            iface("wlan0", 3, Some("fe80::3")),
        ];
        assert_eq!(
            names(&select(&candidates, &sel(&devices, &ignored))),
            vec!["eth0"]
        );
        assert_eq!(names(&select(&candidates, &sel(&[], &ignored))), vec!["eth0"]);
    }

    #[test]
    fn allow_list_restricts_selection() {
        let devices = vec!["eth1".to_string()];
        let candidates = [
            iface("eth0", 2, Some("fe80::2")),
            iface("eth1", 3, Some("fe80::3")),
        ];
        assert_eq!(names(&select(&candidates, &sel(&devices, &[]))), vec!["eth1"]);
        assert_eq!(names(&select(&candidates, &sel(&[], &[]))), vec!["eth0", "eth1"]);
    }

    #[test]
    fn interface_without_link_local_is_excluded() {
        let candidates = [iface("eth0", 2, None), iface("eth1", 3, Some("fe80::3"))];
        let selected = select(&candidates, &sel(&[], &[]));
        assert_eq!(names(&selected), vec!["eth1"]);
        assert_eq!(selected[0].address_string(), "fe80::3");
        assert!(matches!(
            LocalInterface::try_from(&candidates[0]),
            Err(InterfaceError::AddressResolution { .. })
        ));
    }

    #[test]
    fn platform_virtual_interfaces_need_explicit_allow() {
        let awdl = iface("awdl0", 9, Some("fe80::9"));
        let mac = Selection {
            platform: Platform::MacOs,
            devices: &[],
            ignored: &[],
        };
        assert_eq!(rejection(&awdl, &mac), Some("platform virtual interface"));

        let devices = vec!["awdl0".to_string()];
        let allowed = Selection {
            devices: &devices,
            ..mac
        };
        assert_eq!(rejection(&awdl, &allowed), None);
        assert!(not_platform_ignored(&awdl, &sel(&[], &[])));
    }

    #[test]
    fn predicates_are_independent() {
        let eth = iface("eth0", 2, Some("fe80::2"));
        let s = sel(&[], &[]);
        for (_, keep) in PIPELINE {
            assert!(keep(&eth, &s));
        }
    }

    #[test]
    fn is_link_local_check() {
        assert!(is_link_local("fe80::1".parse().unwrap()));
        assert!(is_link_local("febf::1".parse().unwrap()));
        assert!(!is_link_local("fec0::1".parse().unwrap()));
        assert!(!is_link_local("::1".parse().unwrap()));
        assert!(!is_link_local("2001:db8::1".parse().unwrap()));
        assert!(!is_link_local("ff02::1".parse().unwrap()));
    }
}
