//! The EPICS environment-variable surface.
//!
//! Parses the standard `EPICS_CA_*` / `EPICS_CAS_*` variables into
//! structured values with protocol defaults. The core does not resolve
//! host names and does not enumerate interfaces; the host passes interface
//! broadcast addresses in when expanding the auto lists.

use std::net::{IpAddr, SocketAddr};

use calcium_wire::{CA_REPEATER_PORT, CA_SERVER_PORT, DEFAULT_MAX_BEACON_PERIOD};

/// Default client-side cap on array transfers, in bytes.
pub const DEFAULT_MAX_ARRAY_BYTES: usize = 16384;

/// Structured view of the EPICS environment.
#[derive(Debug, Clone, PartialEq)]
pub struct EpicsEnv {
    /// `EPICS_CA_SERVER_PORT` (default 5064).
    pub server_port: u16,
    /// `EPICS_CA_REPEATER_PORT` (default 5065).
    pub repeater_port: u16,
    /// `EPICS_CA_ADDR_LIST`: explicit client broadcast targets.
    pub addr_list: Vec<SocketAddr>,
    /// `EPICS_CA_AUTO_ADDR_LIST` (default YES).
    pub auto_addr_list: bool,
    /// `EPICS_CA_MAX_ARRAY_BYTES` (default 16384).
    pub max_array_bytes: usize,
    /// `EPICS_CAS_INTF_ADDR_LIST`: server listen interfaces.
    pub intf_addr_list: Vec<SocketAddr>,
    /// `EPICS_CAS_BEACON_ADDR_LIST`: explicit beacon fanout targets.
    pub beacon_addr_list: Vec<SocketAddr>,
    /// `EPICS_CAS_AUTO_BEACON_ADDR_LIST` (default YES).
    pub auto_beacon_addr_list: bool,
    /// `EPICS_CAS_BEACON_PERIOD`: maximum beacon period in seconds
    /// (default 15.0).
    pub beacon_period: f64,
    /// `EPICS_CAS_IGNORE_ADDR_LIST`: sources to silently drop.
    pub ignore_addr_list: Vec<IpAddr>,
}

fn is_no(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("no")
}

fn parse_port(raw: Option<String>, default: u16) -> u16 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Parse one whitespace-separated address list. Entries are `ip[:port]`;
/// host names are not resolved here and are skipped with a warning.
pub fn parse_address_list(raw: &str, default_port: u16) -> Vec<SocketAddr> {
    let mut out = Vec::new();
    for entry in raw.split_whitespace() {
        if let Ok(addr) = entry.parse::<SocketAddr>() {
            out.push(addr);
        } else if let Ok(ip) = entry.parse::<IpAddr>() {
            out.push(SocketAddr::new(ip, default_port));
        } else {
            tracing::warn!(%entry, "skipping unparsable address list entry");
        }
    }
    out
}

fn parse_ip_list(raw: &str) -> Vec<IpAddr> {
    let mut out = Vec::new();
    for entry in raw.split_whitespace() {
        if let Ok(ip) = entry.parse::<IpAddr>() {
            out.push(ip);
        } else if let Ok(addr) = entry.parse::<SocketAddr>() {
            out.push(addr.ip());
        } else {
            tracing::warn!(%entry, "skipping unparsable address list entry");
        }
    }
    out
}

impl Default for EpicsEnv {
    fn default() -> Self {
        EpicsEnv {
            server_port: CA_SERVER_PORT,
            repeater_port: CA_REPEATER_PORT,
            addr_list: Vec::new(),
            auto_addr_list: true,
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
            intf_addr_list: Vec::new(),
            beacon_addr_list: Vec::new(),
            auto_beacon_addr_list: true,
            beacon_period: DEFAULT_MAX_BEACON_PERIOD,
            ignore_addr_list: Vec::new(),
        }
    }
}

impl EpicsEnv {
    /// Read the process environment.
    pub fn from_env() -> EpicsEnv {
        EpicsEnv::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read from any name-to-value lookup (testable without touching the
    /// process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EpicsEnv {
        let server_port = parse_port(lookup("EPICS_CA_SERVER_PORT"), CA_SERVER_PORT);
        let repeater_port = parse_port(lookup("EPICS_CA_REPEATER_PORT"), CA_REPEATER_PORT);

        let addr_raw = lookup("EPICS_CA_ADDR_LIST");
        let auto_raw = lookup("EPICS_CA_AUTO_ADDR_LIST");
        let beacon_raw = lookup("EPICS_CAS_BEACON_ADDR_LIST");
        let auto_beacon_raw = lookup("EPICS_CAS_AUTO_BEACON_ADDR_LIST");

        // An explicit list with the auto default left on usually means the
        // caller expected the explicit list to be exclusive.
        if addr_raw.as_deref().is_some_and(|s| !s.trim().is_empty())
            && !auto_raw.as_deref().is_some_and(is_no)
        {
            tracing::warn!(
                "EPICS_CA_ADDR_LIST is set but EPICS_CA_AUTO_ADDR_LIST is not NO; \
                 interface broadcasts will be appended to the explicit list"
            );
        }
        if beacon_raw.as_deref().is_some_and(|s| !s.trim().is_empty())
            && !auto_beacon_raw.as_deref().is_some_and(is_no)
        {
            tracing::warn!(
                "EPICS_CAS_BEACON_ADDR_LIST is set but EPICS_CAS_AUTO_BEACON_ADDR_LIST \
                 is not NO; interface broadcasts will be appended to the explicit list"
            );
        }

        EpicsEnv {
            server_port,
            repeater_port,
            addr_list: addr_raw
                .map(|s| parse_address_list(&s, server_port))
                .unwrap_or_default(),
            auto_addr_list: !auto_raw.as_deref().is_some_and(is_no),
            max_array_bytes: lookup("EPICS_CA_MAX_ARRAY_BYTES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_ARRAY_BYTES),
            intf_addr_list: lookup("EPICS_CAS_INTF_ADDR_LIST")
                .map(|s| parse_address_list(&s, server_port))
                .unwrap_or_default(),
            beacon_addr_list: beacon_raw
                .map(|s| parse_address_list(&s, repeater_port))
                .unwrap_or_default(),
            auto_beacon_addr_list: !auto_beacon_raw.as_deref().is_some_and(is_no),
            beacon_period: lookup("EPICS_CAS_BEACON_PERIOD")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_BEACON_PERIOD),
            ignore_addr_list: lookup("EPICS_CAS_IGNORE_ADDR_LIST")
                .map(|s| parse_ip_list(&s))
                .unwrap_or_default(),
        }
    }

    /// The client's search fanout: the explicit list, extended by the
    /// host-supplied interface broadcast addresses when the auto flag is
    /// on.
    pub fn client_address_list(&self, interface_broadcasts: &[IpAddr]) -> Vec<SocketAddr> {
        let mut out = self.addr_list.clone();
        if self.auto_addr_list {
            for &ip in interface_broadcasts {
                let addr = SocketAddr::new(ip, self.server_port);
                if !out.contains(&addr) {
                    out.push(addr);
                }
            }
        }
        out
    }

    /// The server's beacon fanout, same expansion rule with the repeater
    /// port.
    pub fn beacon_address_list(&self, interface_broadcasts: &[IpAddr]) -> Vec<SocketAddr> {
        let mut out = self.beacon_addr_list.clone();
        if self.auto_beacon_addr_list {
            for &ip in interface_broadcasts {
                let addr = SocketAddr::new(ip, self.repeater_port);
                if !out.contains(&addr) {
                    out.push(addr);
                }
            }
        }
        out
    }

    /// True when datagrams from this source should be silently dropped.
    pub fn should_ignore(&self, source: SocketAddr) -> bool {
        self.ignore_addr_list.contains(&source.ip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> EpicsEnv {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EpicsEnv::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let env = env_of(&[]);
        assert_eq!(env, EpicsEnv::default());
    }

    #[test]
    fn address_lists_parse_with_default_ports() {
        let env = env_of(&[
            ("EPICS_CA_ADDR_LIST", "10.0.0.255 10.1.0.255:5070"),
            ("EPICS_CA_AUTO_ADDR_LIST", "NO"),
        ]);
        assert_eq!(
            env.addr_list,
            vec![
                "10.0.0.255:5064".parse().unwrap(),
                "10.1.0.255:5070".parse().unwrap()
            ]
        );
        assert!(!env.auto_addr_list);
    }

    #[test]
    fn custom_ports_apply_to_lists() {
        let env = env_of(&[
            ("EPICS_CA_SERVER_PORT", "6064"),
            ("EPICS_CA_ADDR_LIST", "10.0.0.255"),
            ("EPICS_CA_AUTO_ADDR_LIST", "no"),
        ]);
        assert_eq!(env.server_port, 6064);
        assert_eq!(env.addr_list, vec!["10.0.0.255:6064".parse().unwrap()]);
    }

    #[test]
    fn auto_expansion_appends_broadcasts() {
        let env = env_of(&[("EPICS_CA_ADDR_LIST", "10.0.0.255")]);
        let broadcasts = vec!["192.168.1.255".parse().unwrap()];
        let list = env.client_address_list(&broadcasts);
        assert_eq!(
            list,
            vec![
                "10.0.0.255:5064".parse().unwrap(),
                "192.168.1.255:5064".parse().unwrap()
            ]
        );

        let exclusive = env_of(&[
            ("EPICS_CA_ADDR_LIST", "10.0.0.255"),
            ("EPICS_CA_AUTO_ADDR_LIST", "NO"),
        ]);
        assert_eq!(
            exclusive.client_address_list(&broadcasts),
            vec!["10.0.0.255:5064".parse().unwrap()]
        );
    }

    #[test]
    fn ignore_list_matches_by_ip() {
        let env = env_of(&[("EPICS_CAS_IGNORE_ADDR_LIST", "10.9.9.9")]);
        assert!(env.should_ignore("10.9.9.9:1234".parse().unwrap()));
        assert!(!env.should_ignore("10.9.9.8:1234".parse().unwrap()));
    }

    #[test]
    fn beacon_period_parses() {
        let env = env_of(&[("EPICS_CAS_BEACON_PERIOD", "30.0")]);
        assert_eq!(env.beacon_period, 30.0);
    }
}
