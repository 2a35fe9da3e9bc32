//! Interface prerequisites: local addresses and the default gateway.
//!
//! Both are resolved before any capture pass runs, so a misnamed or
//! unconfigured interface fails the run before tcpdump is started.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::error::{ExtractError, Result};

static RE_DEFAULT_ROUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"default via ([0-9.]+) dev ([^\s]+)").expect("valid default route regex")
});

/// Everything the pipeline needs to know about the outbound interface.
#[derive(Debug, Clone)]
pub struct Prerequisites {
    pub interface: String,
    pub local_addresses: HashSet<Ipv4Addr>,
    pub gateway: Ipv4Addr,
}

/// IPv4 addresses assigned to `interface`.
pub fn local_ipv4_addresses(interface: &str) -> Result<HashSet<Ipv4Addr>> {
    let iface = pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == interface)
        .ok_or_else(|| ExtractError::InterfaceNotFound {
            interface: interface.to_string(),
        })?;

    let addresses: HashSet<Ipv4Addr> = iface
        .ips
        .iter()
        .filter_map(|net| match net.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect();

    if addresses.is_empty() {
        return Err(ExtractError::NoLocalAddress {
            interface: interface.to_string(),
        });
    }
    Ok(addresses)
}

/// Find the default gateway for `interface` in `ip route show` output.
///
/// When several default routes use the interface, the last one listed wins.
pub fn parse_default_gateway(route_table: &str, interface: &str) -> Option<Ipv4Addr> {
    route_table
        .lines()
        .filter_map(|line| RE_DEFAULT_ROUTE.captures(line))
        .filter(|caps| caps.get(2).is_some_and(|dev| dev.as_str() == interface))
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .last()
}

/// Default gateway for `interface`, read from `ip route show`.
pub async fn default_gateway(interface: &str) -> Result<Ipv4Addr> {
    let output = Command::new("ip")
        .args(["route", "show"])
        .output()
        .await
        .map_err(|e| ExtractError::ToolInvocation {
            tool: "ip".to_string(),
            source: e,
        })?;

    let table = String::from_utf8_lossy(&output.stdout);
    parse_default_gateway(&table, interface).ok_or_else(|| ExtractError::NoGateway {
        interface: interface.to_string(),
    })
}

/// Resolve local addresses and gateway for `interface`, failing fast.
pub async fn discover(interface: &str) -> Result<Prerequisites> {
    let local_addresses = local_ipv4_addresses(interface)?;
    let gateway = default_gateway(interface).await?;

    tracing::info!(
        interface = %interface,
        gateway = %gateway,
        local_addresses = local_addresses.len(),
        "Interface prerequisites resolved"
    );

    Ok(Prerequisites {
        interface: interface.to_string(),
        local_addresses,
        gateway,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTES: &str = "\
default via 192.168.1.1 dev wlan0 proto dhcp metric 600
default via 10.8.0.1 dev tun0 proto static metric 50
10.8.0.0/24 dev tun0 proto kernel scope link src 10.8.0.6
192.168.1.0/24 dev wlan0 proto kernel scope link src 192.168.1.10 metric 600
";

    #[test]
    fn test_gateway_for_interface() {
        assert_eq!(
            parse_default_gateway(ROUTES, "wlan0"),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(
            parse_default_gateway(ROUTES, "tun0"),
            Some(Ipv4Addr::new(10, 8, 0, 1))
        );
    }

    #[test]
    fn test_no_default_route_on_interface() {
        assert_eq!(parse_default_gateway(ROUTES, "eth0"), None);
        assert_eq!(parse_default_gateway("", "wlan0"), None);
    }

    #[test]
    fn test_interface_name_must_match_exactly() {
        assert_eq!(parse_default_gateway(ROUTES, "wlan"), None);
    }

    #[test]
    fn test_unknown_interface() {
        let err = local_ipv4_addresses("no-such-if0").unwrap_err();
        assert!(matches!(err, ExtractError::InterfaceNotFound { .. }));
    }
}
