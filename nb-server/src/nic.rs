//! NIC auto-detection (§6 "NIC auto-detection"), grounded on the same
//! `pnet::datalink` interface scan used elsewhere in the corpus for PXE
//! traffic: pick the first interface that is up, not loopback, and carries
//! an IPv4 address.

use pnet::datalink;

/// The first usable local interface, by the rule: up, not loopback, has an
/// IP address. Returns `None` if nothing qualifies (e.g. a sandboxed
/// container with only `lo`).
pub fn find_default_interface() -> Option<datalink::NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
}

/// The first IPv4 address on `interface`, if any.
pub fn first_ipv4(interface: &datalink::NetworkInterface) -> Option<std::net::Ipv4Addr> {
    interface.ips.iter().find_map(|ip| match ip.ip() {
        std::net::IpAddr::V4(v4) => Some(v4),
        std::net::IpAddr::V6(_) => None,
    })
}

/// Default `--adapter`/`--address-dhcp` when the operator supplied neither
/// (§6): find a usable interface and its first IPv4 address. Does nothing
/// when `adapter` or `dhcp_address` is already set — auto-detection only
/// fills genuine gaps, never overrides an explicit choice.
pub fn autodetect(adapter: &mut String, dhcp_address: &mut String) {
    if !adapter.is_empty() || !dhcp_address.is_empty() {
        return;
    }

    let Some(interface) = find_default_interface() else {
        tracing::warn!("NIC auto-detection found no usable interface; leaving adapter/address unset");
        return;
    };

    *adapter = interface.name.clone();
    if let Some(ip) = first_ipv4(&interface) {
        *dhcp_address = ip.to_string();
        tracing::info!("auto-detected adapter {} with address {}", interface.name, ip);
    } else {
        tracing::warn!("auto-detected adapter {} has no IPv4 address", interface.name);
    }
}
