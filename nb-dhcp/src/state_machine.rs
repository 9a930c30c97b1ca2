//! Pure packet-in/packet-out logic. Nothing here touches a socket or a
//! clock beyond what `LeaseStore` already encapsulates — that split is what
//! lets the tests below drive the whole engine without binding port 67.

use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use crate::config::DhcpEngineConfig;
use crate::lease_store::LeaseStore;
use crate::options::*;
use crate::packet::DhcpPacket;

/// Handle one incoming DHCP packet, producing a reply if one is warranted.
pub fn handle_dhcp_packet(
    packet: &DhcpPacket,
    config: &DhcpEngineConfig,
    lease_store: &mut LeaseStore,
) -> Option<DhcpPacket> {
    let msg_type = packet.msg_type()?;

    match msg_type {
        DHCPDISCOVER => handle_discover(packet, config, lease_store),
        DHCPREQUEST => handle_request(packet, config, lease_store),
        DHCPRELEASE => {
            lease_store.expire(&packet.mac_str());
            None
        }
        DHCPDECLINE => {
            let mac = packet.mac_str();
            warn!("DHCPDECLINE from {}", mac);
            lease_store.expire(&mac);
            None
        }
        DHCPINFORM => {
            debug!("DHCPINFORM from {} (no lease action taken)", packet.mac_str());
            None
        }
        other => {
            debug!("ignoring DHCP message type {}", other);
            None
        }
    }
}

fn handle_discover(
    packet: &DhcpPacket,
    config: &DhcpEngineConfig,
    lease_store: &mut LeaseStore,
) -> Option<DhcpPacket> {
    let mac = packet.mac_str();
    info!("DHCPDISCOVER from {}", mac);

    let offered_ip = lease_store.allocate(&mac, config.start_address, config.lease_count)?;
    info!("DHCPOFFER {} to {}", offered_ip, mac);

    let options = build_pxe_options(config);
    let mut reply = packet.build_reply(
        DHCPOFFER,
        offered_ip,
        config.tftp_address,
        Ipv4Addr::UNSPECIFIED,
        options,
    );
    reply.set_boot_file(&config.pxe_filename);
    Some(reply)
}

fn handle_request(
    packet: &DhcpPacket,
    config: &DhcpEngineConfig,
    lease_store: &mut LeaseStore,
) -> Option<DhcpPacket> {
    let mac = packet.mac_str();

    if let Some(requested_server) = packet.server_id() {
        if requested_server != config.server_address {
            debug!("DHCPREQUEST from {} for a different server {}", mac, requested_server);
            return None;
        }
    }

    let requested_ip = packet.requested_ip().or({
        if packet.ciaddr != Ipv4Addr::UNSPECIFIED {
            Some(packet.ciaddr)
        } else {
            None
        }
    });

    let requested_ip = match requested_ip {
        Some(ip) => ip,
        None => {
            warn!("DHCPREQUEST from {} carried no requested IP", mac);
            return Some(build_nak(packet, config.server_address));
        }
    };

    if !lease_store.confirm(&mac, requested_ip, config.lease_time_secs) {
        warn!("DHCPNAK: {} requested {} with no matching outstanding offer", mac, requested_ip);
        return Some(build_nak(packet, config.server_address));
    }

    info!("DHCPACK {} to {}", requested_ip, mac);
    let options = build_pxe_options(config);
    let mut reply = packet.build_reply(
        DHCPACK,
        requested_ip,
        config.tftp_address,
        packet.ciaddr,
        options,
    );
    reply.set_boot_file(&config.pxe_filename);
    Some(reply)
}

fn build_nak(packet: &DhcpPacket, server_address: Ipv4Addr) -> DhcpPacket {
    packet.build_reply(
        DHCPNAK,
        Ipv4Addr::UNSPECIFIED,
        server_address,
        Ipv4Addr::UNSPECIFIED,
        vec![DhcpOption::server_id(server_address)],
    )
}

/// Options common to OFFER and ACK: server id, lease time, the PXE pair
/// (66/67), and whatever gateway/DNS the pool configures.
fn build_pxe_options(config: &DhcpEngineConfig) -> Vec<DhcpOption> {
    let mut opts = vec![
        DhcpOption::subnet_mask(Ipv4Addr::new(255, 255, 255, 0)),
        DhcpOption::server_id(config.server_address),
        DhcpOption::lease_time(config.lease_time_secs as u32),
        DhcpOption::tftp_server_name(config.tftp_address),
        DhcpOption::bootfile_name(&config.pxe_filename),
    ];

    if let Some(gw) = config.gateway {
        opts.push(DhcpOption::router(gw));
    }
    if let Some(dns) = config.dns {
        opts.push(DhcpOption::dns_server(dns));
    }

    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DhcpEngineConfig {
        DhcpEngineConfig {
            adapter_name: "eth0".into(),
            server_address: Ipv4Addr::new(10, 0, 0, 1),
            tftp_address: Ipv4Addr::new(10, 0, 0, 1),
            pxe_filename: "undionly.kpxe".into(),
            start_address: Ipv4Addr::new(10, 0, 0, 10),
            lease_count: 10,
            gateway: Some(Ipv4Addr::new(10, 0, 0, 1)),
            dns: Some(Ipv4Addr::new(10, 0, 0, 1)),
            lease_time_secs: 3600,
        }
    }

    fn discover_packet(mac: [u8; 6]) -> DhcpPacket {
        let mut chaddr = [0u8; 16];
        chaddr[..6].copy_from_slice(&mac);
        DhcpPacket {
            op: 1,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0xdead_beef,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: vec![DhcpOption::msg_type(DHCPDISCOVER)],
        }
    }

    #[test]
    fn discover_yields_an_offer_with_pxe_options() {
        let cfg = config();
        let mut store = LeaseStore::new();
        let packet = discover_packet([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);

        let reply = handle_dhcp_packet(&packet, &cfg, &mut store).unwrap();
        assert_eq!(reply.msg_type(), Some(DHCPOFFER));
        assert_eq!(reply.yiaddr, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(reply.siaddr, cfg.tftp_address);
        assert_eq!(
            reply.get_option(OPT_BOOTFILE_NAME).unwrap().as_str().unwrap(),
            "undionly.kpxe"
        );
        assert!(reply.get_option(OPT_TFTP_SERVER_NAME).is_some());
        assert_eq!(
            reply.get_option(OPT_SUBNET_MASK).unwrap().data,
            Ipv4Addr::new(255, 255, 255, 0).octets().to_vec()
        );
    }

    #[test]
    fn request_without_outstanding_offer_is_nakked() {
        let cfg = config();
        let mut store = LeaseStore::new();
        let mut packet = discover_packet([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02]);
        packet.options = vec![
            DhcpOption::msg_type(DHCPREQUEST),
            DhcpOption::new(OPT_REQUESTED_IP, Ipv4Addr::new(10, 0, 0, 10).octets().to_vec()),
        ];

        let reply = handle_dhcp_packet(&packet, &cfg, &mut store).unwrap();
        assert_eq!(reply.msg_type(), Some(DHCPNAK));
    }

    #[test]
    fn discover_then_request_acks_the_offered_ip() {
        let cfg = config();
        let mut store = LeaseStore::new();
        let mac = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x03];

        let discover = discover_packet(mac);
        let offer = handle_dhcp_packet(&discover, &cfg, &mut store).unwrap();
        let offered_ip = offer.yiaddr;

        let mut request = discover_packet(mac);
        request.options = vec![
            DhcpOption::msg_type(DHCPREQUEST),
            DhcpOption::new(OPT_REQUESTED_IP, offered_ip.octets().to_vec()),
            DhcpOption::server_id(cfg.server_address),
        ];

        let ack = handle_dhcp_packet(&request, &cfg, &mut store).unwrap();
        assert_eq!(ack.msg_type(), Some(DHCPACK));
        assert_eq!(ack.yiaddr, offered_ip);
    }

    #[test]
    fn request_for_a_different_server_id_is_ignored() {
        let cfg = config();
        let mut store = LeaseStore::new();
        let mut packet = discover_packet([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x04]);
        packet.options = vec![
            DhcpOption::msg_type(DHCPREQUEST),
            DhcpOption::new(OPT_REQUESTED_IP, Ipv4Addr::new(10, 0, 0, 10).octets().to_vec()),
            DhcpOption::server_id(Ipv4Addr::new(10, 0, 0, 99)),
        ];

        assert!(handle_dhcp_packet(&packet, &cfg, &mut store).is_none());
    }

    #[test]
    fn release_expires_the_lease_immediately() {
        let cfg = config();
        let mut store = LeaseStore::new();
        let mac = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x05];
        let discover = discover_packet(mac);
        let offer = handle_dhcp_packet(&discover, &cfg, &mut store).unwrap();

        let mut release = discover_packet(mac);
        release.ciaddr = offer.yiaddr;
        release.options = vec![DhcpOption::msg_type(DHCPRELEASE)];
        assert!(handle_dhcp_packet(&release, &cfg, &mut store).is_none());

        assert!(matches!(
            store.get_by_mac(&DhcpPacket::parse(&discover.to_bytes()).unwrap().mac_str()),
            Some(lease) if lease.state == crate::lease_store::LeaseState::Expired
        ));
    }
}
