//! Owns the UDP:67 socket. Wire parsing and lease bookkeeping live in
//! `state_machine`/`lease_store`; this module is only concerned with I/O,
//! broadcast/unicast destination selection, and the lease reaper tick.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DhcpEngineConfig;
use crate::options::DHCPNAK;
use crate::packet::DhcpPacket;
use crate::state_machine;
use crate::SharedDhcpState;

const CLIENT_PORT: u16 = 68;
const SERVER_PORT: u16 = 67;

/// Run the DHCP server until `shutdown` reports `true`. Binds port 67 with
/// `SO_BROADCAST`, optionally pinned to a single adapter (Linux
/// `SO_BINDTODEVICE`), and runs a 1-second lease reaper alongside the
/// request loop.
pub async fn run_dhcp_server(state: SharedDhcpState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let config = state.config.read().await.clone();

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("creating DHCP UDP socket")?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;

    let bind_addr: SocketAddr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), SERVER_PORT);
    socket.bind(&bind_addr.into()).context("binding 0.0.0.0:67")?;

    #[cfg(target_os = "linux")]
    if !config.adapter_name.is_empty() {
        socket
            .bind_device(Some(config.adapter_name.as_bytes()))
            .context("binding DHCP socket to adapter")?;
        info!("DHCP bound to adapter {}", config.adapter_name);
    }

    socket.set_nonblocking(true)?;
    let socket = tokio::net::UdpSocket::from_std(socket.into())?;

    info!("DHCP server listening on 0.0.0.0:{}", SERVER_PORT);

    let mut reap_tick = tokio::time::interval(Duration::from_secs(1));
    let mut buf = [0u8; 1500];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("DHCP server shutting down");
                    return Ok(());
                }
            }
            _ = reap_tick.tick() => {
                let reaped = state.leases.lock().await.reap_expired();
                if reaped > 0 {
                    debug!("reaped {} expired DHCP lease(s)", reaped);
                }
            }
            recv = socket.recv_from(&mut buf) => {
                let (len, src) = match recv {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("DHCP recv error: {}", e);
                        continue;
                    }
                };

                let packet = match DhcpPacket::parse(&buf[..len]) {
                    Ok(p) => p,
                    Err(e) => {
                        debug!("invalid DHCP packet from {}: {}", src, e);
                        continue;
                    }
                };

                if packet.op != 1 {
                    continue;
                }

                let engine_config = state.config.read().await.clone();
                let mut leases = state.leases.lock().await;
                let response = state_machine::handle_dhcp_packet(&packet, &engine_config, &mut leases);
                drop(leases);

                if let Some(response) = response {
                    send_reply(&socket, &packet, &response).await;
                }
            }
        }
    }
}

async fn send_reply(socket: &tokio::net::UdpSocket, request: &DhcpPacket, response: &DhcpPacket) {
    let bytes = response.to_bytes();

    // RFC 2131 §4.3.2: DHCPNAK must always be broadcast when giaddr is zero;
    // otherwise honor the client's broadcast flag or bare ciaddr.
    let dest = if response.msg_type() == Some(DHCPNAK)
        || request.is_broadcast()
        || request.ciaddr == Ipv4Addr::UNSPECIFIED
    {
        SocketAddr::new(Ipv4Addr::BROADCAST.into(), CLIENT_PORT)
    } else {
        SocketAddr::new(request.ciaddr.into(), CLIENT_PORT)
    };

    if let Err(e) = socket.send_to(&bytes, dest).await {
        warn!("failed to send DHCP response to {}: {}", dest, e);
    }
}
