//! Owns UDP:69. Every RRQ spawns its own transfer task on its own ephemeral
//! socket (RFC 1350 §8.1's "TID" rule) bounded by a semaphore so a burst of
//! requests can't spawn unbounded file handles.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::packet::{TftpPacket, ERROR_NOT_DEFINED};
use crate::transfer;

const SERVER_PORT: u16 = 69;
pub const DEFAULT_MAX_CONCURRENT_TRANSFERS: usize = 64;

pub struct TftpServerConfig {
    pub adapter_name: String,
    pub doc_root: PathBuf,
    pub max_concurrent_transfers: usize,
}

/// Run the TFTP server until `shutdown` reports `true`.
pub async fn run_tftp_server(config: TftpServerConfig, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("creating TFTP UDP socket")?;
    socket.set_reuse_address(true)?;

    let bind_addr: SocketAddr = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), SERVER_PORT);
    socket.bind(&bind_addr.into()).context("binding 0.0.0.0:69")?;

    #[cfg(target_os = "linux")]
    if !config.adapter_name.is_empty() {
        socket
            .bind_device(Some(config.adapter_name.as_bytes()))
            .context("binding TFTP socket to adapter")?;
        info!("TFTP bound to adapter {}", config.adapter_name);
    }

    socket.set_nonblocking(true)?;
    let socket = tokio::net::UdpSocket::from_std(socket.into())?;

    info!(
        "TFTP server listening on 0.0.0.0:{}, serving {}",
        SERVER_PORT,
        config.doc_root.display()
    );

    let root = Arc::new(config.doc_root);
    let permits = Arc::new(Semaphore::new(config.max_concurrent_transfers));
    let mut buf = [0u8; 65536];

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("TFTP server shutting down");
                    return Ok(());
                }
            }
            recv = socket.recv_from(&mut buf) => {
                let (len, client_addr) = match recv {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("TFTP recv error: {}", e);
                        continue;
                    }
                };

                match TftpPacket::parse(&buf[..len]) {
                    Ok(TftpPacket::Read(request)) => {
                        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                            warn!("TFTP at capacity, rejecting request from {}", client_addr);
                            let busy = TftpPacket::Error { code: ERROR_NOT_DEFINED, message: "server busy".to_string() };
                            let _ = socket.send_to(&busy.encode(), client_addr).await;
                            continue;
                        };

                        let root = Arc::clone(&root);
                        tokio::spawn(async move {
                            transfer::handle_read_request((*root).clone(), client_addr, request).await;
                            drop(permit);
                        });
                    }
                    Ok(TftpPacket::Write(_)) => {
                        warn!("TFTP write request from {} denied (read-only server)", client_addr);
                        let denied = TftpPacket::Error {
                            code: crate::packet::ERROR_ACCESS_VIOLATION,
                            message: "write not supported".to_string(),
                        };
                        let _ = socket.send_to(&denied.encode(), client_addr).await;
                    }
                    Ok(_) => {
                        debug!("ignoring unexpected TFTP packet from {}", client_addr);
                    }
                    Err(e) => {
                        debug!("invalid TFTP packet from {}: {}", client_addr, e);
                    }
                }
            }
        }
    }
}
