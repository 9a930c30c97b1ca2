//! One RRQ, one ephemeral socket, one task. Transfers never share state with
//! each other or with the listener — the only thing they read is the doc
//! root path, resolved once at dispatch time.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::packet::{negotiate_block_size, ReadRequest, TftpPacket, ERROR_FILE_NOT_FOUND, ERROR_ILLEGAL_OPERATION, ERROR_NOT_DEFINED};

const BLOCK_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_RETRIES: u32 = 5;

/// Resolve `filename` under `root`, rejecting anything that escapes it via
/// `..` or a symlink. Mirrors the canonicalize-then-`starts_with` check PXE
/// TFTP servers universally use to keep a read-only root read-only.
fn resolve_under_root(root: &Path, filename: &str) -> Option<PathBuf> {
    let relative = filename.trim_start_matches('/');
    let candidate = root.join(relative);
    let root_canonical = root.canonicalize().ok()?;
    let canonical = candidate.canonicalize().ok()?;
    if canonical.starts_with(&root_canonical) {
        Some(canonical)
    } else {
        None
    }
}

async fn send_error(socket: &UdpSocket, dest: SocketAddr, code: u16, message: &str) {
    let packet = TftpPacket::Error { code, message: message.to_string() };
    let _ = socket.send_to(&packet.encode(), dest).await;
}

/// Handle one read request end to end: validate the path, optionally OACK,
/// then walk the file out in blocks with a stop-and-wait ACK per block.
pub async fn handle_read_request(root: PathBuf, client_addr: SocketAddr, request: ReadRequest) {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(s) => s,
        Err(e) => {
            warn!("tftp: failed to bind transfer socket for {}: {}", client_addr, e);
            return;
        }
    };

    let Some(path) = resolve_under_root(&root, &request.filename) else {
        warn!("tftp: rejecting out-of-root request from {}: {:?}", client_addr, request.filename);
        send_error(&socket, client_addr, ERROR_FILE_NOT_FOUND, "file not found").await;
        return;
    };

    let mut file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            debug!("tftp: {} not found for {}: {}", path.display(), client_addr, e);
            send_error(&socket, client_addr, ERROR_FILE_NOT_FOUND, "file not found").await;
            return;
        }
    };

    let file_size = match file.metadata().await {
        Ok(m) => m.len(),
        Err(_) => 0,
    };

    info!("tftp: {} requesting {}", client_addr, request.filename);

    let block_size = negotiate_block_size(&request.options);

    if !request.options.is_empty() {
        if !negotiate_options(&socket, client_addr, &request.options, block_size, file_size).await {
            return;
        }
    }

    transfer_file(&socket, client_addr, &mut file, block_size).await;
}

async fn negotiate_options(
    socket: &UdpSocket,
    client_addr: SocketAddr,
    requested: &HashMap<String, String>,
    block_size: usize,
    file_size: u64,
) -> bool {
    let mut reply_options = HashMap::new();
    if requested.contains_key("blksize") {
        reply_options.insert("blksize".to_string(), block_size.to_string());
    }
    if requested.contains_key("tsize") {
        reply_options.insert("tsize".to_string(), file_size.to_string());
    }

    let oack = TftpPacket::Oack { options: reply_options };
    let mut retries = 0;
    loop {
        if socket.send_to(&oack.encode(), client_addr).await.is_err() {
            return false;
        }

        let mut buf = [0u8; 4];
        match tokio::time::timeout(BLOCK_TIMEOUT, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) if from == client_addr => {
                if let Ok(TftpPacket::Ack { block: 0 }) = TftpPacket::parse(&buf[..len]) {
                    return true;
                }
                warn!("tftp: expected ACK(0) for OACK from {}", client_addr);
                return false;
            }
            _ => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    warn!("tftp: {} never acked OACK, giving up", client_addr);
                    return false;
                }
            }
        }
    }
}

async fn transfer_file(socket: &UdpSocket, client_addr: SocketAddr, file: &mut File, block_size: usize) {
    let mut block_num: u16 = 1;
    let mut buf = vec![0u8; block_size];

    loop {
        let bytes_read = match file.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                warn!("tftp: read error for {}: {}", client_addr, e);
                send_error(socket, client_addr, ERROR_ILLEGAL_OPERATION, "read error").await;
                return;
            }
        };

        let data_packet = TftpPacket::Data { block: block_num, data: buf[..bytes_read].to_vec() };
        let encoded = data_packet.encode();

        let mut retries = 0;
        let acked = loop {
            if socket.send_to(&encoded, client_addr).await.is_err() {
                return;
            }

            let mut ack_buf = [0u8; 4];
            match tokio::time::timeout(BLOCK_TIMEOUT, socket.recv_from(&mut ack_buf)).await {
                Ok(Ok((len, from))) if from == client_addr => match TftpPacket::parse(&ack_buf[..len]) {
                    Ok(TftpPacket::Ack { block }) if block == block_num => break true,
                    Ok(TftpPacket::Error { code, message }) => {
                        warn!("tftp: client {} sent error {}: {}", client_addr, code, message);
                        return;
                    }
                    _ => {}
                },
                _ => {}
            }

            retries += 1;
            if retries >= MAX_RETRIES {
                warn!("tftp: {} stopped acking block {}, abandoning transfer", client_addr, block_num);
                break false;
            }
        };

        if !acked {
            send_error(socket, client_addr, ERROR_NOT_DEFINED, "timed out waiting for ack").await;
            return;
        }

        if bytes_read < block_size {
            debug!("tftp: transfer to {} complete ({} blocks)", client_addr, block_num);
            return;
        }

        block_num = block_num.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("nb-tftp-test-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(root.join("boot")).unwrap();
        std::fs::write(root.join("boot/undionly.kpxe"), b"stub pxe binary").unwrap();
        root
    }

    #[test]
    fn resolves_a_file_that_exists_under_root() {
        let root = scratch_root("happy");
        let resolved = resolve_under_root(&root, "boot/undionly.kpxe").unwrap();
        assert!(resolved.ends_with("boot/undionly.kpxe"));
    }

    #[test]
    fn rejects_dot_dot_traversal_out_of_root() {
        let root = scratch_root("traversal");
        assert!(resolve_under_root(&root, "../etc/passwd").is_none());
        assert!(resolve_under_root(&root, "boot/../../etc/passwd").is_none());
    }

    #[test]
    fn rejects_a_path_that_does_not_exist() {
        let root = scratch_root("missing");
        assert!(resolve_under_root(&root, "nowhere.bin").is_none());
    }
}
