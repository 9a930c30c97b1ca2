//! Upload/download over the transport's file-transfer subchannel (§4.F).
//! Each transfer opens its own connection and closes it when done — no
//! pooling, the same one-shot lifecycle `exec::execute` uses for commands.

use std::path::Path;

use anyhow::{Context, Result};
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use nb_common::HostSshConfig;

use crate::client;

async fn open_sftp(host: &HostSshConfig) -> Result<(russh::client::Handle<client::AcceptAllHostKeys>, SftpSession)> {
    let session = client::connect(host).await?;
    let channel = session.channel_open_session().await.context("opening sftp channel")?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .context("requesting sftp subsystem")?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .context("starting sftp session")?;
    Ok((session, sftp))
}

/// Copy `local_path` to `remote_path` on `host`.
pub async fn upload_file(host: &HostSshConfig, local_path: &Path, remote_path: &str) -> Result<()> {
    let (session, sftp) = open_sftp(host).await?;

    let data = tokio::fs::read(local_path)
        .await
        .with_context(|| format!("reading local file {}", local_path.display()))?;

    let mut remote_file = sftp
        .create(remote_path)
        .await
        .with_context(|| format!("creating remote file {remote_path}"))?;
    remote_file.write_all(&data).await.context("writing remote file")?;
    remote_file.shutdown().await.ok();

    let _ = session.disconnect(russh::Disconnect::ByApplication, "", "en").await;
    Ok(())
}

/// Copy `remote_path` on `host` to `local_path`.
pub async fn download_file(host: &HostSshConfig, remote_path: &str, local_path: &Path) -> Result<()> {
    let (session, sftp) = open_sftp(host).await?;

    let mut remote_file = sftp
        .open(remote_path)
        .await
        .with_context(|| format!("opening remote file {remote_path}"))?;
    let mut buf = Vec::new();
    remote_file.read_to_end(&mut buf).await.context("reading remote file")?;

    tokio::fs::write(local_path, &buf)
        .await
        .with_context(|| format!("writing local file {}", local_path.display()))?;

    let _ = session.disconnect(russh::Disconnect::ByApplication, "", "en").await;
    Ok(())
}
