//! Run one command to completion over one SSH session and collect its
//! stdout, mirroring the `Session.Run` + buffered-stdout pattern this is
//! grounded on.

use anyhow::{Context, Result};
use russh::ChannelMsg;
use tracing::warn;

use nb_common::HostSshConfig;

use crate::client;

/// Open a connection to `host`, run `cmd` on a fresh exec channel, and return
/// whatever it wrote to stdout. Stderr is logged but not returned — callers
/// that need it should redirect it into the command itself.
pub async fn execute(host: &HostSshConfig, cmd: &str) -> Result<String> {
    let session = client::connect(host).await?;
    let mut channel = session.channel_open_session().await.context("opening exec channel")?;
    channel.exec(true, cmd).await.context("sending exec request")?;

    let mut stdout = Vec::new();
    loop {
        let Some(msg) = channel.wait().await else { break };
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, .. } => {
                if let Ok(text) = std::str::from_utf8(&data) {
                    warn!("{}: stderr: {}", host.host, text.trim_end());
                }
            }
            ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                warn!("{}: command exited with status {}", host.host, exit_status);
            }
            ChannelMsg::Eof | ChannelMsg::Close => break,
            _ => {}
        }
    }

    let _ = session.disconnect(russh::Disconnect::ByApplication, "", "en").await;
    Ok(String::from_utf8_lossy(&stdout).into_owned())
}
