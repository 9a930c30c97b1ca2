//! One SSH connection, opened fresh per operation. Nothing here is pooled —
//! a command run or a file transfer dials, does its work, and hangs up,
//! exactly like the connection lifecycle it's grounded on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use tracing::debug;

use nb_common::{HostSshConfig, SshAuth};

pub struct AcceptAllHostKeys;

#[async_trait::async_trait]
impl client::Handler for AcceptAllHostKeys {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Fleet hosts are addressed by IP on a provisioning-only network with
        // no established host key trust store (§4.F Non-goals). Accepting
        // unconditionally matches the plaintext-password posture already
        // assumed by `HostSshConfig`.
        Ok(true)
    }
}

/// Dial `host`, authenticate with whichever `SshAuth` variant it carries, and
/// hand back the open session. Callers own its lifetime and disconnect when done.
pub async fn connect(host: &HostSshConfig) -> Result<Handle<AcceptAllHostKeys>> {
    let (addr, port) = host.host_port();
    let config = Arc::new(client::Config {
        connection_timeout: Some(Duration::from_secs(host.connect_timeout_secs)),
        ..Default::default()
    });

    let mut session = client::connect(config, (addr.as_str(), port), AcceptAllHostKeys)
        .await
        .with_context(|| format!("connecting to {}:{}", addr, port))?;

    let authenticated = match &host.auth {
        SshAuth::Password(password) => session
            .authenticate_password(&host.user, password)
            .await
            .context("password authentication")?,
        SshAuth::PrivateKeyPath(path) => {
            let key = russh::keys::load_secret_key(path, None)
                .with_context(|| format!("loading private key {}", path.display()))?;
            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), session.best_supported_rsa_hash().await?.flatten());
            session
                .authenticate_publickey(&host.user, key_with_hash)
                .await
                .context("public key authentication")?
        }
    };

    if !authenticated.success() {
        anyhow::bail!("authentication rejected for {}@{}", host.user, addr);
    }

    debug!("ssh session established with {}@{}:{}", host.user, addr, port);
    Ok(session)
}
