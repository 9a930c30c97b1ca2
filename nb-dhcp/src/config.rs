//! The DHCP engine's own view of configuration: a small, self-contained shape
//! derived from `nb_common::ServerConfig` so the wire logic in
//! `state_machine.rs` never has to know about boot configs, deployments, or
//! the HTTP/TFTP planes.

use std::net::Ipv4Addr;

use nb_common::ServerConfig;

#[derive(Debug, Clone)]
pub struct DhcpEngineConfig {
    pub adapter_name: String,
    pub server_address: Ipv4Addr,
    pub tftp_address: Ipv4Addr,
    pub pxe_filename: String,
    pub start_address: Ipv4Addr,
    pub lease_count: u32,
    pub gateway: Option<Ipv4Addr>,
    pub dns: Option<Ipv4Addr>,
    pub lease_time_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
    #[error("dhcp_address {0:?} does not parse as an IPv4 address")]
    InvalidServerAddress(String),
    #[error("tftp_address {0:?} does not parse as an IPv4 address")]
    InvalidTftpAddress(String),
    #[error("dhcp_pool.start_address {0:?} does not parse as an IPv4 address")]
    InvalidStartAddress(String),
}

impl DhcpEngineConfig {
    /// Build the engine's working config from the validated server config.
    /// Assumes `config.validate()` has already rejected an empty pool or a
    /// zero lease count — this only reparses the address strings, which
    /// `validate` checked are parseable when non-empty.
    pub fn from_server_config(config: &ServerConfig) -> Result<Self, EngineConfigError> {
        let server_address = config
            .dhcp_address
            .parse()
            .map_err(|_| EngineConfigError::InvalidServerAddress(config.dhcp_address.clone()))?;
        let tftp_address = config
            .tftp_address
            .parse()
            .map_err(|_| EngineConfigError::InvalidTftpAddress(config.tftp_address.clone()))?;
        let start_address = config
            .dhcp_pool
            .start_address
            .parse()
            .map_err(|_| EngineConfigError::InvalidStartAddress(config.dhcp_pool.start_address.clone()))?;

        Ok(Self {
            adapter_name: config.adapter_name.clone(),
            server_address,
            tftp_address,
            pxe_filename: config.pxe_filename.clone(),
            start_address,
            lease_count: config.dhcp_pool.lease_count,
            gateway: config.dhcp_pool.gateway.parse().ok(),
            dns: config.dhcp_pool.dns.parse().ok(),
            lease_time_secs: config.lease_time_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nb_common::DhcpPool;

    fn base() -> ServerConfig {
        ServerConfig {
            enable_dhcp: true,
            adapter_name: "eth0".into(),
            dhcp_address: "10.0.0.1".into(),
            tftp_address: "10.0.0.1".into(),
            pxe_filename: "undionly.kpxe".into(),
            dhcp_pool: DhcpPool {
                gateway: "10.0.0.1".into(),
                dns: "10.0.0.1".into(),
                start_address: "10.0.0.10".into(),
                lease_count: 50,
            },
            ..ServerConfig::default()
        }
    }

    #[test]
    fn builds_from_a_valid_server_config() {
        let cfg = DhcpEngineConfig::from_server_config(&base()).unwrap();
        assert_eq!(cfg.server_address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(cfg.start_address, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(cfg.lease_count, 50);
        assert_eq!(cfg.gateway, Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn rejects_unparseable_start_address() {
        let mut config = base();
        config.dhcp_pool.start_address = "not-an-ip".into();
        assert!(matches!(
            DhcpEngineConfig::from_server_config(&config),
            Err(EngineConfigError::InvalidStartAddress(_))
        ));
    }
}
