use thiserror::Error;

/// Error parsing a configuration buffer as either YAML or JSON.
///
/// Carries both attempt diagnostics: the YAML-to-JSON conversion's error and
/// the fallback direct-JSON parse error, so a caller can see why both paths
/// failed rather than just the last one tried.
#[derive(Error, Debug)]
#[error("unable to parse configuration as either yaml or json (yaml: {yaml_error}, json: {json_error})")]
pub struct ConfigParseError {
    pub yaml_error: String,
    pub json_error: String,
}

/// Semantic validation failure on an otherwise well-formed configuration.
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("at least one of enable_dhcp, enable_tftp, enable_http must be true")]
    NoServiceEnabled,
    #[error("dhcp is enabled but dhcp_pool.start_address is empty")]
    EmptyDhcpPool,
    #[error("dhcp_pool.lease_count must be greater than zero")]
    ZeroLeaseCount,
    #[error("dhcp_pool.start_address {0} is outside the adapter's subnet {1}")]
    StartAddressOutsideSubnet(String, String),
    #[error("duplicate boot_config name: {0}")]
    DuplicateBootConfigName(String),
}

/// Top-level error carried by the reconfiguration API and the startup loader.
/// Both share this single type so there is one error taxonomy for "config is bad",
/// whichever path discovered it.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Parse(#[from] ConfigParseError),
    #[error(transparent)]
    Validation(#[from] ConfigValidationError),
}

impl ConfigError {
    /// A short, human-facing string suitable for the `friendly_error` envelope field.
    pub fn friendly(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "could not parse configuration as yaml or json",
            ConfigError::Validation(_) => "configuration failed validation",
        }
    }
}
