use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::error::{ConfigError, ConfigParseError, ConfigValidationError};

/// The names privileged by the HTTP delivery plane (§4.D). Note the observable
/// misspelling of "preeseed" — it is the config key on the wire, while the HTTP
/// path remains `/preseed.ipxe`. This mirrors the original's spelling exactly.
pub const BOOT_CONFIG_DEFAULT: &str = "default";
pub const BOOT_CONFIG_PREESEED: &str = "preeseed";
pub const BOOT_CONFIG_KICKSTART: &str = "kickstart";

fn default_lease_time_secs() -> u64 {
    3600
}

fn default_doc_root() -> String {
    "./www".to_string()
}

fn default_pxe_filename() -> String {
    "undionly.kpxe".to_string()
}

/// A single named `{kernel, initrd, cmdline}` triple used to render an iPXE script.
/// `kernel_path`/`initrd_path` are URLs relative to `http_address`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootConfig {
    pub name: String,
    #[serde(default)]
    pub kernel_path: String,
    #[serde(default)]
    pub initrd_path: String,
    #[serde(default)]
    pub cmdline: String,
}

/// An inclusive range of `lease_count` addresses starting at `start_address`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DhcpPool {
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub start_address: String,
    #[serde(default)]
    pub lease_count: u32,
}

impl Default for DhcpPool {
    fn default() -> Self {
        Self {
            gateway: String::new(),
            dns: String::new(),
            start_address: String::new(),
            lease_count: 0,
        }
    }
}

/// The server's singleton configuration, held by the orchestrator. Engines see
/// only this validated, defaulted shape — never the raw parsed buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub adapter_name: String,

    #[serde(default)]
    pub http_address: String,
    #[serde(default)]
    pub tftp_address: String,
    #[serde(default)]
    pub dhcp_address: String,

    #[serde(default)]
    pub enable_dhcp: bool,
    #[serde(default)]
    pub enable_tftp: bool,
    #[serde(default)]
    pub enable_http: bool,

    #[serde(default = "default_pxe_filename")]
    pub pxe_filename: String,

    #[serde(default)]
    pub dhcp_pool: DhcpPool,

    #[serde(default)]
    pub boot_configs: Vec<BootConfig>,

    #[serde(default)]
    pub any_boot: bool,

    #[serde(default = "default_doc_root")]
    pub doc_root: String,

    #[serde(default = "default_lease_time_secs")]
    pub lease_time_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty object deserializes via field defaults")
    }
}

impl ServerConfig {
    /// Apply the cross-field defaulting rules that cannot be expressed as a
    /// single-field `#[serde(default)]`: addresses fall back to `dhcp_address`
    /// when empty.
    pub fn apply_defaults(mut self) -> Self {
        if self.http_address.is_empty() {
            self.http_address = self.dhcp_address.clone();
        }
        if self.tftp_address.is_empty() {
            self.tftp_address = self.dhcp_address.clone();
        }
        if self.pxe_filename.is_empty() {
            self.pxe_filename = default_pxe_filename();
        }
        self
    }

    /// Validate a defaulted configuration. Rejects: an enabled DHCP engine
    /// with an empty pool, `lease_count == 0`, `start_address` outside the
    /// adapter's subnet, and duplicate `boot_config.name` entries.
    /// Unreferenced kernel/initrd paths are not rejected — only a caller-side
    /// warning is appropriate for those (§4.A), which this function does not emit.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.enable_dhcp && !self.enable_tftp && !self.enable_http {
            return Err(ConfigValidationError::NoServiceEnabled);
        }

        if self.enable_dhcp {
            if self.dhcp_pool.start_address.is_empty() {
                return Err(ConfigValidationError::EmptyDhcpPool);
            }
            if self.dhcp_pool.lease_count == 0 {
                return Err(ConfigValidationError::ZeroLeaseCount);
            }
            if let Ok(start) = self.dhcp_pool.start_address.parse::<Ipv4Addr>() {
                if let Ok(dhcp_addr) = self.dhcp_address.parse::<Ipv4Addr>() {
                    // A /24 is the conventional default subnet for a PXE segment;
                    // this is the only shape ServerConfig carries enough information
                    // to check without a netmask field of its own.
                    let same_24 = start.octets()[..3] == dhcp_addr.octets()[..3];
                    if !same_24 {
                        return Err(ConfigValidationError::StartAddressOutsideSubnet(
                            self.dhcp_pool.start_address.clone(),
                            format!("{}.0/24", dhcp_addr.octets()[..3].iter().map(|o| o.to_string()).collect::<Vec<_>>().join(".")),
                        ));
                    }
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for bc in &self.boot_configs {
            if !seen.insert(bc.name.as_str()) {
                return Err(ConfigValidationError::DuplicateBootConfigName(bc.name.clone()));
            }
        }

        Ok(())
    }

    /// Linear search of `boot_configs` by name; returns the first match.
    pub fn lookup_boot_config(&self, name: &str) -> Option<&BootConfig> {
        self.boot_configs.iter().find(|bc| bc.name == name)
    }
}

/// Parse a byte buffer purported to be YAML or JSON, then validate it.
/// Strategy (§4.A): attempt YAML-to-JSON conversion first; if that succeeds,
/// parse the resulting JSON; on failure, parse the original buffer as JSON
/// directly. Both failure diagnostics are carried in `ConfigParseError` if
/// neither path succeeds.
pub fn parse_and_validate(buf: &[u8]) -> Result<ServerConfig, ConfigError> {
    let config = parse_server_config(buf)?;
    config.validate().map_err(ConfigError::from)?;
    Ok(config)
}

pub fn parse_server_config(buf: &[u8]) -> Result<ServerConfig, ConfigParseError> {
    let config = parse_tolerant::<ServerConfig>(buf)?;
    Ok(config.apply_defaults())
}

/// The YAML-or-JSON tolerant parse used both by the startup loader and the
/// reconfiguration API, so both paths share one implementation and one error
/// type (§4.A). Generic so it also serves `DeploymentMap`.
pub fn parse_tolerant<T: serde::de::DeserializeOwned>(buf: &[u8]) -> Result<T, ConfigParseError> {
    let yaml_value: Result<serde_yaml::Value, _> = serde_yaml::from_slice(buf);
    match yaml_value {
        Ok(value) => {
            // serde_yaml::Value -> serde_json::Value -> T, i.e. "YAML-to-JSON conversion".
            let json_value = serde_json::to_value(&value).map_err(|e| ConfigParseError {
                yaml_error: e.to_string(),
                json_error: String::new(),
            })?;
            serde_json::from_value(json_value).map_err(|json_error| ConfigParseError {
                yaml_error: String::new(),
                json_error: json_error.to_string(),
            })
        }
        Err(yaml_error) => serde_json::from_slice(buf).map_err(|json_error| ConfigParseError {
            yaml_error: yaml_error.to_string(),
            json_error: json_error.to_string(),
        }),
    }
}

/// One entry of the per-MAC deployment map: the boot config to hand this MAC,
/// and the post-install shell steps to run once it has booted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentEntry {
    pub boot_config_name: String,
    #[serde(default)]
    pub post_install_steps: Vec<String>,
    #[serde(default)]
    pub identity: String,
}

/// MAC (canonicalized lowercase, colon-separated) -> deployment entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DeploymentMap {
    pub entries: std::collections::HashMap<String, DeploymentEntry>,
}

impl DeploymentMap {
    pub fn get(&self, mac: &str) -> Option<&DeploymentEntry> {
        self.entries.get(&canonicalize_mac(mac))
    }
}

/// Canonicalize a MAC address to lowercase, colon-separated form. Accepts
/// hyphen-separated or bare hex input as a convenience; anything else is
/// passed through lowercased so lookups still fail closed rather than panic.
pub fn canonicalize_mac(mac: &str) -> String {
    let lower = mac.to_lowercase();
    if lower.contains(':') {
        return lower;
    }
    let hex: String = lower.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() == 12 {
        hex.as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(":")
    } else {
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fall_back_to_dhcp_address() {
        let config = ServerConfig {
            dhcp_address: "10.0.0.1".to_string(),
            ..ServerConfig::default()
        }
        .apply_defaults();
        assert_eq!(config.http_address, "10.0.0.1");
        assert_eq!(config.tftp_address, "10.0.0.1");
        assert_eq!(config.pxe_filename, "undionly.kpxe");
    }

    #[test]
    fn rejects_all_services_disabled() {
        let config = ServerConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::NoServiceEnabled)
        ));
    }

    #[test]
    fn rejects_zero_lease_count() {
        let config = ServerConfig {
            enable_dhcp: true,
            dhcp_address: "10.0.0.1".to_string(),
            dhcp_pool: DhcpPool {
                start_address: "10.0.0.2".to_string(),
                lease_count: 0,
                ..DhcpPool::default()
            },
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ZeroLeaseCount)
        ));
    }

    #[test]
    fn rejects_duplicate_boot_config_names() {
        let config = ServerConfig {
            enable_http: true,
            boot_configs: vec![
                BootConfig { name: "default".into(), kernel_path: String::new(), initrd_path: String::new(), cmdline: String::new() },
                BootConfig { name: "default".into(), kernel_path: String::new(), initrd_path: String::new(), cmdline: String::new() },
            ],
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::DuplicateBootConfigName(_))
        ));
    }

    #[test]
    fn yaml_and_json_parse_to_the_same_value() {
        let yaml = b"enable_http: true\ndhcp_address: 10.0.0.1\n";
        let json = b"{\"enable_http\": true, \"dhcp_address\": \"10.0.0.1\"}";
        let from_yaml = parse_server_config(yaml).unwrap();
        let from_json = parse_server_config(json).unwrap();
        assert_eq!(from_yaml.enable_http, from_json.enable_http);
        assert_eq!(from_yaml.dhcp_address, from_json.dhcp_address);
    }

    #[test]
    fn mac_canonicalization_accepts_hyphens_and_bare_hex() {
        assert_eq!(canonicalize_mac("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(canonicalize_mac("aabbccddeeff"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(canonicalize_mac("AA:BB:CC:DD:EE:FF"), "aa:bb:cc:dd:ee:ff");
    }
}
