//! CLI surface (§6 "CLI surface"): one flag per field of `ServerConfig`,
//! plus the ambient `--log-level`/`--doc-root` additions of §1.
//!
//! Precedence is file-first, flags-override: `overlay` is applied to a
//! `ServerConfig` that was already loaded from `--config` (or defaulted),
//! so a flag only replaces a field when the operator actually passed it.

use clap::Parser;

use nb_common::{BootConfig, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "nb-server", about = "Network-boot (PXE) provisioning server")]
pub struct Args {
    /// Network interface to bind DHCP/TFTP to (e.g. eth0). Auto-detected when omitted.
    #[arg(long)]
    pub adapter: Option<String>,

    #[arg(long = "address-http")]
    pub address_http: Option<String>,
    #[arg(long = "address-tftp")]
    pub address_tftp: Option<String>,
    #[arg(long = "address-dhcp")]
    pub address_dhcp: Option<String>,

    #[arg(long = "enable-dhcp")]
    pub enable_dhcp: bool,
    #[arg(long = "enable-tftp")]
    pub enable_tftp: bool,
    #[arg(long = "enable-http")]
    pub enable_http: bool,

    /// Bootfile name handed out in DHCP option 67, maps to `pxe_filename`.
    #[arg(long = "ipxe-path")]
    pub ipxe_path: Option<String>,

    #[arg(long)]
    pub gateway: Option<String>,
    #[arg(long)]
    pub dns: Option<String>,
    #[arg(long = "lease-count")]
    pub lease_count: Option<u32>,
    #[arg(long = "start-address")]
    pub start_address: Option<String>,

    /// Three independent fields (§4.F / §9 "Duplicate flag registration" —
    /// the source aliased two flags onto one struct field; this does not).
    #[arg(long)]
    pub kernel: Option<String>,
    #[arg(long)]
    pub initrd: Option<String>,
    #[arg(long)]
    pub cmdline: Option<String>,

    /// Path to a ServerConfig file (YAML or JSON), loaded before flags overlay.
    #[arg(long)]
    pub config: Option<String>,
    /// Path to a DeploymentMap file (YAML or JSON).
    #[arg(long)]
    pub deployment: Option<String>,

    #[arg(long = "any-boot")]
    pub any_boot: bool,

    /// Ambient addition (§1): tracing filter, e.g. "info" or "debug,nb_dhcp=trace".
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Ambient addition (§1): root directory the HTTP plane serves statically.
    #[arg(long = "doc-root")]
    pub doc_root: Option<String>,
}

impl Args {
    /// Apply this CLI invocation's explicitly-set flags onto `config`, which
    /// has already been loaded from `--config`'s file (or defaulted). Only
    /// flags the operator actually passed are applied; `bool` flags are
    /// one-directional (`--enable-dhcp` can turn a service on but an absent
    /// flag never turns one off that the file already enabled).
    pub fn overlay(&self, mut config: ServerConfig) -> ServerConfig {
        if let Some(v) = &self.adapter {
            config.adapter_name = v.clone();
        }
        if let Some(v) = &self.address_http {
            config.http_address = v.clone();
        }
        if let Some(v) = &self.address_tftp {
            config.tftp_address = v.clone();
        }
        if let Some(v) = &self.address_dhcp {
            config.dhcp_address = v.clone();
        }

        config.enable_dhcp |= self.enable_dhcp;
        config.enable_tftp |= self.enable_tftp;
        config.enable_http |= self.enable_http;
        config.any_boot |= self.any_boot;

        if let Some(v) = &self.ipxe_path {
            config.pxe_filename = v.clone();
        }
        if let Some(v) = &self.gateway {
            config.dhcp_pool.gateway = v.clone();
        }
        if let Some(v) = &self.dns {
            config.dhcp_pool.dns = v.clone();
        }
        if let Some(v) = self.lease_count {
            config.dhcp_pool.lease_count = v;
        }
        if let Some(v) = &self.start_address {
            config.dhcp_pool.start_address = v.clone();
        }
        if let Some(v) = &self.doc_root {
            config.doc_root = v.clone();
        }

        if self.kernel.is_some() || self.initrd.is_some() || self.cmdline.is_some() {
            apply_default_boot_config(&mut config, self);
        }

        config
    }
}

/// `--kernel`/`--initrd`/`--cmdline` each write their own field on the
/// `"default"` boot config, creating it if no boot config of that name
/// exists yet.
fn apply_default_boot_config(config: &mut ServerConfig, args: &Args) {
    let existing = config.boot_configs.iter_mut().find(|bc| bc.name == nb_common::config::BOOT_CONFIG_DEFAULT);

    let entry = match existing {
        Some(entry) => entry,
        None => {
            config.boot_configs.push(BootConfig {
                name: nb_common::config::BOOT_CONFIG_DEFAULT.to_string(),
                kernel_path: String::new(),
                initrd_path: String::new(),
                cmdline: String::new(),
            });
            config.boot_configs.last_mut().expect("just pushed")
        }
    };

    if let Some(v) = &args.kernel {
        entry.kernel_path = v.clone();
    }
    if let Some(v) = &args.initrd {
        entry.initrd_path = v.clone();
    }
    if let Some(v) = &args.cmdline {
        entry.cmdline = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_initrd_cmdline_populate_three_distinct_fields() {
        let args = Args::parse_from([
            "nb-server",
            "--kernel",
            "vmlinuz",
            "--initrd",
            "initrd.img",
            "--cmdline",
            "console=ttyS0",
        ]);
        let config = args.overlay(ServerConfig::default());
        let default_bc = config.lookup_boot_config(nb_common::config::BOOT_CONFIG_DEFAULT).unwrap();
        assert_eq!(default_bc.kernel_path, "vmlinuz");
        assert_eq!(default_bc.initrd_path, "initrd.img");
        assert_eq!(default_bc.cmdline, "console=ttyS0");
    }

    #[test]
    fn enable_flags_only_turn_services_on() {
        let mut config = ServerConfig::default();
        config.enable_http = true;
        let args = Args::parse_from(["nb-server", "--enable-dhcp"]);
        let config = args.overlay(config);
        assert!(config.enable_dhcp);
        assert!(config.enable_http);
    }
}
