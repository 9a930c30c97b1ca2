//! iPXE script rendering (§4.D).
//!
//! An iPXE script is a plain-text document: `#!ipxe`, a `kernel` line, an
//! `initrd` line, and `boot`. `kernel_path`/`initrd_path` are URLs relative
//! to `http_address`; `cmdline` is appended verbatim on the kernel line.

use nb_common::BootConfig;

pub const REBOOT_IPXE: &str = "#!ipxe\nreboot\n";

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Render `boot_config` for a client fetching scripts from `http_address`
/// (e.g. `10.0.0.1`, no scheme — the `http://` prefix is added here).
pub fn render_ipxe(boot_config: &BootConfig, http_address: &str) -> String {
    let kernel_path = with_leading_slash(&boot_config.kernel_path);
    let initrd_path = with_leading_slash(&boot_config.initrd_path);

    let kernel_line = if boot_config.cmdline.is_empty() {
        format!("kernel http://{http_address}{kernel_path}")
    } else {
        format!("kernel http://{http_address}{kernel_path} {}", boot_config.cmdline)
    };

    format!("#!ipxe\n{kernel_line}\ninitrd http://{http_address}{initrd_path}\nboot\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_kernel_initrd_and_cmdline() {
        let boot_config = BootConfig {
            name: "default".into(),
            kernel_path: "vmlinuz".into(),
            initrd_path: "initrd.img".into(),
            cmdline: "console=ttyS0".into(),
        };
        let body = render_ipxe(&boot_config, "10.0.0.1");
        assert!(body.contains("kernel http://10.0.0.1/vmlinuz console=ttyS0"));
        assert!(body.contains("initrd http://10.0.0.1/initrd.img"));
        assert!(body.starts_with("#!ipxe\n"));
        assert!(body.trim_end().ends_with("boot"));
    }

    #[test]
    fn omits_trailing_space_when_cmdline_is_empty() {
        let boot_config = BootConfig {
            name: "default".into(),
            kernel_path: "/vmlinuz".into(),
            initrd_path: "/initrd.img".into(),
            cmdline: String::new(),
        };
        let body = render_ipxe(&boot_config, "10.0.0.1");
        assert!(body.contains("kernel http://10.0.0.1/vmlinuz\n"));
    }
}
