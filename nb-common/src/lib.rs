pub mod config;
pub mod error;
pub mod service_registry;
pub mod state;

pub use config::{
    parse_and_validate, parse_server_config, parse_tolerant, BootConfig, DeploymentEntry, DeploymentMap, DhcpPool, ServerConfig,
};
pub use error::{ConfigError, ConfigParseError, ConfigValidationError};
pub use state::{ConfigStore, HostSshConfig, SshAuth};
