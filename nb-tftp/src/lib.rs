pub mod packet;
pub mod server;
pub mod transfer;

pub use server::{run_tftp_server, TftpServerConfig, DEFAULT_MAX_CONCURRENT_TRANSFERS};
