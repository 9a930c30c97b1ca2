pub mod client;
pub mod exec;
pub mod fanout;
pub mod transfer;

pub use exec::execute;
pub use fanout::{run_fanout, run_fanout_bounded, HostCommandResult, DEFAULT_CONCURRENCY};
pub use transfer::{download_file, upload_file};
