//! Logger initialization over the `log` facade.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging};
