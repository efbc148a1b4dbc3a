//! Tabload common library
//!
//! Pieces shared by every tabload binary. Today that is the logging setup in
//! [`logging`], which the CLI installs before it starts any load or script run.
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
