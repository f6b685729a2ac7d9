//! Server configuration.
//!
//! Every option can be given on the command line or through the
//! environment; flags take precedence.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Settings for the `range-media-server` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "range-media-server")]
#[command(about = "Serve audio and cover files with HTTP range support")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "RANGE_MEDIA_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory that media identifiers are resolved against
    #[arg(long, env = "RANGE_MEDIA_ROOT")]
    pub media_root: PathBuf,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long = "log", env = "RANGE_MEDIA_LOG", default_value = "info")]
    pub log_filter: String,
}
