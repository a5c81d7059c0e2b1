use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::server::{DEFAULT_MAX_BACKLOG, ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a headless emulator over the network access protocol.
    Serve(ServeArgs),
    /// Send one command to a running server and print the reply.
    Query(QueryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:48879")]
    pub listen: SocketAddr,

    /// Milliseconds to sleep between accept/poll passes.
    #[arg(long, default_value_t = 1)]
    pub poll_interval_ms: u64,

    /// Per-client receive buffer in bytes; bounds the largest accepted frame.
    #[arg(long, default_value_t = 1_500_000)]
    pub buffer_capacity: usize,

    /// Unsent reply bytes a client may accumulate before it is dropped.
    #[arg(long, default_value_t = DEFAULT_MAX_BACKLOG)]
    pub max_backlog: usize,

    /// Cartridge image to load into CARTROM.
    #[arg(long)]
    pub rom: Option<PathBuf>,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.listen,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            buffer_capacity: self.buffer_capacity,
            max_backlog: self.max_backlog,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Address of the server to query.
    #[arg(long, default_value = "127.0.0.1:48879")]
    pub server: SocketAddr,

    /// Hex bytes sent as a binary frame right after the command (for bCORE_WRITE).
    #[arg(long)]
    pub payload: Option<String>,

    /// Command line to send, e.g. `core_read WRAM;$10;16`.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}
