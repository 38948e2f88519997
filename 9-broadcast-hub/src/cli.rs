use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, builder::RangedU64ValueParser};

use crate::config::{
    DEFAULT_EVICTION_THRESHOLD, DEFAULT_INTAKE_CAPACITY, DEFAULT_MAILBOX_CAPACITY,
    DEFAULT_WRITE_TIMEOUT_SECS,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the hub, relaying every received line to all connected clients.
    Serve(ServeArgs),
    /// Connect to a hub and exchange lines over stdin/stdout.
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the hub should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,

    /// Outbound lines queued per client before deliveries to it are dropped.
    #[arg(
        long,
        default_value_t = DEFAULT_MAILBOX_CAPACITY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub mailbox_capacity: usize,

    /// Consecutive dropped deliveries tolerated before a client is evicted.
    #[arg(long, default_value_t = DEFAULT_EVICTION_THRESHOLD)]
    pub eviction_threshold: u32,

    /// Inbound events buffered ahead of the hub loop.
    #[arg(
        long,
        default_value_t = DEFAULT_INTAKE_CAPACITY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub intake_capacity: usize,

    /// Refuse new clients once this many are connected.
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Disconnect clients that send nothing for this many seconds.
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Disconnect clients that take longer than this many seconds to accept one line.
    #[arg(
        long,
        default_value_t = DEFAULT_WRITE_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub write_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Address of the hub to connect to.
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub server: SocketAddr,
}
