use std::{
    net::{Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    path::Path,
};

use clap::Parser;

use crate::registry::DEFAULT_CAPACITY;

/// Serve a line-oriented stream to every client connected over TCP.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The TCP port to listen on. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = 1234)]
    pub port: u16,

    /// Emit timestamped diagnostic logs.
    #[arg(long)]
    pub debug: bool,

    /// The file to read from. Defaults to stdin.
    #[arg(long = "fn", value_name = "PATH", default_value = "")]
    pub input: String,

    /// Lines buffered per client before new lines are dropped for it.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: NonZeroUsize,
}

impl Cli {
    /// Input path, treating an empty `--fn` the same as no `--fn`.
    pub fn input_path(&self) -> Option<&Path> {
        (!self.input.is_empty()).then(|| Path::new(&self.input))
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}
