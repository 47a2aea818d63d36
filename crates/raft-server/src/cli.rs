use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use raft_core::{NodeId, RaftConfig};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Run a raft consensus node", long_about = None)]
pub struct Cli {
    /// Identifier of this node within the cluster.
    #[arg(long)]
    pub id: NodeId,

    /// Socket address to accept rpcs on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Directory for durable term, vote and log. State is kept in memory when omitted.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Lower bound of the randomized election timeout, in milliseconds.
    #[arg(long, default_value_t = 150)]
    pub election_timeout_min: u64,

    /// Upper bound of the randomized election timeout, in milliseconds.
    #[arg(long, default_value_t = 300)]
    pub election_timeout_max: u64,

    /// Pause between log applier polls, in milliseconds.
    #[arg(long, default_value_t = 100)]
    pub apply_interval: u64,
}

impl Cli {
    pub fn raft_config(&self) -> RaftConfig {
        RaftConfig {
            election_timeout_min: self.election_timeout_min,
            election_timeout_max: self.election_timeout_max,
            apply_interval: self.apply_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_raft_config() {
        let cli = Cli::parse_from(["raft-node", "--id", "3"]);
        assert_eq!(cli.id, 3);
        assert_eq!(cli.listen, "127.0.0.1:8080".parse().unwrap());
        assert!(cli.data_dir.is_none());
        assert_eq!(cli.raft_config(), RaftConfig::default());
    }

    #[test]
    fn id_is_required() {
        assert!(Cli::try_parse_from(["raft-node"]).is_err());
    }
}
