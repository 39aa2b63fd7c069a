use clap::{Args, Parser, Subcommand};
use pier_core::MatchPolicy;
use std::net::IpAddr;

use crate::config::{parse_origins, Config};

#[derive(Parser, Debug)]
#[command(name = "pier")]
#[command(about = "Pier signaling server and probe client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the signaling server (default when no command is given)
    Serve(ServeArgs),

    /// Join a running server as a participant and negotiate with whoever it
    /// gets matched with
    Probe {
        /// Signaling endpoint
        #[arg(short, long, default_value = "ws://localhost:5001/ws")]
        url: String,

        /// Display name to join with
        #[arg(short, long, default_value = "probe")]
        name: String,

        /// Give up after this many seconds without a connected link
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,

        /// Synthetic candidates to send after each local description
        #[arg(long, default_value_t = 2)]
        candidates: usize,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Address to bind (overrides PIER_BIND_ADDR)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Port to listen on (overrides PIER_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Matching policy: pairwise or room (overrides PIER_MATCH_POLICY)
    #[arg(long)]
    pub policy: Option<MatchPolicy>,

    /// Allowed cross-origin caller; repeat or comma-separate for several
    #[arg(long = "allow-origin")]
    pub allow_origin: Vec<String>,

    /// Put a pairwise participant back in the queue when its partner leaves
    #[arg(long)]
    pub requeue_orphans: bool,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        if !self.allow_origin.is_empty() {
            config.allowed_origins = self
                .allow_origin
                .iter()
                .flat_map(|raw| parse_origins(raw))
                .collect();
        }
        if self.requeue_orphans {
            config.requeue_orphans = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_flags_override_config() {
        let cli = Cli::parse_from([
            "pier",
            "serve",
            "--port",
            "6000",
            "--policy",
            "room",
            "--allow-origin",
            "https://a.example,https://b.example",
            "--allow-origin",
            "https://c.example",
            "--requeue-orphans",
        ]);
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve command");
        };
        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.port, 6000);
        assert_eq!(config.policy, MatchPolicy::Room);
        assert!(config.requeue_orphans);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn no_command_means_default_server() {
        let cli = Cli::parse_from(["pier"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn rejects_unknown_policy_flag() {
        assert!(Cli::try_parse_from(["pier", "serve", "--policy", "mesh"]).is_err());
    }

    #[test]
    fn probe_defaults() {
        let cli = Cli::parse_from(["pier", "probe", "--name", "alice"]);
        match cli.command {
            Some(Commands::Probe {
                url,
                name,
                timeout_secs,
                candidates,
            }) => {
                assert_eq!(url, "ws://localhost:5001/ws");
                assert_eq!(name, "alice");
                assert_eq!(timeout_secs, 30);
                assert_eq!(candidates, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
