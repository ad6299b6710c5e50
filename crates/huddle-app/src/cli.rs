use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Huddle: small peer-to-peer voice rooms with vote-to-eject.
#[derive(Parser, Debug)]
#[command(name = "huddle", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an in-process room with simulated participants.
    Simulate(SimulateArgs),
    /// Print the effective configuration as JSON.
    Config,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of participants that try to join.
    #[arg(short, long, default_value_t = 4)]
    pub members: usize,

    /// Room key to join.
    #[arg(short, long, default_value = "lobby")]
    pub room: String,

    /// Ballots cast against the second participant.
    #[arg(long)]
    pub eject_votes: Option<usize>,

    /// Vote length for the simulated vote, in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub vote_duration_ms: u64,
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_flags() {
        let args = Args::try_parse_from([
            "huddle",
            "--log-level",
            "debug",
            "simulate",
            "--members",
            "5",
            "--room",
            "den",
            "--eject-votes",
            "3",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        match args.command {
            Command::Simulate(sim) => {
                assert_eq!(sim.members, 5);
                assert_eq!(sim.room, "den");
                assert_eq!(sim.eject_votes, Some(3));
                assert_eq!(sim.vote_duration_ms, 2_000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn config_is_global() {
        let args = Args::try_parse_from(["huddle", "config", "--config", "/tmp/h.toml"]).unwrap();
        assert!(matches!(args.command, Command::Config));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/h.toml")));
    }
}
