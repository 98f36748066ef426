use crate::demo::{run_reroute, run_snapshot, RerouteArgs, SnapshotArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use spot_traffic::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Spot Traffic",
    about = "Serve and inspect congestion scores for monitored tourist spots",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service with background monitoring (default command)
    Serve(ServeArgs),
    /// Print the current congestion table for the seeded spots
    Snapshot(SnapshotArgs),
    /// Check whether a destination should be rerouted and where to
    Reroute(RerouteArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Snapshot(args) => run_snapshot(args),
        Command::Reroute(args) => run_reroute(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["spot-traffic"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn reroute_accepts_an_origin_and_pinned_time() {
        let cli = Cli::try_parse_from([
            "spot-traffic",
            "reroute",
            "Hyeopjae Beach",
            "--lat",
            "33.45",
            "--lng",
            "126.30",
            "--at",
            "2025-05-03T14:00:00+09:00",
        ])
        .expect("parses");

        match cli.command {
            Some(Command::Reroute(args)) => {
                assert_eq!(args.destination, "Hyeopjae Beach");
                assert_eq!(args.lat, Some(33.45));
                assert!(args.at.is_some());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn reroute_requires_lat_and_lng_together() {
        let result = Cli::try_parse_from(["spot-traffic", "reroute", "iho", "--lat", "33.4"]);
        assert!(result.is_err());
    }
}
