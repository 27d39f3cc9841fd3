/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::time::Duration;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "cm-monitor")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive terminal dashboard (default)
    Dashboard,

    /// Start the HTTP API and WebSocket server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },

    /// Print container metrics
    Stats {
        /// Container id or name; all running containers when omitted
        container: Option<String>,

        /// Keep printing until interrupted
        #[arg(short, long)]
        watch: bool,

        /// Sampling interval (e.g. 2s, 500ms)
        #[arg(short, long, value_parser = parse_duration, default_value = "2s")]
        interval: Duration,

        /// Output JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Profile a container and recommend resource limits
    Profile {
        /// Container id or name
        container: String,

        /// Session length (defaults to the configured duration)
        #[arg(short, long, value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Sampling interval (defaults to the configured interval)
        #[arg(short, long, value_parser = parse_duration)]
        interval: Option<Duration>,

        /// Output the recommendation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate an API token and store it in the config file
    Token {
        /// Owner the token resolves to
        #[arg(short, long, default_value = "admin")]
        owner: String,
    },
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(raw).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_dashboard() {
        let cli = Cli::try_parse_from(["cm-monitor"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_stats_arguments() {
        let cli = Cli::try_parse_from(["cm-monitor", "stats", "web", "--watch", "--interval", "500ms"]).unwrap();
        match cli.command {
            Some(Commands::Stats {
                container,
                watch,
                interval,
                json,
            }) => {
                assert_eq!(container.as_deref(), Some("web"));
                assert!(watch);
                assert!(!json);
                assert_eq!(interval, Duration::from_millis(500));
            }
            _ => panic!("expected stats"),
        }
    }

    #[test]
    fn test_profile_rejects_zero_duration() {
        assert!(Cli::try_parse_from(["cm-monitor", "profile", "web", "--duration", "0s"]).is_err());
        assert!(Cli::try_parse_from(["cm-monitor", "profile", "web", "--duration", "2m"]).is_ok());
    }
}
