//! Command-line interface definition.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use wsconnect_google::FeedKind;

/// wsconnect - Google Workspace activity feeds
#[derive(Debug, Parser)]
#[command(name = "wsconnect")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "WSCONNECT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, env = "WSCONNECT_LOG_FORMAT")]
    pub log_format: Option<String>,

    // --- Connection overrides ---
    /// Workspace customer id
    #[arg(long, env = "WSCONNECT_CUSTOMER_ID")]
    pub customer_id: Option<String>,

    /// Primary domain of the tenant
    #[arg(long, env = "WSCONNECT_DOMAIN")]
    pub domain: Option<String>,

    /// Admin the service account impersonates
    #[arg(long, env = "WSCONNECT_ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    /// Path to the service account key file
    #[arg(long, env = "WSCONNECT_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll an activity feed and print the events as JSON
    Poll(PollArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Args)]
pub struct PollArgs {
    /// Which activity log to read
    #[arg(long, value_enum, default_value_t = FeedArg::Admin)]
    pub feed: FeedArg,

    /// Cursor returned by the previous poll
    #[arg(long, default_value = "")]
    pub cursor: String,

    /// Activities per page (0 uses the configured default)
    #[arg(long, default_value_t = 0)]
    pub page_size: u32,

    /// Start of the first window (RFC3339), when no cursor is given
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,

    /// Keep polling until the current window is exhausted
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedArg {
    Admin,
    Usage,
}

impl From<FeedArg> for FeedKind {
    fn from(arg: FeedArg) -> Self {
        match arg {
            FeedArg::Admin => FeedKind::Admin,
            FeedArg::Usage => FeedKind::Usage,
        }
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Dump,
    /// Validate the configuration and the service account key
    Validate,
    /// Show the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_poll() {
        let cli = Cli::parse_from([
            "wsconnect",
            "poll",
            "--feed",
            "usage",
            "--page-size",
            "50",
            "--start",
            "2024-03-15T10:00:00Z",
            "--all",
        ]);
        match cli.command {
            Command::Poll(args) => {
                assert_eq!(FeedKind::from(args.feed), FeedKind::Usage);
                assert_eq!(args.page_size, 50);
                assert_eq!(args.cursor, "");
                assert!(args.all);
                assert_eq!(args.start.map(|s| s.timestamp()), Some(1_710_496_800));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn poll_defaults_to_admin_feed() {
        let cli = Cli::parse_from(["wsconnect", "poll"]);
        match cli.command {
            Command::Poll(args) => assert_eq!(args.feed, FeedArg::Admin),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
