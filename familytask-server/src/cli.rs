use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options can also be provided via environment variables:
  CONFIG_PATH        (default: ./config.yaml)
  DB_PATH            (default: data/app.db)
  PORT               (default: 5151 or config.listen_port)
  JWT_SECRET, SERVICE_ROLE_KEY, PAYMENT_SECRET_KEY override the config file.

Maintenance commands work directly on the database at DB_PATH and do not
need the server to be running.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "familytask-server",
    version,
    about = "FamilyTask server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Report data inconsistencies (dangling family links, over-full families, stale sessions)
    Doctor {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fix what `doctor` reports, except families above the parent cap
    Repair {
        /// Count changes without writing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Insert a notification for one user
    Notify {
        /// Recipient profile id
        #[arg(long)]
        user: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
        /// Notification type, e.g. system or task_approved
        #[arg(long, default_value = "system")]
        kind: String,
        /// Family id stored with the notification (defaults to the user's family)
        #[arg(long)]
        family: Option<String>,
    },
    /// Extend or revoke a family's premium subscription
    GrantPremium {
        #[arg(long)]
        family: String,
        /// Days from now; 0 revokes
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}
