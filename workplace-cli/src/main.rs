//! Workplace: notification client for the HR management portal.
//!
//! # Usage
//!
//! ```text
//! workplace login --user-id <id> --role staff|hr|admin --token <token>
//! workplace logout
//! workplace whoami
//! workplace notifications [--filter all|today|last3days|last7days] [--json]
//! workplace read <id>
//! workplace delete <id>
//! workplace watch [--filter ...] [--poll-secs <n>]
//! workplace config show|init [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    account::LoginArgs,
    config::ConfigCommand,
    notifications::{DeleteArgs, ListArgs, ReadArgs},
    watch::WatchArgs,
    EndpointArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "workplace",
    version,
    about = "Follow and manage your workplace notifications",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    endpoints: EndpointArgs,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the session issued by the portal's sign-in.
    Login(LoginArgs),

    /// Forget the stored session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// Fetch and list notifications.
    #[command(alias = "ls")]
    Notifications(ListArgs),

    /// Mark a notification as read.
    Read(ReadArgs),

    /// Delete one of your personal notifications.
    Delete(DeleteArgs),

    /// Follow notifications live, polling while the push channel is down.
    Watch(WatchArgs),

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Watch(_) => "info",
        _ => "warn",
    };
    init_tracing(default_level, cli.json_logs);

    match cli.command {
        Commands::Login(args) => args.run(),
        Commands::Logout => commands::account::logout(),
        Commands::Whoami => commands::account::whoami(),
        Commands::Notifications(args) => args.run(&cli.endpoints),
        Commands::Read(args) => args.run(&cli.endpoints),
        Commands::Delete(args) => args.run(&cli.endpoints),
        Commands::Watch(args) => args.run(&cli.endpoints),
        Commands::Config { command } => commands::config::run(command, &cli.endpoints),
    }
}

/// Logs go to stderr so `--json` output stays clean. `RUST_LOG` overrides
/// `default_level`.
fn init_tracing(default_level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
