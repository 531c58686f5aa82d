//! `workplace watch`: live notification feed.
//!
//! Opens the push channel and prints each notification as it arrives. While
//! the channel is down the list is refreshed over REST every poll interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use workplace_core::types::Filter;
use workplace_sync::{AlertSink, ConnectOutcome, NotificationSync, SkipReason, Snapshot};

use super::{
    home_dir, load_config, load_session, notifications::priority_label, runtime, start_sync,
    EndpointArgs,
};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Filter used for the initial list and for polling refreshes.
    #[arg(long, default_value_t = Filter::All)]
    pub filter: Filter,

    /// Polling interval while disconnected, overriding `poll_interval_secs`.
    #[arg(long, value_name = "SECONDS")]
    pub poll_secs: Option<u64>,
}

/// Prints alerts to the terminal.
struct ConsoleAlerts;

impl AlertSink for ConsoleAlerts {
    fn alert(&self, title: &str, message: &str) {
        println!("{} {}  {}", "●".blue().bold(), title.bold(), message);
    }
}

impl WatchArgs {
    pub fn run(self, endpoints: &EndpointArgs) -> Result<()> {
        let home = home_dir()?;
        let mut config = load_config(&home, endpoints)?;
        if let Some(secs) = self.poll_secs {
            config.poll_interval_secs = secs;
        }
        let poll_every = config.poll_interval().max(Duration::from_secs(1));
        let session = load_session(&home)?;

        runtime()?.block_on(async {
            let sync = start_sync(config, session, Arc::new(ConsoleAlerts))?;
            let result = follow(&sync, self.filter, poll_every).await;
            let _ = sync.shutdown().await;
            result
        })
    }
}

async fn follow(sync: &NotificationSync, filter: Filter, poll_every: Duration) -> Result<()> {
    refresh(sync, filter).await;
    print_recent(&sync.snapshot());

    match sync.connect().await.context("notification service stopped")? {
        ConnectOutcome::Skipped(reason) => {
            println!("{} {}", "push disabled:".yellow(), skip_reason(&reason));
        }
        ConnectOutcome::Started | ConnectOutcome::AlreadyActive => {}
    }

    let mut updates = sync.subscribe();
    let mut label = updates.borrow_and_update().connection.label();
    let mut unread = updates.borrow().unread_count;
    let mut poll = tokio::time::interval(poll_every);
    poll.tick().await;

    println!("{} (ctrl-c to stop)", "watching".bold());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let (next_label, next_unread) = {
                    let snapshot = updates.borrow_and_update();
                    (snapshot.connection.label(), snapshot.unread_count)
                };
                if next_label != label {
                    label = next_label;
                    println!("{} {}", "status:".bright_black(), status_colour(label));
                }
                if next_unread != unread {
                    unread = next_unread;
                    println!("{} {}", "unread:".bright_black(), unread);
                }
            }
            _ = poll.tick() => {
                if !sync.snapshot().connection.connected() {
                    tracing::debug!(%filter, "polling while push channel is down");
                    refresh(sync, filter).await;
                }
            }
        }
    }
    sync.disconnect().await.context("notification service stopped")?;
    Ok(())
}

/// Fetch failures are shown, not fatal; the last good list stays in place.
async fn refresh(sync: &NotificationSync, filter: Filter) {
    if let Err(err) = sync.fetch_notifications(filter).await {
        eprintln!("{} {err}", "refresh failed:".red());
    }
}

fn print_recent(snapshot: &Snapshot) {
    println!(
        "{} notifications, {} unread",
        snapshot.notifications.len(),
        snapshot.unread_count
    );
    for n in snapshot.notifications.iter().take(5) {
        let marker = if n.is_read { " " } else { "●" };
        println!("  {marker} [{}] {}", priority_label(n.priority), n.title);
    }
}

fn status_colour(label: &str) -> String {
    match label {
        "Connected" => label.green().to_string(),
        "Connecting" => label.yellow().to_string(),
        _ => label.red().to_string(),
    }
}

fn skip_reason(reason: &SkipReason) -> String {
    match reason {
        SkipReason::MissingToken => "no access token in the session".to_string(),
        SkipReason::LocalEndpointInProduction => {
            "push server points at this machine in a production build".to_string()
        }
        SkipReason::InvalidEndpoint(detail) => detail.clone(),
    }
}
