//! `workplace notifications|read|delete`: one-shot REST operations.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use workplace_core::types::{Filter, Notification, Priority, UserId};
use workplace_sync::{Snapshot, TracingAlerts};

use super::{format_age, home_dir, load_config, load_session, runtime, start_sync, EndpointArgs};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// all, today, last3days or last7days.
    #[arg(long, default_value_t = Filter::All)]
    pub filter: Filter,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: String,
}

impl ListArgs {
    pub fn run(self, endpoints: &EndpointArgs) -> Result<()> {
        let home = home_dir()?;
        let config = load_config(&home, endpoints)?;
        let session = load_session(&home)?;
        let user = session.user_id.clone();

        let snapshot = runtime()?.block_on(async {
            let sync = start_sync(config, session, Arc::new(TracingAlerts))?;
            let fetched = sync
                .fetch_notifications(self.filter)
                .await
                .context("failed to fetch notifications");
            let snapshot = sync.snapshot();
            let _ = sync.shutdown().await;
            fetched.map(|_| snapshot)
        })?;

        if self.json {
            print_json(self.filter, &snapshot)?;
        } else {
            print_table(self.filter, &snapshot, &user);
        }
        Ok(())
    }
}

impl ReadArgs {
    pub fn run(self, endpoints: &EndpointArgs) -> Result<()> {
        let home = home_dir()?;
        let config = load_config(&home, endpoints)?;
        let session = load_session(&home)?;

        runtime()?.block_on(async {
            let sync = start_sync(config, session, Arc::new(TracingAlerts))?;
            let result = sync
                .mark_as_read(self.id.as_str())
                .await
                .with_context(|| format!("failed to mark '{}' as read", self.id));
            let _ = sync.shutdown().await;
            result
        })?;
        println!("marked {} as read", self.id);
        Ok(())
    }
}

impl DeleteArgs {
    pub fn run(self, endpoints: &EndpointArgs) -> Result<()> {
        let home = home_dir()?;
        let config = load_config(&home, endpoints)?;
        let session = load_session(&home)?;

        runtime()?.block_on(async {
            let sync = start_sync(config, session, Arc::new(TracingAlerts))?;
            let result = delete_personal(&sync, &self.id).await;
            let _ = sync.shutdown().await;
            result
        })?;
        println!("deleted {}", self.id);
        Ok(())
    }
}

/// Only personal notifications may be deleted; broadcasts are refused before
/// any delete request goes out.
async fn delete_personal(sync: &workplace_sync::NotificationSync, id: &str) -> Result<()> {
    sync.fetch_notifications(Filter::All)
        .await
        .context("failed to fetch notifications")?;
    let snapshot = sync.snapshot();
    let Some(notification) = snapshot.notifications.iter().find(|n| n.id.0 == id) else {
        bail!("notification '{id}' not found");
    };
    if !sync.can_delete(notification) {
        bail!("notification '{id}' was not sent to you personally and cannot be deleted");
    }
    sync.delete_notification(id)
        .await
        .with_context(|| format!("failed to delete '{id}'"))
}

#[derive(Serialize)]
struct ListJson<'a> {
    filter: Filter,
    total: usize,
    unread: usize,
    notifications: &'a [Notification],
}

#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "")]
    marker: String,
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "priority")]
    priority: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "received")]
    received: String,
    #[tabled(rename = "scope")]
    scope: &'static str,
}

fn print_json(filter: Filter, snapshot: &Snapshot) -> Result<()> {
    let payload = ListJson {
        filter,
        total: snapshot.notifications.len(),
        unread: snapshot.unread_count,
        notifications: &snapshot.notifications,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize notifications")?
    );
    Ok(())
}

fn print_table(filter: Filter, snapshot: &Snapshot, user: &UserId) {
    println!(
        "{} notifications | {} unread | filter: {}",
        snapshot.notifications.len(),
        snapshot.unread_count,
        filter,
    );
    if snapshot.notifications.is_empty() {
        println!("Nothing to show.");
        return;
    }

    let rows: Vec<NotificationRow> = snapshot
        .notifications
        .iter()
        .map(|n| NotificationRow {
            marker: if n.is_read {
                " ".to_string()
            } else {
                "●".blue().bold().to_string()
            },
            id: n.id.to_string(),
            priority: priority_label(n.priority),
            title: n.title.clone(),
            received: format_age(n.created_at),
            scope: if n.is_personal_to(user) {
                "personal"
            } else {
                "broadcast"
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

pub(crate) fn priority_label(priority: Priority) -> String {
    match priority {
        Priority::Urgent => "URGENT".red().bold().to_string(),
        Priority::High => "high".yellow().to_string(),
        Priority::Medium => "medium".normal().to_string(),
        Priority::Low => "low".bright_black().to_string(),
    }
}
