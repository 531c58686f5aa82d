//! `workplace login|logout|whoami`: the stored session.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use workplace_core::{session, types::Role, Session};

use super::{home_dir, load_session};

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub user_id: String,

    /// staff, hr or admin (aliases such as "Human Resources" are accepted).
    #[arg(long)]
    pub role: Role,

    /// Access token issued by the portal.
    #[arg(long, env = "WORKPLACE_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl LoginArgs {
    pub fn run(self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            bail!("user id must not be empty");
        }
        if self.token.trim().is_empty() {
            bail!("access token must not be empty");
        }
        let home = home_dir()?;
        let session = Session::new(self.user_id.trim(), self.role, self.token.trim());
        session::save_at(&home, &session).context("failed to store session")?;
        println!(
            "signed in as {} ({})",
            session.user_id.to_string().bold(),
            session.role
        );
        Ok(())
    }
}

pub fn logout() -> Result<()> {
    let home = home_dir()?;
    if session::clear_at(&home).context("failed to remove session")? {
        println!("signed out");
    } else {
        println!("not signed in");
    }
    Ok(())
}

pub fn whoami() -> Result<()> {
    let home = home_dir()?;
    let session = load_session(&home)?;
    println!("user:      {}", session.user_id.to_string().bold());
    println!("role:      {}", session.role);
    println!("signed in: {}", session.signed_in_at.to_rfc3339());
    Ok(())
}
