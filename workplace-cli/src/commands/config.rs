//! `workplace config`: inspect or create `~/.workplace/config.yaml`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use workplace_core::{config as config_store, paths::config_path, Config};

use super::{home_dir, load_config, EndpointArgs};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as YAML.
    Show,
    /// Write a config file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run(command: ConfigCommand, endpoints: &EndpointArgs) -> Result<()> {
    let home = home_dir()?;
    match command {
        ConfigCommand::Show => {
            let config = load_config(&home, endpoints)?;
            print!("{}", config.to_yaml().context("failed to render configuration")?);
        }
        ConfigCommand::Init { force } => {
            let path = config_path(&home);
            if path.exists() && !force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                );
            }
            config_store::save_at(&home, &Config::default())
                .context("failed to write configuration")?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
