//! Config command - manage the configuration file

use anyhow::Result;
use camrec_core::config::{sample_config, ConfigFile};
use clap::{Args, Subcommand};

use super::explain;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective recording configuration
    Show,

    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            let exists = if path.exists() { "exists" } else { "does not exist" };
            println!("{} ({})", path.display(), exists);
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            let file = if path.exists() {
                println!("Configuration file: {}\n", path.display());
                ConfigFile::load_from(path).map_err(explain)?
            } else {
                println!("No configuration file, using defaults.");
                println!("Create one with: camrec config init\n");
                ConfigFile::default()
            };
            let config = file.to_recording_config().map_err(explain)?;

            println!("Preset:         {}", config.preset);
            println!("Resolution:     {}x{} @ {}fps", config.width(), config.height(), config.fps());
            println!("Codec:          {}", config.codec);
            println!("Bitrate:        {} kbps", config.effective_bitrate());
            println!("I-frame every:  {}s", config.i_frame_interval);
            println!("Container:      {}", config.container);
            println!("Frame pool:     {} ({:?})", config.pool_capacity, config.pool_policy);

            for warning in config.validate() {
                println!("warning: {}", warning);
            }
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();
            if force {
                ConfigFile::default().save_to(path.clone()).map_err(explain)?;
                println!("Wrote default configuration to {}", path.display());
            } else if ConfigFile::create_default_if_missing().map_err(explain)? {
                println!("Created configuration file: {}", path.display());
            } else {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite it.");
            }
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
