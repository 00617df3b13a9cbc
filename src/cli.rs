//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "siteherd",
    version,
    about = "Lifecycle supervisor for local website dev servers"
)]
pub struct Cli {
    /// Path to the config file (defaults to ./siteherd.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the configured sites and run until interrupted
    Serve {
        /// Serve only the named sites (default: all configured sites)
        #[arg(value_name = "SITE")]
        sites: Vec<String>,

        /// Print the post-startup server snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the config file and every site root, then exit
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_site_names() {
        let cli = Cli::parse_from(["siteherd", "serve", "blog", "docs", "--json"]);
        match cli.command {
            Commands::Serve { sites, json } => {
                assert_eq!(sites, vec!["blog", "docs"]);
                assert!(json);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["siteherd", "validate", "--config", "/tmp/s.yaml"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/s.yaml")));
    }
}
