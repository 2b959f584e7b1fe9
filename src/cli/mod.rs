//! Command-line interface for docingest.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Load documents into PostgreSQL/pgvector, optionally through an SSH tunnel.
#[derive(Debug, Parser)]
#[command(name = "docingest")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        default_value = "text",
        help = "Output format: text or json"
    )]
    pub format: OutputFormat,

    #[arg(long, short = 'v', global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        env = "DOCINGEST_CONFIG_DIR",
        default_value = ".",
        help = "Directory holding the .env.<environment> files"
    )]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Inspect resolved configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),

    /// Create the vector database and enable the pgvector extension
    Bootstrap,

    /// Load, split, embed and store documents
    Ingest(commands::IngestArgs),

    /// Check tunnel, database and collection state without changing anything
    Status,
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
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from([
            "docingest",
            "--format",
            "json",
            "ingest",
            "docs",
            "reports/q3.pdf",
            "--chunk-size",
            "500",
            "--chunk-overlap",
            "50",
            "--no-bootstrap",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.paths.len(), 2);
        assert_eq!(args.chunk_size, 500);
        assert_eq!(args.chunk_overlap, 50);
        assert!(args.no_bootstrap);
        assert!(!args.pre_delete);
    }

    #[test]
    fn test_ingest_requires_paths() {
        assert!(Cli::try_parse_from(["docingest", "ingest"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["docingest", "status", "-v", "--config-dir", "/etc/docingest"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config_dir, PathBuf::from("/etc/docingest"));
    }
}
