//! Ingest command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::load_settings;
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::pipeline::{self, DEFAULT_UPLOAD_BATCH, IngestOptions};
use crate::services::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Drop the existing collection before storing (destructive)
    #[arg(long)]
    pub pre_delete: bool,

    /// Skip database and extension creation
    #[arg(long)]
    pub no_bootstrap: bool,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Chunks stored per transaction
    #[arg(long, default_value_t = DEFAULT_UPLOAD_BATCH)]
    pub batch_size: usize,

    /// Load and split only; print what would be stored
    #[arg(long)]
    pub dry_run: bool,
}

impl IngestArgs {
    fn options(&self) -> IngestOptions {
        IngestOptions {
            paths: self.paths.clone(),
            bootstrap: !self.no_bootstrap,
            pre_delete_collection: self.pre_delete,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            upload_batch: self.batch_size,
        }
    }
}

pub async fn handle_ingest(
    args: IngestArgs,
    config_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let options = args.options();

    if args.dry_run {
        let prepared = pipeline::prepare(&options).context("failed to prepare documents")?;
        print!("{}", formatter.format_prepared(&prepared));
        return Ok(());
    }

    let settings = load_settings(config_dir)?;

    let progress = match format {
        OutputFormat::Text => {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})",
                    )
                    .context("invalid progress template")?
                    .progress_chars("#>-"),
            );
            pb
        }
        OutputFormat::Json => ProgressBar::hidden(),
    };

    let report = pipeline::ingest(&settings, &options, &progress)
        .await
        .context("ingestion failed")?;

    print!("{}", formatter.format_ingest(&report));
    Ok(())
}
