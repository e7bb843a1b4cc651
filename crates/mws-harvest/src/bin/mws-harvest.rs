//! Harvester command line
//!
//! Run with: cargo run -p mws-harvest -- tree <ROOT>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mws_harvest::processing::UriMapper;
use mws_harvest::{
    write_harvest, DirectoryHarvester, HarvestConfig, Job, JobRunner, LocalFs,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "mws-harvest",
    version,
    about = "Generate MathWebSearch harvests from LaTeXML XHTML documents"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory receiving tree harvests
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Prefix for fragment URIs
    #[arg(long, global = true)]
    base_uri: Option<String>,

    /// Extension of harvested documents; may be repeated
    #[arg(long = "extension", global = true)]
    extensions: Vec<String>,

    /// Maximum number of documents extracted at once
    #[arg(long, global = true)]
    max_jobs: Option<usize>,

    /// Indentation width of the written XML
    #[arg(long, global = true)]
    indent: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest a directory tree, one harvest file per directory
    Tree {
        /// Root of the tree
        root: PathBuf,
    },
    /// Harvest the given documents into a single harvest
    Files {
        /// Documents to harvest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the harvest here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => HarvestConfig::default(),
        };

        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(base) = &self.base_uri {
            config.input.base_uri = Some(base.clone());
        }
        if !self.extensions.is_empty() {
            config.input.extensions = self.extensions.clone();
        }
        if let Some(max) = self.max_jobs {
            config.processing.max_concurrent_jobs = Some(max);
        }
        if let Some(indent) = self.indent {
            config.output.indent = indent;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Tree { root } => harvest_tree(&config, root).await,
        Command::Files { files, output } => harvest_files(&config, files, output).await,
    }
}

async fn harvest_tree(config: &HarvestConfig, root: PathBuf) -> Result<()> {
    anyhow::ensure!(root.is_dir(), "{} is not a directory", root.display());

    let fs = LocalFs::new(root);
    let sink = config.output.file_sink();
    tracing::info!("Harvesting {}", fs.root().display());
    tracing::info!("  - Output directory: {}", sink.directory().display());
    tracing::info!("  - Extensions: {}", config.input.extensions.join(", "));
    match config.processing.max_concurrent_jobs {
        Some(max) => tracing::info!("  - Concurrent jobs: {}", max),
        None => tracing::info!("  - Concurrent jobs: unbounded"),
    }

    let filter = config.input.filter();
    let mapper = config.input.uri_mapper();
    let harvester = DirectoryHarvester::new(Arc::new(fs), Arc::new(sink))
        .with_filter(move |path| filter.accepts(path))
        .with_uri_mapper(move |path| mapper.map(path))
        .with_runner(config.processing.runner());

    let summary = harvester.harvest().await;
    println!("{}", summary);
    Ok(())
}

async fn harvest_files(
    config: &HarvestConfig,
    files: Vec<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let fs = Arc::new(LocalFs::new(PathBuf::new()));
    let mapper: UriMapper = config.input.uri_mapper();

    let jobs = files
        .into_iter()
        .map(|path| {
            let uri = mapper.map(&path);
            Job::from_file(fs.clone(), path, uri)
        })
        .collect();

    let batch = JobRunner::with_limit(config.processing.max_concurrent_jobs)
        .run_all(jobs)
        .await;
    if batch.failed > 0 {
        tracing::warn!("Skipped {} document(s) that failed to harvest", batch.failed);
    }

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            write_harvest(&batch.harvest, &mut writer, config.output.indent)?;
            writer.flush()?;
            tracing::info!("Wrote {} fragment(s) to {}", batch.harvest.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            write_harvest(&batch.harvest, &mut stdout, config.output.indent)?;
            writeln!(stdout)?;
        }
    }

    Ok(())
}
