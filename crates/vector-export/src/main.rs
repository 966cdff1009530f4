//! Vector Export CLI
//!
//! Exports vector records from Pinecone, Weaviate and Qdrant into a local
//! `SQLite` database and one Parquet file per collection.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vector_export::config::{
    ExportConfig, ExportJob, PineconeConfig, QdrantConfig, SourceConfig, WeaviateConfig,
    ALL_COLLECTIONS, DEFAULT_MODEL_NAME,
};
use vector_export::wizard::{parse_yes_no, DialoguerPrompter, ExportUI, Wizard};
use vector_export::Exporter;

#[derive(Parser)]
#[command(name = "vector-export")]
#[command(version)]
#[command(
    about = "Export data from Pinecone, Weaviate and Qdrant to sqlite database and parquet file",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Name of the model used to produce the vectors
    #[arg(short, long, global = true)]
    model_name: Option<String>,

    /// Configuration file path (YAML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory receiving the database and the Parquet files
    #[arg(short, long, value_name = "DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// SQLite database file name inside the output directory
    #[arg(long, global = true)]
    database: Option<String>,

    /// Rows written per SQLite transaction
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Records requested per page from the backend
    #[arg(long, global = true)]
    page_size: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide progress bars and the summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export data from Pinecone
    Pinecone {
        /// Environment of Pinecone instance
        #[arg(short, long)]
        environment: Option<String>,

        /// Name of index to export, or "all"
        #[arg(short, long)]
        index: Option<String>,

        /// Namespace to export from a single index
        #[arg(long)]
        namespace: Option<String>,

        /// Control plane URL override
        #[arg(long)]
        controller_url: Option<String>,
    },

    /// Export data from Weaviate
    Weaviate {
        /// Location of Weaviate instance
        #[arg(short, long)]
        url: Option<String>,

        /// Name of class to export, or "all"
        #[arg(short, long)]
        class_name: Option<String>,

        /// Include cross references, set Y or N
        #[arg(short = 'i', long = "include-crossrefs", value_name = "Y|N")]
        include_crossrefs: Option<String>,
    },

    /// Export data from Qdrant
    Qdrant {
        /// Location of Qdrant instance
        #[arg(short, long)]
        url: Option<String>,

        /// Name of collection to export, or "all"
        #[arg(short, long)]
        collection: Option<String>,

        /// Named dense vector to export
        #[arg(long)]
        vector_name: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ui = ExportUI::new();
    let quiet = cli.quiet;
    if cli.command.is_none() && !quiet {
        ui.print_header();
    }

    let job = build_job(cli)?;
    info!(
        "Exporting '{}' from {} into {}",
        job.source.selector(),
        job.source.backend(),
        job.output.dir.display()
    );

    let output_dir = job.output.dir.clone();
    let mut exporter = Exporter::new(job)?;
    let result = exporter.run().await;
    drop(exporter);

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            ui.print_error(&e.to_string());
            if e.is_persistence() {
                ui.print_error(&format!(
                    "collections finalized before the failure remain in {}",
                    output_dir.display()
                ));
            }
            std::process::exit(1);
        }
    };

    if !quiet {
        ui.print_summary(&report);
    }
    ui.print_completed();
    Ok(())
}

/// Assembles the job: flags over the config file over defaults, then the
/// wizard fills whatever is still missing.
fn build_job(cli: Cli) -> anyhow::Result<ExportJob> {
    let file = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ExportConfig::from_file(path)?
        }
        None => ExportConfig::default(),
    };

    let mut output = file.output;
    if let Some(dir) = cli.output_dir {
        output.dir = dir;
    }
    if let Some(database) = cli.database {
        output.database = database;
    }
    if let Some(batch_size) = cli.batch_size {
        output.batch_size = batch_size;
    }
    if let Some(page_size) = cli.page_size {
        output.page_size = page_size;
    }

    let model_name = cli
        .model_name
        .or(file.model_name)
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

    let partial = merge_source(cli.command, file.source);
    let source = Wizard::new(DialoguerPrompter::new()).resolve_source(partial)?;

    Ok(ExportJob {
        source,
        model_name,
        output,
        show_progress: !cli.quiet,
    })
}

/// Overlays subcommand flags on the source from the config file.
///
/// A file source of another backend than the subcommand is ignored.
fn merge_source(command: Option<Commands>, file: Option<SourceConfig>) -> Option<SourceConfig> {
    let Some(command) = command else {
        return file;
    };

    let source = match command {
        Commands::Pinecone {
            environment,
            index,
            namespace,
            controller_url,
        } => {
            let mut cfg = match file {
                Some(SourceConfig::Pinecone(cfg)) => cfg,
                other => {
                    warn_mismatch(other.as_ref(), "pinecone");
                    PineconeConfig {
                        index: ALL_COLLECTIONS.to_string(),
                        ..Default::default()
                    }
                }
            };
            if let Some(environment) = environment {
                cfg.environment = environment;
            }
            if let Some(index) = index {
                cfg.index = index;
            }
            if namespace.is_some() {
                cfg.namespace = namespace;
            }
            if controller_url.is_some() {
                cfg.controller_url = controller_url;
            }
            SourceConfig::Pinecone(cfg)
        }
        Commands::Weaviate {
            url,
            class_name,
            include_crossrefs,
        } => {
            let mut cfg = match file {
                Some(SourceConfig::Weaviate(cfg)) => cfg,
                other => {
                    warn_mismatch(other.as_ref(), "weaviate");
                    WeaviateConfig::default()
                }
            };
            if let Some(url) = url {
                cfg.url = url;
            }
            if let Some(class_name) = class_name {
                cfg.class_name = class_name;
            }
            if let Some(answer) = include_crossrefs {
                cfg.include_cross_references = Some(parse_yes_no(&answer));
            }
            SourceConfig::Weaviate(cfg)
        }
        Commands::Qdrant {
            url,
            collection,
            vector_name,
        } => {
            let mut cfg = match file {
                Some(SourceConfig::Qdrant(cfg)) => cfg,
                other => {
                    warn_mismatch(other.as_ref(), "qdrant");
                    QdrantConfig::default()
                }
            };
            if let Some(url) = url {
                cfg.url = url;
            }
            if let Some(collection) = collection {
                cfg.collection = collection;
            }
            if vector_name.is_some() {
                cfg.vector_name = vector_name;
            }
            SourceConfig::Qdrant(cfg)
        }
    };
    Some(source)
}

fn warn_mismatch(file: Option<&SourceConfig>, command: &str) {
    if let Some(file) = file {
        warn!(
            "Ignoring {} source from the config file for the '{}' command",
            file.backend(),
            command
        );
    }
}
