//! `json-magic` - bundle, diff and migrate JSON/YAML documents.
//!
//! Usage:
//!   json-magic bundle <input> [-o <file>] [--tree-shake] [--url-map] [--format json|yaml]
//!   json-magic diff <before> <after> [--group-depth <n>]
//!   json-magic migrate <input> [-o <file>]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use json_magic::bundle::BundleOptions;
use json_magic::document::Format;
use json_magic::json_cli;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "json-magic", version)]
#[command(about = "Bundle, diff and migrate JSON/YAML documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter, e.g. `info` or `json_magic=debug` (defaults to RUST_LOG, then `warn`)
    #[arg(long, global = true, env = "JSON_MAGIC_LOG")]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inline every external $ref into a single document
    Bundle {
        /// Entry document (file path or URL)
        input: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Drop inlined content that nothing references
        #[arg(long, env = "JSON_MAGIC_TREE_SHAKE")]
        tree_shake: bool,

        /// Record the source location of every inlined document
        #[arg(long, env = "JSON_MAGIC_URL_MAP")]
        url_map: bool,

        /// Only follow references this many levels below the document root
        #[arg(long)]
        depth: Option<usize>,

        /// Output format (defaults to the output file extension, then JSON)
        #[arg(long, value_enum)]
        format: Option<Format>,
    },
    /// Structural diff of two documents
    Diff {
        before: String,
        after: String,

        /// Group entries by this many leading path segments
        #[arg(long)]
        group_depth: Option<usize>,
    },
    /// Migrate persisted data to the latest version
    Migrate {
        /// Data file, either raw data or `{"version": .., "data": ..}`
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn write_output(text: String, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Bundle {
            input,
            output,
            tree_shake,
            url_map,
            depth,
            format,
        } => {
            let options = BundleOptions {
                tree_shake,
                url_map,
                origin: None,
                depth,
            };
            let document = json_cli::bundle(&input, options)
                .await
                .with_context(|| format!("failed to bundle {input}"))?;
            let location = output.as_ref().map(|p| p.to_string_lossy().into_owned());
            let text = json_cli::render(&document.root, format, location.as_deref())?;
            write_output(text, output).await
        }
        Commands::Diff {
            before,
            after,
            group_depth,
        } => {
            let (left, right) = tokio::try_join!(
                json_cli::load_document(&before),
                json_cli::load_document(&after),
            )
            .context("failed to read documents to diff")?;
            let value = json_cli::diff_values(&left.root, &right.root, group_depth)?;
            write_output(json_cli::render(&value, Some(Format::Json), None)?, None).await
        }
        Commands::Migrate { input, output } => {
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let state = json_cli::migrate(&text).with_context(|| format!("failed to migrate {}", input.display()))?;
            let value = serde_json::to_value(&state)?;
            let location = output.as_ref().map(|p| p.to_string_lossy().into_owned());
            let text = json_cli::render(&value, None, location.as_deref())?;
            write_output(text, output).await
        }
    }
}
