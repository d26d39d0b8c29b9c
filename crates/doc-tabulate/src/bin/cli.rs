//! Command-line batch extraction
//!
//! Run with: cargo run -p doc-tabulate --features cli --bin doc-tabulate -- extract ./scans --headers "S.No,Document Name,Total"

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use console::style;
use doc_tabulate::{
    config::TabulateConfig,
    export::{write_csv_file, write_rows},
    processing::{BatchRunner, FinalResult, ResultSlot, ResultTable, WorkItem},
    providers::{create_client, ExtractionClient},
    types::{collect_documents, suggested_headers, DocumentFile, Schema},
};
use futures_util::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "doc-tabulate", version, about = "Extract one table row per document with a vision model")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a table from documents
    Extract {
        /// Files or directories to process
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Comma-separated column headers, in output order
        #[arg(long, value_delimiter = ',', required = true)]
        headers: Vec<String>,

        /// Free-text extraction instructions
        #[arg(long, default_value = "")]
        instructions: String,

        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Automatic retries of failed documents
        #[arg(long, default_value_t = 0)]
        retries: u32,

        /// Concurrent extraction requests (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Suggest column headers for documents
    Headers {
        /// Files or directories to sample
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Number of documents to send to the model
        #[arg(long, default_value_t = 5)]
        samples: usize,
    },
}

/// One pass over the batch
enum Attempt {
    Run(Vec<DocumentFile>),
    Retry(Vec<WorkItem>, Arc<ResultTable>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = TabulateConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Extract {
            paths,
            headers,
            instructions,
            output,
            retries,
            concurrency,
        } => {
            if let Some(concurrency) = concurrency {
                config.processing.concurrency = concurrency;
            }
            config.validate()?;
            extract(&config, &paths, headers, &instructions, output, retries).await
        }
        Commands::Headers { paths, samples } => identify(&config, &paths, samples).await,
    }
}

/// Logs go to stderr so CSV on stdout stays clean
fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "doc_tabulate=warn",
        1 => "doc_tabulate=info",
        _ => "doc_tabulate=debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn extract(
    config: &TabulateConfig,
    paths: &[PathBuf],
    headers: Vec<String>,
    instructions: &str,
    output: Option<PathBuf>,
    retries: u32,
) -> anyhow::Result<()> {
    let schema = Schema::new(headers)?;
    let documents = collect_documents(paths);
    if documents.is_empty() {
        bail!("no supported documents found in the given paths");
    }

    let client = create_client(config)?;
    let concurrency = config.processing.concurrency;

    eprintln!(
        "{} {} documents with {} ({} workers)",
        style("Extracting").bold().cyan(),
        documents.len(),
        client.model(),
        concurrency
    );

    let mut result = run_attempt(
        client.clone(),
        concurrency,
        &schema,
        instructions,
        Attempt::Run(documents),
        "extracting",
    )
    .await?;

    let mut attempt = 0;
    while !result.all_succeeded() && attempt < retries {
        attempt += 1;
        eprintln!(
            "{} {} failed documents (attempt {}/{})",
            style("Retrying").bold().yellow(),
            result.failed_items.len(),
            attempt,
            retries
        );
        result = run_attempt(
            client.clone(),
            concurrency,
            &schema,
            instructions,
            Attempt::Retry(result.failed_items.clone(), result.table.clone()),
            "retrying",
        )
        .await?;
    }

    match &output {
        Some(path) => {
            write_csv_file(path, &schema, &result.rows)?;
            eprintln!("{} {}", style("Wrote").bold().green(), path.display());
        }
        None => write_rows(std::io::stdout().lock(), &schema, &result.rows)?,
    }

    print_summary(&result);
    if !result.all_succeeded() {
        std::process::exit(2);
    }
    Ok(())
}

async fn run_attempt(
    client: Arc<dyn ExtractionClient>,
    concurrency: usize,
    schema: &Schema,
    instructions: &str,
    attempt: Attempt,
    label: &str,
) -> anyhow::Result<FinalResult> {
    let total = match &attempt {
        Attempt::Run(files) => files.len(),
        Attempt::Retry(items, _) => items.len(),
    };

    let bar = make_progress_bar(total as u64, label);
    let mut runner = BatchRunner::new(client, concurrency);
    let mut updates = runner.subscribe();

    let watcher = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                bar.set_position(update.progress.processed as u64);
                let eta = update.progress.eta.unwrap_or_else(|| "estimating...".to_string());
                bar.set_message(format!("{} remaining, {} failed", eta, update.failed));
            }
        })
    };

    let result = match attempt {
        Attempt::Run(files) => runner.run(files, schema, instructions).await,
        Attempt::Retry(items, table) => runner.retry(items, schema, instructions, table).await,
    };

    drop(runner);
    watcher.await.ok();
    bar.finish_and_clear();

    Ok(result?)
}

fn make_progress_bar(total: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_prefix(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_summary(result: &FinalResult) {
    let counts = result.table.counts();
    eprintln!(
        "{} {} succeeded, {} failed in {:.1}s",
        style("Done").bold(),
        style(counts.succeeded).green(),
        style(counts.failed).red(),
        result.duration_ms as f64 / 1000.0
    );

    for item in &result.failed_items {
        let reason = match result.table.slot(item.original_index) {
            Some(ResultSlot::Failure(reason)) => reason,
            _ => "unknown error".to_string(),
        };
        eprintln!("  {} {}: {}", style("✗").red(), item.filename(), reason);
    }
}

async fn identify(config: &TabulateConfig, paths: &[PathBuf], samples: usize) -> anyhow::Result<()> {
    let documents = collect_documents(paths);
    if documents.is_empty() {
        bail!("no supported documents found in the given paths");
    }

    let client = create_client(config)?;
    let sampled = &documents[..documents.len().min(samples.max(1))];
    let encoded = try_join_all(sampled.iter().map(|doc| doc.load())).await?;

    eprintln!(
        "{} headers from {} documents with {}",
        style("Identifying").bold().cyan(),
        encoded.len(),
        client.model()
    );
    let headers = suggested_headers(client.identify_headers(&encoded).await?);

    for header in &headers {
        println!("{}", header);
    }
    eprintln!("\nUse with: --headers \"{}\"", headers.join(","));
    Ok(())
}
