//! Extraction server binary
//!
//! Run with: cargo run -p doc-tabulate --bin doc-tabulate-server

use doc_tabulate::{config::TabulateConfig, server::TabulateServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_tabulate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                       doc-tabulate                        ║
║          Batch Document-to-Table Extraction               ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Optional config path as the first argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = TabulateConfig::load(config_path.as_deref())?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Model: {}", config.llm.model);
    tracing::info!("  - Concurrency: {}", config.processing.concurrency);

    let server = TabulateServer::new(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/headers      - Suggest headers for documents");
    println!("  POST /api/extract      - Start a batch extraction");
    println!("  GET  /api/jobs/:id     - Live rows and progress");
    println!("  POST /api/jobs/:id/retry - Retry failed documents");
    println!("  GET  /api/jobs/:id/csv - Export CSV");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
