//! RAG Server binary
//!
//! Run with: cargo run -p notebook-rag --bin notebook-rag-server [-- path/to/config.toml]
//!
//! Without a path, `NOTEBOOK_RAG_CONFIG` is consulted, then defaults plus
//! environment overrides are used.

use notebook_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notebook_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("NOTEBOOK_RAG_CONFIG").ok());
    let config = match config_path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            RagConfig::load(&path)?
        }
        None => RagConfig::from_env()?,
    };

    tracing::info!("Configuration loaded");
    tracing::info!(
        "  - Embeddings: {:?} / {} ({} dims)",
        config.embeddings.backend,
        config.embeddings.model,
        config.embeddings.dimensions
    );
    tracing::info!("  - LLM: {:?} / {}", config.llm.backend, config.llm.model);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!("  - Index: {}", config.vector_db.storage_path.display());

    let server = RagServer::from_config(config)?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST   /api/documents/:id - Upload a document");
    println!("  DELETE /api/documents/:id - Delete a document");
    println!("  POST   /api/ask           - Ask questions");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
