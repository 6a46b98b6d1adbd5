//! API routes for the RAG server

pub mod documents;
pub mod query;

use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;
use crate::types::FileType;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Document management, with a larger body limit for uploads
        .route(
            "/documents/:id",
            post(documents::upload_document)
                .layer(DefaultBodyLimit::max(max_upload_size))
                .get(documents::get_document)
                .delete(documents::delete_document),
        )
        .route("/documents/:id/summary", post(documents::summarize_document))
        // Query
        .route("/ask", post(query::ask))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.config();
    let formats: Vec<&str> = FileType::ALL.iter().map(|t| t.extension()).collect();

    Json(serde_json::json!({
        "name": "notebook-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-format document ingestion with cited, optionally multimodal answers",
        "uptime_secs": state.uptime_secs(),
        "endpoints": {
            "POST /api/documents/:id": "Upload a document (multipart: file, metadata)",
            "GET /api/documents/:id": "List a document's chunk ids",
            "DELETE /api/documents/:id": "Delete a document's chunks",
            "POST /api/documents/:id/summary": "Summarize a stored document",
            "POST /api/ask": "Answer a question with [document_id:page] citations",
            "GET /health": "Backend health"
        },
        "supported_formats": formats,
        "summary": {
            "batch_chars": config.summary.batch_chars
        },
        "retrieval": {
            "top_k": config.retrieval.top_k,
            "min_score": config.retrieval.min_score
        },
        "chunking": {
            "chunk_size": config.chunking.chunk_size,
            "chunk_overlap": config.chunking.chunk_overlap
        },
        "embeddings": {
            "backend": config.embeddings.backend,
            "dimensions": config.embeddings.dimensions
        },
        "llm": {
            "backend": config.llm.backend,
            "model": config.llm.model
        }
    }))
}
