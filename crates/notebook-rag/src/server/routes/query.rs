//! Question answering endpoint

use axum::{extract::State, Json};
use std::time::Instant;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{QueryRequest, QueryResult};

/// POST /api/ask - Answer a question with cited sources
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>> {
    let start = Instant::now();
    tracing::info!("Query: \"{}\"", request.query);

    let result = state.pipeline().ask_with(request).await?;

    tracing::info!(
        "Answered in {}ms with {} sources ({} cited)",
        start.elapsed().as_millis(),
        result.sources.len(),
        result.cited.len()
    );
    Ok(Json(result))
}
