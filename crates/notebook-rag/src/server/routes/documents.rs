//! Document upload, inspection, summary and deletion endpoints

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{DeleteResponse, IngestResponse, SummaryResponse};

/// Chunk ids stored for a document
#[derive(Debug, Serialize)]
pub struct DocumentChunks {
    pub document_id: String,
    pub chunk_ids: Vec<String>,
}

/// POST /api/documents/:id - Upload (or replace) a document
///
/// Multipart fields: `file` (required; its filename supplies the extension),
/// `extension` (optional override) and `metadata` (optional JSON object).
pub async fn upload_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut extension: Option<String> = None;
    let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("Failed to read file: {}", e)))?;
                file = Some((filename, data.to_vec()));
            }
            "extension" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("Failed to read extension: {}", e)))?;
                extension = Some(text);
            }
            "metadata" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidRequest(format!("Failed to read metadata: {}", e)))?;
                metadata = serde_json::from_slice(&data).map_err(|e| {
                    Error::InvalidRequest(format!("metadata must be a JSON object: {}", e))
                })?;
            }
            other => {
                tracing::debug!("Ignoring multipart field '{}'", other);
            }
        }
    }

    let (filename, data) =
        file.ok_or_else(|| Error::InvalidRequest("multipart field 'file' is required".into()))?;

    let extension = extension
        .or_else(|| {
            filename
                .as_deref()
                .and_then(|f| f.rsplit_once('.'))
                .map(|(_, ext)| ext.to_string())
        })
        .unwrap_or_default();

    if let Some(filename) = filename {
        metadata
            .entry("filename".to_string())
            .or_insert_with(|| filename.into());
    }

    tracing::info!(
        "Upload for {} ({} bytes, extension '{}')",
        document_id,
        data.len(),
        extension
    );

    let response = state
        .pipeline()
        .ingest_document(&document_id, data, &extension, metadata)
        .await?;
    Ok(Json(response))
}

/// GET /api/documents/:id - Chunk ids stored for a document
pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<DocumentChunks>> {
    let chunk_ids = state.pipeline().document_chunk_ids(&document_id).await?;
    Ok(Json(DocumentChunks {
        document_id,
        chunk_ids,
    }))
}

/// POST /api/documents/:id/summary - Map-reduce summary of a stored document
pub async fn summarize_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<SummaryResponse>> {
    let summary = state.pipeline().summarize(&document_id).await?;
    Ok(Json(summary))
}

/// DELETE /api/documents/:id - Remove a document's chunks
pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let chunks_deleted = state.pipeline().delete_document(&document_id).await?;
    Ok(Json(DeleteResponse {
        document_id,
        chunks_deleted,
    }))
}
