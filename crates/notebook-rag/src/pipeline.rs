//! The RAG pipeline: ingestion, question answering, summaries and deletion
//!
//! A `RagPipeline` is built once at startup and shared behind an `Arc`.
//! Mutations of a single document are serialized by a per-document lock;
//! different documents and all queries proceed in parallel. No lock is held
//! while talking to the embedding or generation backends.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::{cited_sources, decode_query_image, PromptBuilder};
use crate::index::{SqliteVectorIndex, VectorIndex};
use crate::ingestion::{content_hash, ChunkNormalizer, ParseOptions};
use crate::providers::{embedder_from_config, generator_from_config, EmbeddingProvider, GenerationBackend};
use crate::retrieval::Retriever;
use crate::types::{
    Chunk, EmbeddedChunk, FileType, IngestResponse, QueryRequest, QueryResult, SourceRef,
    SummaryResponse,
};

/// Metadata keys owned by the pipeline; caller metadata cannot override them
const RESERVED_KEYS: &[&str] = &[
    "document_id",
    "file_type",
    "kind",
    "position",
    "ordinal",
    "content_hash",
    "ingested_at",
];

/// Backend availability snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub embedder: String,
    pub embedder_ok: bool,
    pub generator: String,
    pub generator_model: String,
    pub generator_ok: bool,
    pub indexed_chunks: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.embedder_ok && self.generator_ok
    }
}

/// Document ingestion and cited question answering over a shared index
pub struct RagPipeline {
    config: RagConfig,
    parse_options: ParseOptions,
    normalizer: ChunkNormalizer,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    generator: Arc<dyn GenerationBackend>,
    document_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RagPipeline {
    /// Assemble a pipeline from explicit collaborators
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn GenerationBackend>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimensions() != index.dimensions() {
            return Err(Error::Config(format!(
                "embedder '{}' produces {} dimensions but the index stores {}",
                embedder.name(),
                embedder.dimensions(),
                index.dimensions()
            )));
        }

        let normalizer = ChunkNormalizer::from_config(&config.chunking)?;
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&index))
            .with_min_score(config.retrieval.min_score);

        tracing::info!(
            "RAG pipeline ready (embedder: {}, generator: {} / {})",
            embedder.name(),
            generator.name(),
            generator.model()
        );

        Ok(Self {
            parse_options: ParseOptions::from(&config),
            config,
            normalizer,
            embedder,
            index,
            retriever,
            generator,
            document_locks: DashMap::new(),
        })
    }

    /// Build the configured backends and open the on-disk index
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;
        let embedder = embedder_from_config(&config.embeddings)?;
        let index = Arc::new(SqliteVectorIndex::open(
            &config.vector_db.storage_path,
            config.embeddings.dimensions,
        )?);
        let generator = generator_from_config(&config.llm)?;
        Self::new(config, embedder, index, generator)
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Ingest a document, replacing any previous version
    ///
    /// Returns the stored chunk ids in ordinal order.
    pub async fn ingest(
        &self,
        document_id: &str,
        data: Vec<u8>,
        extension: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<String>> {
        Ok(self
            .ingest_document(document_id, data, extension, metadata)
            .await?
            .chunk_ids)
    }

    /// Like [`ingest`](Self::ingest), with file type and timing
    pub async fn ingest_document(
        &self,
        document_id: &str,
        data: Vec<u8>,
        extension: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<IngestResponse> {
        let start = Instant::now();
        let document_id = validate_document_id(document_id)?;
        let file_type = FileType::from_extension(extension)?;

        tracing::info!(
            "Ingesting {} ({}, {} bytes)",
            document_id,
            file_type,
            data.len()
        );

        let hash = content_hash(&data);
        let chunks = self.parse_and_normalize(file_type, data).await?;
        if chunks.is_empty() {
            return Err(Error::parse(
                file_type.extension(),
                "document produced no retrievable content",
            ));
        }

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal, chunk)| {
                enrich(chunk, document_id, ordinal, file_type, &hash, &ingested_at, &metadata)
            })
            .collect();
        for chunk in &chunks {
            chunk.validate()?;
        }

        let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(Error::embedding(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }

        let entries: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (chunk, vector))| EmbeddedChunk::new(document_id, ordinal, chunk, vector))
            .collect();
        let chunk_ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();

        self.with_document_lock(document_id, move || async move {
            self.index.replace_document(document_id, entries).await
        })
        .await?;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Ingested {} as {} chunks in {}ms",
            document_id,
            chunk_ids.len(),
            processing_time_ms
        );

        Ok(IngestResponse {
            document_id: document_id.to_string(),
            file_type,
            chunk_ids,
            processing_time_ms,
        })
    }

    /// Answer a question, optionally about an attached base64 image
    pub async fn ask(&self, query: &str, image_base64: Option<&str>) -> Result<QueryResult> {
        let mut request = QueryRequest::new(query);
        request.image = image_base64.map(str::to_string);
        self.ask_with(request).await
    }

    /// Answer a question with explicit retrieval settings
    pub async fn ask_with(&self, request: QueryRequest) -> Result<QueryResult> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(Error::InvalidRequest("query must not be empty".into()));
        }
        let top_k = request.top_k.unwrap_or(self.config.retrieval.top_k);
        if top_k == 0 {
            return Err(Error::InvalidRequest("top_k must be positive".into()));
        }
        // Reject a bad image before spending an embedding call
        if let Some(image) = request.image.as_deref() {
            decode_query_image(image)?;
        }

        let filter = request.filter.unwrap_or_default();
        let hits = self.retriever.retrieve(query, top_k, &filter).await?;
        let generation = PromptBuilder::build(query, &hits, request.image.as_deref())?;

        tracing::info!(
            "Answering with {} context chunks{}",
            hits.len(),
            if request.image.is_some() { " and an image" } else { "" }
        );
        let answer = self.generator.generate(&generation).await?;

        let sources: Vec<SourceRef> = hits.iter().map(|hit| hit.source()).collect();
        let cited = cited_sources(&answer, &sources);

        Ok(QueryResult {
            answer,
            sources,
            cited,
        })
    }

    /// Summarize a stored document with a map-reduce pass over its chunks
    ///
    /// Consecutive chunk texts are batched up to `summary.batch_chars` and
    /// each batch is summarized on its own. Partial summaries are merged,
    /// collapsing in rounds while they exceed the same budget. A document
    /// that fits one batch takes a single request.
    pub async fn summarize(&self, document_id: &str) -> Result<SummaryResponse> {
        let document_id = validate_document_id(document_id)?;
        let budget = self.config.summary.batch_chars;

        let entries = self.index.document_chunks(document_id).await?;
        let excerpts: Vec<(u32, &str)> = entries
            .iter()
            .map(|entry| (entry.chunk.position, entry.chunk.text.trim()))
            .filter(|(_, text)| !text.is_empty())
            .collect();
        if excerpts.is_empty() {
            return Err(Error::NotFound(format!(
                "document '{}' has no indexed text",
                document_id
            )));
        }

        let batches = batch_by_chars(excerpts.clone(), budget, |(_, text)| text.chars().count());
        tracing::info!(
            "Summarizing {} chunks of {} in {} batches",
            excerpts.len(),
            document_id,
            batches.len()
        );

        let mut partials = Vec::with_capacity(batches.len());
        for batch in &batches {
            let request = PromptBuilder::build_summary(document_id, batch);
            partials.push(self.generator.generate(&request).await?.trim().to_string());
        }

        while partials.len() > 1 {
            let groups = batch_by_chars(partials.clone(), budget, |p| p.chars().count());
            if groups.len() == 1 || groups.len() == partials.len() {
                let request = PromptBuilder::build_combined_summary(document_id, &partials);
                partials = vec![self.generator.generate(&request).await?.trim().to_string()];
                break;
            }
            tracing::debug!("Collapsing {} partial summaries into {}", partials.len(), groups.len());
            let mut collapsed = Vec::with_capacity(groups.len());
            for group in &groups {
                let request = PromptBuilder::build_combined_summary(document_id, group);
                collapsed.push(self.generator.generate(&request).await?.trim().to_string());
            }
            partials = collapsed;
        }

        Ok(SummaryResponse {
            document_id: document_id.to_string(),
            summary: partials.concat(),
            chunks_summarized: excerpts.len(),
            batches: batches.len(),
        })
    }

    /// Remove every chunk of a document; returns how many were removed
    pub async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let document_id = validate_document_id(document_id)?;
        let removed = self
            .with_document_lock(document_id, move || async move {
                self.index.delete_document(document_id).await
            })
            .await?;
        tracing::info!("Deleted {} chunks of {}", removed, document_id);
        Ok(removed)
    }

    /// Chunk ids currently stored for a document
    pub async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>> {
        self.index
            .document_chunk_ids(validate_document_id(document_id)?)
            .await
    }

    /// Check the backends
    pub async fn health(&self) -> HealthReport {
        let embedder_ok = self.embedder.health_check().await.unwrap_or(false);
        let generator_ok = self.generator.health_check().await.unwrap_or(false);
        let indexed_chunks = match self.index.len().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Index size unavailable: {}", e);
                0
            }
        };

        HealthReport {
            embedder: self.embedder.name().to_string(),
            embedder_ok,
            generator: self.generator.name().to_string(),
            generator_model: self.generator.model().to_string(),
            generator_ok,
            indexed_chunks,
        }
    }

    async fn parse_and_normalize(&self, file_type: FileType, data: Vec<u8>) -> Result<Vec<Chunk>> {
        let options = self.parse_options.clone();
        let timeout = Duration::from_secs(self.config.ingestion.parse_timeout_secs);

        let task = tokio::task::spawn_blocking(move || file_type.parse(&data, &options));
        let elements = match tokio::time::timeout(timeout, task).await {
            Ok(joined) => joined.map_err(|e| Error::internal(format!("parser task failed: {}", e)))??,
            Err(_) => {
                tracing::error!("Parsing {} timed out after {:?}", file_type, timeout);
                return Err(Error::parse(
                    file_type.extension(),
                    format!("parsing timed out after {}s", timeout.as_secs()),
                ));
            }
        };

        let chunks = self.normalizer.normalize(elements);
        tracing::debug!("Normalized {} into {} chunks", file_type, chunks.len());
        Ok(chunks)
    }

    /// Run `f` while holding the document's lock
    async fn with_document_lock<F, Fut, T>(&self, document_id: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let lock = Arc::clone(
            self.document_locks
                .entry(document_id.to_string())
                .or_default()
                .value(),
        );

        let result = {
            let _guard = lock.lock().await;
            f().await
        };

        drop(lock);
        self.document_locks
            .remove_if(document_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}

fn validate_document_id(document_id: &str) -> Result<&str> {
    let trimmed = document_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest("document_id must not be empty".into()));
    }
    if trimmed.contains(['[', ']']) {
        return Err(Error::InvalidRequest(
            "document_id must not contain square brackets".into(),
        ));
    }
    Ok(trimmed)
}

/// Group consecutive items so each group stays within `budget`; an item
/// larger than the budget gets a group of its own
fn batch_by_chars<T>(items: Vec<T>, budget: usize, len: impl Fn(&T) -> usize) -> Vec<Vec<T>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut size = 0;
    for item in items {
        let item_len = len(&item);
        if !current.is_empty() && size + item_len > budget {
            groups.push(std::mem::take(&mut current));
            size = 0;
        }
        size += item_len;
        current.push(item);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Attach pipeline-owned keys and caller metadata to a normalized chunk
fn enrich(
    mut chunk: Chunk,
    document_id: &str,
    ordinal: usize,
    file_type: FileType,
    hash: &str,
    ingested_at: &str,
    caller: &HashMap<String, serde_json::Value>,
) -> Chunk {
    let kind = chunk.kind.as_str();
    let position = chunk.position;
    let metadata = &mut chunk.metadata;

    metadata.insert("document_id".into(), document_id.into());
    metadata.insert("file_type".into(), file_type.extension().into());
    metadata.insert("kind".into(), kind.into());
    metadata.insert("position".into(), position.into());
    metadata.insert("ordinal".into(), ordinal.into());
    metadata.insert("content_hash".into(), hash.into());
    metadata.insert("ingested_at".into(), ingested_at.into());

    for (key, value) in caller {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        // Parser-derived keys take precedence over caller values
        metadata.entry(key.clone()).or_insert_with(|| value.clone());
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationRequest;
    use crate::providers::HashingEmbedder;
    use async_trait::async_trait;

    struct EchoGenerator;

    #[async_trait]
    impl GenerationBackend for EchoGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            Ok(format!("{} parts", request.turns[0].parts.len()))
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }
    }

    fn pipeline() -> RagPipeline {
        let mut config = RagConfig::default();
        config.embeddings.dimensions = 128;
        RagPipeline::new(
            config,
            Arc::new(HashingEmbedder::new(128).unwrap()),
            Arc::new(SqliteVectorIndex::in_memory(128).unwrap()),
            Arc::new(EchoGenerator),
        )
        .unwrap()
    }

    #[test]
    fn test_dimension_mismatch_is_config_error() {
        let result = RagPipeline::new(
            RagConfig::default(),
            Arc::new(HashingEmbedder::new(64).unwrap()),
            Arc::new(SqliteVectorIndex::in_memory(128).unwrap()),
            Arc::new(EchoGenerator),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_metadata_is_enriched() {
        let pipeline = pipeline();
        let mut metadata = HashMap::new();
        metadata.insert("title".to_string(), serde_json::json!("Notes"));
        metadata.insert("document_id".to_string(), serde_json::json!("spoofed"));

        let ids = pipeline
            .ingest("notes", b"# Heading\n\nBody text.".to_vec(), "md", metadata)
            .await
            .unwrap();
        assert_eq!(ids, vec!["notes:0", "notes:1"]);

        let stored = pipeline.index().get("notes:1").await.unwrap().unwrap();
        let meta = &stored.chunk.metadata;
        assert_eq!(meta["document_id"], "notes");
        assert_eq!(meta["title"], "Notes");
        assert_eq!(meta["file_type"], "md");
        assert_eq!(meta["kind"], "text");
        assert_eq!(meta["ordinal"], 1);
        assert_eq!(meta["content_hash"].as_str().unwrap().len(), 64);
        assert!(meta.contains_key("ingested_at"));
        assert_eq!(meta["position_approximate"], true);
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() {
        let pipeline = pipeline();
        let result = pipeline
            .ingest("blank", b"   \n\n ".to_vec(), "md", HashMap::new())
            .await;
        assert!(matches!(result, Err(Error::ParseFailure { .. })));
        assert_eq!(pipeline.index().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let pipeline = pipeline();
        assert!(matches!(
            pipeline.ingest(" ", b"x".to_vec(), "md", HashMap::new()).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            pipeline.ask("", None).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            pipeline.ask("what?", Some("%%%")).await,
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            pipeline
                .ask_with(QueryRequest::new("what?").with_top_k(0))
                .await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_document_locks_are_released() {
        let pipeline = pipeline();
        pipeline
            .ingest("doc", b"Some text.".to_vec(), "md", HashMap::new())
            .await
            .unwrap();
        assert_eq!(pipeline.delete_document("doc").await.unwrap(), 1);
        assert!(pipeline.document_locks.is_empty());
    }

    #[tokio::test]
    async fn test_health_report() {
        let report = pipeline().health().await;
        assert!(report.is_healthy());
        assert_eq!(report.embedder, "hashing");
        assert_eq!(report.generator_model, "echo-1");
        assert_eq!(report.indexed_chunks, 0);
    }

    #[test]
    fn test_batches_respect_budget() {
        let items = vec!["aaaa", "bb", "cccccccc", "d", "e"];
        let groups = batch_by_chars(items, 6, |s| s.len());
        assert_eq!(
            groups,
            vec![vec!["aaaa", "bb"], vec!["cccccccc"], vec!["d", "e"]]
        );
        assert!(batch_by_chars(Vec::<&str>::new(), 6, |s| s.len()).is_empty());
    }

    #[tokio::test]
    async fn test_summary_of_unknown_document_is_not_found() {
        let pipeline = pipeline();
        assert!(matches!(
            pipeline.summarize("missing").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            pipeline.summarize("  ").await,
            Err(Error::InvalidRequest(_))
        ));
    }
}
