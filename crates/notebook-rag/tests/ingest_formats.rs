//! Every supported format ingests into stored, retrievable chunks

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{pipeline_in, samples, ScriptedGenerator};
use notebook_rag::types::chunk::IMAGE_PAYLOAD_KEY;
use notebook_rag::{ChunkKind, FileType};

#[tokio::test]
async fn test_every_format_ingests() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    for (ext, data) in samples() {
        let document_id = format!("sample-{}", ext);
        let ids = pipeline
            .ingest(&document_id, data, ext, HashMap::new())
            .await
            .unwrap_or_else(|e| panic!("{} failed to ingest: {}", ext, e));
        assert!(!ids.is_empty(), "{} produced no chunks", ext);
        assert_eq!(pipeline.document_chunk_ids(&document_id).await.unwrap(), ids);

        let expected_type = FileType::from_extension(ext).unwrap().extension();
        for (ordinal, id) in ids.iter().enumerate() {
            assert_eq!(id, &format!("{}:{}", document_id, ordinal));
            let stored = pipeline.index().get(id).await.unwrap().unwrap();
            assert_eq!(stored.document_id, document_id);
            assert_eq!(stored.chunk.metadata["file_type"], expected_type);
            assert_eq!(stored.chunk.metadata["kind"], stored.chunk.kind.as_str());
            assert!(stored.chunk.position >= 1);
            stored.chunk.validate().unwrap();
        }
    }
}

#[tokio::test]
async fn test_pdf_keeps_page_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    let ids = pipeline
        .ingest(
            "report",
            common::pdf(&["Alpha page content.", "Beta page content."]),
            "pdf",
            HashMap::new(),
        )
        .await
        .unwrap();

    let mut pages = Vec::new();
    for id in &ids {
        let stored = pipeline.index().get(id).await.unwrap().unwrap();
        assert!(!stored.chunk.is_position_approximate());
        pages.push((stored.chunk.position, stored.chunk.text));
    }
    assert_eq!(pages[0].0, 1);
    assert!(pages[0].1.contains("Alpha"));
    assert!(pages.iter().any(|(page, text)| *page == 2 && text.contains("Beta")));
}

#[tokio::test]
async fn test_structured_kinds_survive_storage() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    let stored_chunks = |pipeline: &notebook_rag::RagPipeline, ids: Vec<String>| {
        let index = Arc::clone(pipeline.index());
        async move {
            let mut chunks = Vec::new();
            for id in ids {
                chunks.push(index.get(&id).await.unwrap().unwrap().chunk);
            }
            chunks
        }
    };

    let csv = pipeline
        .ingest("capitals", common::csv(), "csv", HashMap::new())
        .await
        .unwrap();
    let csv_chunks = stored_chunks(&pipeline, csv).await;
    assert!(csv_chunks.iter().all(|c| c.kind == ChunkKind::Table));
    assert!(csv_chunks[0].text.contains("Paris"));

    let md = pipeline
        .ingest("notes", common::markdown(), "md", HashMap::new())
        .await
        .unwrap();
    let md_chunks = stored_chunks(&pipeline, md).await;
    assert!(md_chunks
        .iter()
        .any(|c| c.kind == ChunkKind::Code && c.text.contains("bonjour")));
    assert!(md_chunks.iter().all(|c| c.is_position_approximate()));

    let notebook = pipeline
        .ingest("analysis", common::notebook(), "ipynb", HashMap::new())
        .await
        .unwrap();
    let notebook_chunks = stored_chunks(&pipeline, notebook).await;
    assert_eq!(notebook_chunks.len(), 2);
    assert_eq!(notebook_chunks[0].kind, ChunkKind::Text);
    assert_eq!(notebook_chunks[1].kind, ChunkKind::Code);

    let html = pipeline
        .ingest("page", common::html(), "html", HashMap::new())
        .await
        .unwrap();
    let html_chunks = stored_chunks(&pipeline, html).await;
    assert!(html_chunks.iter().all(|c| !c.text.contains("ignored")));
    assert!(html_chunks.iter().any(|c| c.kind == ChunkKind::Table));
}

#[tokio::test]
async fn test_image_keeps_payload() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    let ids = pipeline
        .ingest("photo", common::png(), "png", HashMap::new())
        .await
        .unwrap();
    let stored = pipeline.index().get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(stored.chunk.kind, ChunkKind::Image);
    assert_eq!(stored.chunk.position, 1);
    assert!(stored.chunk.metadata.contains_key(IMAGE_PAYLOAD_KEY));
}

#[tokio::test]
async fn test_unsupported_format_leaves_index_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    pipeline
        .ingest("notes", common::markdown(), "md", HashMap::new())
        .await
        .unwrap();
    let before = pipeline.index().len().await.unwrap();

    let result = pipeline
        .ingest("binary", vec![0x4d, 0x5a, 0x90, 0x00], "exe", HashMap::new())
        .await;
    assert!(matches!(
        result,
        Err(notebook_rag::Error::UnsupportedFormat(_))
    ));
    assert_eq!(pipeline.index().len().await.unwrap(), before);
    assert!(pipeline.document_chunk_ids("binary").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_file_is_parse_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    for ext in ["pdf", "docx", "xlsx", "png"] {
        let result = pipeline
            .ingest("broken", b"definitely not a real file".to_vec(), ext, HashMap::new())
            .await;
        assert!(
            matches!(result, Err(notebook_rag::Error::ParseFailure { .. })),
            "{} should fail to parse",
            ext
        );
    }
    assert_eq!(pipeline.index().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_layout_only_html_is_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_in(dir.path(), Arc::new(ScriptedGenerator::fixed("ok")));

    let page = br#"<html><body><div class="content"><div>Lisbon is the capital of Portugal.</div>
        <section>Porto sits on the <em>Douro</em> river.</section></div></body></html>"#;
    let ids = pipeline
        .ingest("portugal", page.to_vec(), "html", HashMap::new())
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let result = pipeline.ask("capital of Portugal", None).await.unwrap();
    assert_eq!(result.document_ids(), vec!["portugal"]);
    let first = pipeline.index().get(&ids[0]).await.unwrap().unwrap();
    assert_eq!(first.chunk.text, "Lisbon is the capital of Portugal.");
}
