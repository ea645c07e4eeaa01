//! End-to-end retrieval flow against the library API: ingest a small
//! document, chunk it with overlapping windows, rank snippets against a
//! query, and verify that citations carry exact character spans back to the
//! source text.

use docchat::chunk::{chunk_spans, slice_span};
use docchat::config::{ChunkingConfig, Config, DbConfig, StorageConfig};
use docchat::embedding::MockEmbedder;
use docchat::engine::Engine;
use docchat::llm::MockChat;
use docchat::models::Role;
use docchat::{db, migrate};

const FOX: &str = "The quick brown fox. The fox jumps.";

fn test_config(tmp: &tempfile::TempDir) -> Config {
    Config {
        db: DbConfig {
            path: tmp.path().join("docchat.sqlite"),
        },
        storage: StorageConfig {
            dir: tmp.path().join("storage"),
        },
        chunking: ChunkingConfig {
            chunk_size: 20,
            overlap: 4,
        },
        retrieval: docchat::config::RetrievalConfig {
            top_k: 10,
            min_similarity: 0.0,
            max_context_chars: 12_000,
        },
        embedding: Default::default(),
        llm: Default::default(),
    }
}

async fn test_engine(tmp: &tempfile::TempDir) -> Engine {
    let config = test_config(tmp);
    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Engine::new(
        config,
        pool,
        Some(Box::new(MockEmbedder::new(64))),
        Some(Box::new(MockChat)),
    )
}

#[test]
fn fox_document_chunks_into_two_overlapping_windows() {
    assert_eq!(FOX.chars().count(), 35);

    let spans = chunk_spans(FOX, 20, 4).unwrap();
    let pairs: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
    assert_eq!(pairs, vec![(0, 24), (16, 35)]);

    assert_eq!(slice_span(FOX, spans[0]), "The quick brown fox. The");
    assert_eq!(slice_span(FOX, spans[1]), " fox jumps.");
}

#[tokio::test]
async fn ingest_then_chat_cites_exact_source_spans() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = test_engine(&tmp).await;
    let project = engine.create_project("fox notes").await.unwrap();

    let report = engine
        .ingest(&project.id, "fox.txt", FOX.as_bytes(), "text/plain")
        .await
        .unwrap();
    assert!(!report.skipped);
    assert_eq!(report.snippets, 2);
    assert_eq!(report.embedded, 2);
    assert_eq!(report.pending, 0);

    let outcome = engine
        .chat(&project.id, "What does the fox do?")
        .await
        .unwrap();

    // Both overlapping windows share query terms, so both clear the floor.
    assert_eq!(outcome.passages.len(), 2);
    for pair in outcome.passages.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    let mut spans: Vec<(usize, usize)> = outcome
        .passages
        .iter()
        .map(|p| (p.span.start, p.span.end))
        .collect();
    spans.sort();
    assert_eq!(spans, vec![(0, 24), (16, 35)]);

    // Passage text is exactly the cited slice of the stored body.
    for passage in &outcome.passages {
        assert_eq!(passage.text, slice_span(FOX, passage.span));
        assert_eq!(passage.document_id, report.document_id);
    }

    // The mock chat model reports how many passages reached the prompt.
    assert!(outcome.answer.contains("2 passage(s)"));
}

#[tokio::test]
async fn citations_survive_back_to_a_highlighted_span() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = test_engine(&tmp).await;
    let project = engine.create_project("p").await.unwrap();

    let report = engine
        .ingest(&project.id, "fox.txt", FOX.as_bytes(), "text/plain")
        .await
        .unwrap();
    let outcome = engine.chat(&project.id, "fox jumps").await.unwrap();

    let cited = &outcome.passages[0];
    let rendered = engine
        .highlight(&report.document_id, cited.span.start, cited.span.end)
        .await
        .unwrap();
    assert!(rendered.contains("<highlight>"));
    assert!(rendered.contains("</highlight>"));

    // Stripping the markers recovers the escaped body, so offsets are exact.
    let stripped = rendered
        .replace("<highlight>", "")
        .replace("</highlight>", "");
    assert_eq!(stripped, FOX);
}

#[tokio::test]
async fn conversation_turns_record_their_sources() {
    let tmp = tempfile::TempDir::new().unwrap();
    let engine = test_engine(&tmp).await;
    let project = engine.create_project("p").await.unwrap();
    engine
        .ingest(&project.id, "fox.txt", FOX.as_bytes(), "text/plain")
        .await
        .unwrap();

    engine.chat(&project.id, "fox?").await.unwrap();

    let history = engine.history(&project.id);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert!(history[0].sources.is_empty());
    assert_eq!(history[1].role, Role::Assistant);
    assert!(!history[1].sources.is_empty());

    // Deleting the document keeps the recorded citation spans intact.
    let documents = docchat::store::list_documents(engine.pool(), &project.id)
        .await
        .unwrap();
    engine
        .delete_document(&project.id, &documents[0].id)
        .await
        .unwrap();
    let history = engine.history(&project.id);
    assert!(!history[1].sources.is_empty());
}
