//! Retrieval orchestrator.
//!
//! Composes the chunker, embedding client, snippet store, and index manager
//! on ingest; the ranker, prompt assembly, and chat model on query. Owns the
//! per-project mutual-exclusion discipline: every load → mutate → persist of
//! shared state (snippet rows + persisted index) happens under that
//! project's lock, and slow external provider calls happen before the lock
//! is taken.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::chat::{assemble_prompt, ConversationLog};
use crate::chunk::{chunk_spans, slice_span};
use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, EmbeddingClient};
use crate::error::{Error, Result};
use crate::highlight;
use crate::index::{IndexManager, IndexNode};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{ConversationTurn, Document, Project, RetrievedPassage, SourceRef};
use crate::rank;
use crate::store;

/// Per-project mutual exclusion for ingest/delete. Queries stay lock-free.
#[derive(Default)]
struct ProjectLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProjectLocks {
    fn lock_for(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("project lock map poisoned");
        map.entry(project_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Outcome of one ingest call.
#[derive(Debug)]
pub struct IngestReport {
    pub document_id: String,
    /// True when an identical body already existed in the project and
    /// nothing was written.
    pub skipped: bool,
    pub snippets: usize,
    pub embedded: usize,
    /// Snippets left without a vector after provider failures.
    pub pending: usize,
}

/// Outcome of one grounded chat turn.
#[derive(Debug)]
pub struct ChatOutcome {
    pub answer: String,
    /// The passages folded into the prompt, in prompt order, each carrying
    /// its exact source span.
    pub passages: Vec<RetrievedPassage>,
}

pub struct Engine {
    config: Config,
    pool: SqlitePool,
    index: IndexManager,
    embedder: Option<Box<dyn EmbeddingClient>>,
    llm: Option<Box<dyn ChatModel>>,
    locks: ProjectLocks,
    conversations: Mutex<ConversationLog>,
}

impl Engine {
    /// Connect to the database and build providers from the config.
    /// Disabled providers are allowed; operations that need them fail with
    /// a provider error instead.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let embedder = if config.embedding.is_enabled() {
            Some(create_embedder(&config.embedding)?)
        } else {
            None
        };
        let llm = if config.llm.is_enabled() {
            Some(create_chat_model(&config.llm)?)
        } else {
            None
        };
        Ok(Self::new(config, pool, embedder, llm))
    }

    pub fn new(
        config: Config,
        pool: SqlitePool,
        embedder: Option<Box<dyn EmbeddingClient>>,
        llm: Option<Box<dyn ChatModel>>,
    ) -> Self {
        let index = IndexManager::new(config.storage.dir.clone());
        Self {
            config,
            pool,
            index,
            embedder,
            llm,
            locks: ProjectLocks::default(),
            conversations: Mutex::new(ConversationLog::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Projects ============

    pub async fn create_project(&self, name: &str) -> Result<Project> {
        store::create_project(&self.pool, name).await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        store::list_projects(&self.pool).await
    }

    /// Delete a project, its documents and snippets, and its persisted
    /// index. The project returns to the `Absent` index state.
    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        let lock = self.locks.lock_for(project_id);
        let _guard = lock.lock().await;

        self.index.remove(project_id)?;
        store::delete_project(&self.pool, project_id).await?;
        self.conversations
            .lock()
            .expect("conversation log poisoned")
            .clear(project_id);
        Ok(())
    }

    // ============ Ingest ============

    /// Ingest one uploaded document: extract, chunk, embed (best-effort),
    /// append snippets, and update the persisted index.
    pub async fn ingest(
        &self,
        project_id: &str,
        name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<IngestReport> {
        store::get_project(&self.pool, project_id).await?;

        let body = crate::extract::extract_text(bytes, content_type)?;
        let hash = store::content_hash(&body);

        if let Some(existing) = store::find_document_by_hash(&self.pool, project_id, &hash).await? {
            info!(project_id, document_id = %existing, "identical body already ingested, skipping");
            return Ok(IngestReport {
                document_id: existing,
                skipped: true,
                snippets: 0,
                embedded: 0,
                pending: 0,
            });
        }

        let spans = chunk_spans(
            &body,
            self.config.chunking.chunk_size,
            self.config.chunking.overlap,
        )?;
        let texts: Vec<String> = spans
            .iter()
            .map(|&span| slice_span(&body, span).to_string())
            .collect();

        // Embed before taking the project lock: provider calls are slow and
        // must not serialize other writers.
        let vectors = self.embed_best_effort(&texts).await;
        let embedded = vectors.iter().filter(|v| v.is_some()).count();
        let pending = vectors.len() - embedded;
        if pending > 0 {
            warn!(
                project_id,
                pending, "some snippets left unembedded; they are excluded from ranking"
            );
        }

        let lock = self.locks.lock_for(project_id);
        let _guard = lock.lock().await;

        // A racing ingest of the same body may have won the lock first; the
        // pre-lock check only avoids wasted embedding work.
        if let Some(existing) = store::find_document_by_hash(&self.pool, project_id, &hash).await? {
            info!(project_id, document_id = %existing, "identical body already ingested, skipping");
            return Ok(IngestReport {
                document_id: existing,
                skipped: true,
                snippets: 0,
                embedded: 0,
                pending: 0,
            });
        }

        // Document row and snippet rows land together or not at all.
        let mut tx = self.pool.begin().await?;
        let document = store::insert_document(&mut *tx, project_id, name, &body).await?;

        let mut nodes = Vec::with_capacity(spans.len());
        for (span, (text, vector)) in spans.iter().zip(texts.into_iter().zip(vectors.into_iter())) {
            let snippet_id =
                store::append_snippet(&mut *tx, &document.id, *span, vector.as_deref()).await?;
            nodes.push(IndexNode {
                node_id: snippet_id,
                document_id: document.id.clone(),
                span: *span,
                text,
                vector,
            });
        }
        tx.commit().await?;

        match self.index.build_or_update(project_id, nodes) {
            Ok(_) => {}
            Err(Error::IndexCorruption(reason)) => {
                // The snippet store is authoritative; regenerate the cache.
                warn!(project_id, %reason, "persisted index corrupt, rebuilding from snippet store");
                self.rebuild_index_locked(project_id).await?;
            }
            Err(e) => return Err(e),
        }

        info!(
            project_id,
            document_id = %document.id,
            snippets = spans.len(),
            embedded,
            "document ingested"
        );

        Ok(IngestReport {
            document_id: document.id,
            skipped: false,
            snippets: spans.len(),
            embedded,
            pending,
        })
    }

    async fn embed_best_effort(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let Some(embedder) = self.embedder.as_deref() else {
            warn!("embedding provider not configured; snippets stored without vectors");
            return vec![None; texts.len()];
        };

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.embedding.batch_size) {
            match embedder.embed_batch(batch).await {
                Ok(batch_vectors) if batch_vectors.len() == batch.len() => {
                    vectors.extend(batch_vectors.into_iter().map(Some));
                }
                Ok(batch_vectors) => {
                    warn!(
                        got = batch_vectors.len(),
                        expected = batch.len(),
                        "embedding batch size mismatch, dropping batch"
                    );
                    vectors.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
                Err(e) => {
                    warn!(error = %e, "embedding batch failed, continuing without vectors");
                    vectors.extend(std::iter::repeat_with(|| None).take(batch.len()));
                }
            }
        }
        vectors
    }

    // ============ Query ============

    /// One grounded conversation turn. Query-side embedding failure aborts
    /// the turn; an un-ingested project surfaces as `IndexNotFound`.
    pub async fn chat(&self, project_id: &str, message: &str) -> Result<ChatOutcome> {
        store::get_project(&self.pool, project_id).await?;

        let embedder = self
            .embedder
            .as_deref()
            .ok_or_else(|| Error::Provider("embedding provider is disabled".into()))?;
        let llm = self
            .llm
            .as_deref()
            .ok_or_else(|| Error::Provider("llm provider is disabled".into()))?;

        let snippets = store::list_by_project(&self.pool, project_id).await?;
        if snippets.is_empty() && !self.index.exists(project_id) {
            return Err(Error::IndexNotFound {
                project_id: project_id.to_string(),
            });
        }

        let query_vector = embedder.embed(message).await?;

        let ranked = rank::top_k(
            &snippets,
            &query_vector,
            self.config.retrieval.top_k,
            self.config.retrieval.min_similarity,
        );

        // Resolve passage texts from the owning documents' bodies.
        let mut bodies: HashMap<String, Document> = HashMap::new();
        let mut passages = Vec::with_capacity(ranked.len());
        for hit in ranked {
            let doc_id = hit.snippet.document_id.clone();
            if !bodies.contains_key(&doc_id) {
                let document = store::get_document(&self.pool, &doc_id).await?;
                bodies.insert(doc_id.clone(), document);
            }
            let body = &bodies[&doc_id].body;
            passages.push(RetrievedPassage {
                snippet_id: hit.snippet.id.clone(),
                document_id: doc_id,
                span: hit.snippet.span,
                text: slice_span(body, hit.snippet.span).to_string(),
                similarity: hit.similarity,
            });
        }

        let prompt = assemble_prompt(passages, self.config.retrieval.max_context_chars);
        let answer = llm.complete(&prompt.system, message).await?;

        let sources: Vec<SourceRef> = prompt
            .passages
            .iter()
            .map(|p| SourceRef {
                document_id: p.document_id.clone(),
                span: p.span,
            })
            .collect();

        {
            let mut log = self.conversations.lock().expect("conversation log poisoned");
            log.record_user(project_id, message);
            log.record_assistant(project_id, &answer, sources);
        }

        Ok(ChatOutcome {
            answer,
            passages: prompt.passages,
        })
    }

    pub fn history(&self, project_id: &str) -> Vec<ConversationTurn> {
        self.conversations
            .lock()
            .expect("conversation log poisoned")
            .history(project_id)
            .to_vec()
    }

    pub fn clear_conversation(&self, project_id: &str) {
        self.conversations
            .lock()
            .expect("conversation log poisoned")
            .clear(project_id);
    }

    // ============ Deletion ============

    /// Delete a document, its snippets, and its index nodes — all or
    /// nothing. Index nodes are removed first so a failure there leaves the
    /// authoritative rows untouched; the row deletes then share one
    /// transaction.
    pub async fn delete_document(&self, project_id: &str, document_id: &str) -> Result<()> {
        let document = store::get_document(&self.pool, document_id).await?;
        if document.project_id != project_id {
            return Err(Error::DocumentNotFound(document_id.to_string()));
        }

        let lock = self.locks.lock_for(project_id);
        let _guard = lock.lock().await;

        match self.index.delete_document(project_id, document_id) {
            Ok(_) => {}
            // No persisted index means no nodes to retract.
            Err(Error::IndexNotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let snippet_rows = store::list_by_document(&self.pool, document_id).await?.len();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM snippets WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(project_id, document_id, snippet_rows, "document deleted");
        Ok(())
    }

    // ============ Maintenance ============

    /// Regenerate the persisted index from the authoritative snippet store.
    pub async fn rebuild_index(&self, project_id: &str) -> Result<usize> {
        store::get_project(&self.pool, project_id).await?;
        let lock = self.locks.lock_for(project_id);
        let _guard = lock.lock().await;
        self.rebuild_index_locked(project_id).await
    }

    async fn rebuild_index_locked(&self, project_id: &str) -> Result<usize> {
        let snippets = store::list_by_project(&self.pool, project_id).await?;

        let mut bodies: HashMap<String, String> = HashMap::new();
        let mut nodes = Vec::with_capacity(snippets.len());
        for snippet in snippets {
            if !bodies.contains_key(&snippet.document_id) {
                let document = store::get_document(&self.pool, &snippet.document_id).await?;
                bodies.insert(snippet.document_id.clone(), document.body);
            }
            let body = &bodies[&snippet.document_id];
            nodes.push(IndexNode {
                node_id: snippet.id.clone(),
                document_id: snippet.document_id.clone(),
                span: snippet.span,
                text: slice_span(body, snippet.span).to_string(),
                vector: snippet.vector,
            });
        }

        self.index.rebuild(project_id, nodes)
    }

    /// Consistency check between the snippet store, document rows, and the
    /// persisted index. Returns human-readable anomalies; empty means clean.
    pub async fn check(&self, project_id: &str) -> Result<Vec<String>> {
        store::get_project(&self.pool, project_id).await?;
        let mut anomalies = Vec::new();

        let documents = store::list_documents(&self.pool, project_id).await?;
        let live_ids: HashMap<&str, usize> = documents
            .iter()
            .map(|d| (d.id.as_str(), d.body.chars().count()))
            .collect();

        let snippets = store::list_by_project(&self.pool, project_id).await?;
        for snippet in &snippets {
            match live_ids.get(snippet.document_id.as_str()) {
                Some(&len) if snippet.span.end > len => anomalies.push(format!(
                    "snippet {} span {}..{} exceeds document length {}",
                    snippet.id, snippet.span.start, snippet.span.end, len
                )),
                Some(_) => {}
                None => anomalies.push(format!(
                    "snippet {} references missing document {}",
                    snippet.id, snippet.document_id
                )),
            }
        }

        match self.index.load(project_id) {
            Ok(index) => {
                for doc_id in index.document_ids() {
                    if !live_ids.contains_key(doc_id.as_str()) {
                        anomalies.push(format!(
                            "index holds nodes for deleted document {doc_id}"
                        ));
                    }
                }
                for snippet in &snippets {
                    if !index.contains_node(&snippet.id) {
                        anomalies.push(format!("snippet {} missing from index", snippet.id));
                    }
                }
            }
            Err(Error::IndexNotFound { .. }) => {
                if !snippets.is_empty() {
                    anomalies.push("snippets exist but no index is persisted".to_string());
                }
            }
            Err(Error::IndexCorruption(reason)) => {
                anomalies.push(format!("persisted index unreadable: {reason}"));
            }
            Err(e) => return Err(e),
        }

        Ok(anomalies)
    }

    /// Highlight a cited span within a document's escaped text.
    pub async fn highlight(
        &self,
        document_id: &str,
        start: usize,
        end: usize,
    ) -> Result<String> {
        let document = store::get_document(&self.pool, document_id).await?;
        highlight::render_highlight(&document.body, start, end)
    }
}
