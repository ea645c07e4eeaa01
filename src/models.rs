//! Core data models used throughout docchat.
//!
//! These types represent the projects, documents, and snippets that flow
//! through the ingestion and retrieval pipeline, plus the passage and
//! conversation shapes returned to callers.

use serde::{Deserialize, Serialize};

/// A half-open character range `[start, end)` into a document's body.
///
/// Offsets are counted in characters, not bytes, so they survive round-trips
/// through any renderer that works on text rather than encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// An isolation boundary for documents, snippets, and one persisted index.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

/// One uploaded source file with extracted full text.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub project_id: String,
    pub name: String,
    /// SHA-256 of the extracted body; identical re-uploads are skipped.
    pub content_hash: String,
    pub body: String,
    pub created_at: i64,
}

/// A persisted snippet row: one chunk span plus its embedding, if computed.
///
/// `vector` is `None` when the embedding provider failed for this chunk;
/// such snippets are excluded from similarity ranking, never scored as zero.
#[derive(Debug, Clone)]
pub struct StoredSnippet {
    pub id: String,
    pub document_id: String,
    pub span: Span,
    pub vector: Option<Vec<f32>>,
    pub created_order: i64,
}

/// A ranked passage handed to prompt assembly, with full provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    pub snippet_id: String,
    pub document_id: String,
    pub span: Span,
    pub text: String,
    pub similarity: f32,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A cited source region attached to an assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: String,
    pub span: Span,
}

/// One entry of a project's in-memory conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
}
