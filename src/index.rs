//! Persisted per-project index: a durable, reloadable structure caching the
//! snippet table for structural retrieval.
//!
//! Each project owns one directory under the storage root holding three
//! logical stores:
//!
//! | File | Contents |
//! |------|----------|
//! | `docstore.json` | node texts + provenance (document id, span) |
//! | `index_store.json` | index id, node ordering, per-document node lists |
//! | `vector_store.json` | node id → embedding vector |
//!
//! The snippet table is the source of truth; this index is a materialized,
//! disposable cache that can always be regenerated from it via
//! [`IndexManager::rebuild`]. Persisting writes each store to a temp file and
//! renames it into place, so a crashed persist never leaves a torn store
//! visible to a subsequent load.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::Span;

const DOCSTORE_FILE: &str = "docstore.json";
const INDEX_STORE_FILE: &str = "index_store.json";
const VECTOR_STORE_FILE: &str = "vector_store.json";

/// One indexable unit: a snippet's text plus its provenance and vector.
#[derive(Debug, Clone)]
pub struct IndexNode {
    /// Stable id shared with the snippet row this node mirrors.
    pub node_id: String,
    pub document_id: String,
    pub span: Span,
    pub text: String,
    pub vector: Option<Vec<f32>>,
}

/// A node scored against a query during structural retrieval.
#[derive(Debug, Clone)]
pub struct ScoredNode {
    pub similarity: f32,
    pub node_id: String,
    pub document_id: String,
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocstoreEntry {
    document_id: String,
    start: usize,
    end: usize,
    text: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Docstore {
    nodes: HashMap<String, DocstoreEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexStore {
    index_id: String,
    /// Structural ordering: node ids in insertion order.
    node_order: Vec<String>,
    /// Per-document node lists, the unit of targeted deletion.
    documents: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VectorStore {
    vectors: HashMap<String, Vec<f32>>,
}

/// A loaded project index. Obtained from [`IndexManager::load`] or
/// [`IndexManager::build_or_update`]; mutations go back through the manager
/// so every change is re-persisted.
#[derive(Debug)]
pub struct ProjectIndex {
    docstore: Docstore,
    index_store: IndexStore,
    vector_store: VectorStore,
}

impl ProjectIndex {
    fn empty(project_id: &str) -> Self {
        Self {
            docstore: Docstore::default(),
            index_store: IndexStore {
                index_id: project_id.to_string(),
                node_order: Vec::new(),
                documents: HashMap::new(),
            },
            vector_store: VectorStore::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.index_store.node_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_store.node_order.is_empty()
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.docstore.nodes.contains_key(node_id)
    }

    /// Document ids that still own at least one node.
    pub fn document_ids(&self) -> Vec<String> {
        self.index_store.documents.keys().cloned().collect()
    }

    fn insert(&mut self, node: IndexNode) {
        self.docstore.nodes.insert(
            node.node_id.clone(),
            DocstoreEntry {
                document_id: node.document_id.clone(),
                start: node.span.start,
                end: node.span.end,
                text: node.text,
            },
        );
        self.index_store
            .documents
            .entry(node.document_id)
            .or_default()
            .push(node.node_id.clone());
        if let Some(vector) = node.vector {
            self.vector_store.vectors.insert(node.node_id.clone(), vector);
        }
        self.index_store.node_order.push(node.node_id);
    }

    fn remove_document(&mut self, document_id: &str) -> usize {
        let Some(node_ids) = self.index_store.documents.remove(document_id) else {
            return 0;
        };
        for node_id in &node_ids {
            self.docstore.nodes.remove(node_id);
            self.vector_store.vectors.remove(node_id);
        }
        self.index_store
            .node_order
            .retain(|id| !node_ids.contains(id));
        node_ids.len()
    }

    /// Dense retrieval over the vector store: linear scan in structural
    /// order, keep candidates strictly above the floor, cap at `k`.
    pub fn retrieve(&self, query_vector: &[f32], k: usize, min_similarity: f32) -> Vec<ScoredNode> {
        let mut candidates: Vec<ScoredNode> = Vec::new();

        for node_id in &self.index_store.node_order {
            let Some(vector) = self.vector_store.vectors.get(node_id) else {
                continue;
            };
            let similarity = cosine_similarity(query_vector, vector);
            if similarity <= min_similarity {
                continue;
            }
            // node_order entries are validated against the docstore on load
            if let Some(entry) = self.docstore.nodes.get(node_id) {
                candidates.push(ScoredNode {
                    similarity,
                    node_id: node_id.clone(),
                    document_id: entry.document_id.clone(),
                    span: Span::new(entry.start, entry.end),
                    text: entry.text.clone(),
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        candidates
    }
}

/// Owns the storage root and the load → mutate → persist cycle of every
/// project's [`ProjectIndex`].
#[derive(Debug, Clone)]
pub struct IndexManager {
    root: PathBuf,
}

impl IndexManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    /// Whether any persisted state exists for the project (the `Absent`
    /// state is the negation of this).
    pub fn exists(&self, project_id: &str) -> bool {
        self.project_dir(project_id).join(INDEX_STORE_FILE).exists()
    }

    /// Load a project's persisted index.
    ///
    /// # Errors
    ///
    /// `Error::IndexNotFound` when nothing was ever persisted for the
    /// project; `Error::IndexCorruption` when the stores are unreadable or
    /// inconsistent with each other.
    pub fn load(&self, project_id: &str) -> Result<ProjectIndex> {
        let dir = self.project_dir(project_id);
        if !dir.join(INDEX_STORE_FILE).exists() {
            return Err(Error::IndexNotFound {
                project_id: project_id.to_string(),
            });
        }

        let docstore: Docstore = read_store(&dir.join(DOCSTORE_FILE))?;
        let index_store: IndexStore = read_store(&dir.join(INDEX_STORE_FILE))?;
        let vector_store: VectorStore = read_store(&dir.join(VECTOR_STORE_FILE))?;

        // Cross-store consistency: the docstore and node_order must describe
        // the same node set, and every vector must belong to a known node.
        // The stores are renamed into place one by one, so a crash between
        // renames can leave them describing different generations; such a
        // torn state is unusable and must be rebuilt.
        for node_id in &index_store.node_order {
            if !docstore.nodes.contains_key(node_id) {
                return Err(Error::IndexCorruption(format!(
                    "index store references unknown node {node_id}"
                )));
            }
        }
        let ordered: std::collections::HashSet<&String> =
            index_store.node_order.iter().collect();
        for node_id in docstore.nodes.keys() {
            if !ordered.contains(node_id) {
                return Err(Error::IndexCorruption(format!(
                    "docstore holds node {node_id} missing from the index store"
                )));
            }
        }
        for node_id in vector_store.vectors.keys() {
            if !docstore.nodes.contains_key(node_id) {
                return Err(Error::IndexCorruption(format!(
                    "vector store references unknown node {node_id}"
                )));
            }
        }

        Ok(ProjectIndex {
            docstore,
            index_store,
            vector_store,
        })
    }

    /// Append `nodes` to the project's index, creating it when absent.
    ///
    /// Nodes whose id is already present are skipped, so repeated calls for
    /// the same source snippets never duplicate. Returns the number of nodes
    /// actually added.
    pub fn build_or_update(&self, project_id: &str, nodes: Vec<IndexNode>) -> Result<usize> {
        let mut index = match self.load(project_id) {
            Ok(index) => index,
            // First ingest: no persisted state is the normal case.
            Err(Error::IndexNotFound { .. }) => ProjectIndex::empty(project_id),
            Err(e) => return Err(e),
        };

        let mut added = 0usize;
        for node in nodes {
            if index.contains_node(&node.node_id) {
                debug!(node_id = %node.node_id, "node already indexed, skipping");
                continue;
            }
            index.insert(node);
            added += 1;
        }

        self.persist(project_id, &index)?;
        info!(project_id, added, total = index.len(), "persisted index updated");
        Ok(added)
    }

    /// Remove every node attributable to `document_id` and re-persist.
    /// Returns the number of nodes removed.
    pub fn delete_document(&self, project_id: &str, document_id: &str) -> Result<usize> {
        let mut index = self.load(project_id)?;
        let removed = index.remove_document(document_id);
        if removed > 0 {
            self.persist(project_id, &index)?;
        }
        info!(project_id, document_id, removed, "index nodes deleted");
        Ok(removed)
    }

    /// Replace the project's persisted state wholesale. Recovery path when
    /// the cache is corrupt: the caller regenerates `nodes` from the
    /// authoritative snippet store.
    pub fn rebuild(&self, project_id: &str, nodes: Vec<IndexNode>) -> Result<usize> {
        let mut index = ProjectIndex::empty(project_id);
        for node in nodes {
            if !index.contains_node(&node.node_id) {
                index.insert(node);
            }
        }
        let total = index.len();
        self.persist(project_id, &index)?;
        info!(project_id, total, "persisted index rebuilt");
        Ok(total)
    }

    /// Drop all persisted state for the project (back to `Absent`).
    pub fn remove(&self, project_id: &str) -> Result<()> {
        let dir = self.project_dir(project_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn persist(&self, project_id: &str, index: &ProjectIndex) -> Result<()> {
        let dir = self.project_dir(project_id);
        fs::create_dir_all(&dir)?;

        write_store(&dir, DOCSTORE_FILE, &index.docstore)?;
        write_store(&dir, INDEX_STORE_FILE, &index.index_store)?;
        write_store(&dir, VECTOR_STORE_FILE, &index.vector_store)?;
        Ok(())
    }
}

fn read_store<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)
        .map_err(|e| Error::IndexCorruption(format!("{}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::IndexCorruption(format!("{}: {e}", path.display())))
}

// Write-to-temp-then-rename so a crash mid-write never corrupts the store.
fn write_store<T: Serialize>(dir: &Path, name: &str, store: &T) -> Result<()> {
    let tmp = dir.join(format!("{name}.tmp"));
    let data = serde_json::to_vec_pretty(store)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, dir.join(name))?;
    Ok(())
}
