//! Bounded top-k cosine similarity ranking over stored snippets.
//!
//! A linear scan with a k-sized min-heap: O(N log k) time, O(k) memory,
//! where N is the snippet count of one project. Projects partition the
//! corpus, so the scan stays proportional to a single project's size and no
//! approximate-nearest-neighbor structure is needed.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::embedding::cosine_similarity;
use crate::models::StoredSnippet;

/// A snippet that cleared the relevance floor, with its similarity score.
#[derive(Debug, Clone)]
pub struct RankedSnippet {
    pub similarity: f32,
    pub snippet: StoredSnippet,
}

// Heap ordering: the *worst* candidate sits at the root so it can be evicted
// when a better one arrives. Worst = lowest similarity, then latest creation
// order. Similarities are finite (cosine guards against NaN), so the partial
// comparison below is total in practice.
struct HeapEntry(RankedSnippet);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the root is the worst entry.
        other
            .0
            .similarity
            .partial_cmp(&self.0.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.0.snippet.created_order.cmp(&other.0.snippet.created_order))
    }
}

/// Rank `snippets` against `query_vector`, keeping at most `k` results with
/// similarity strictly above `min_similarity`.
///
/// Results are sorted descending by similarity, ties broken by earlier
/// creation order. Snippets without a vector are skipped entirely.
pub fn top_k(
    snippets: &[StoredSnippet],
    query_vector: &[f32],
    k: usize,
    min_similarity: f32,
) -> Vec<RankedSnippet> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);

    for snippet in snippets {
        let Some(vector) = snippet.vector.as_deref() else {
            continue;
        };
        let similarity = cosine_similarity(query_vector, vector);
        if similarity <= min_similarity {
            continue;
        }

        heap.push(HeapEntry(RankedSnippet {
            similarity,
            snippet: snippet.clone(),
        }));
        if heap.len() > k {
            heap.pop();
        }
    }

    let mut results: Vec<RankedSnippet> = heap.into_iter().map(|e| e.0).collect();
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.snippet.created_order.cmp(&b.snippet.created_order))
    });
    results
}
