// Persisted nearest-neighbor index over embedded text chunks
//
// One index per logical data domain, serialized as a single JSON file inside
// the domain's directory. Entries are written once at ingestion time; query
// serving only reads, so an `Arc<VectorIndex>` is freely shared.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embeddings::Embedder;
use crate::types::{AppError, AppResult};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
}

impl Document {
    pub fn new(page_content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: DocumentMetadata {
                source: source.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexEntry {
    embedding: Vec<f32>,
    document: Document,
}

#[derive(Default, Serialize, Deserialize)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, embedding: Vec<f32>, document: Document) {
        self.entries.push(IndexEntry {
            embedding,
            document,
        });
    }

    /// Top-k cosine similarity search. Ties keep insertion order.
    pub fn similarity_search(&self, query: &[f32], k: usize) -> Vec<Document> {
        let mut scored: Vec<(f32, &Document)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(query, &entry.embedding), &entry.document))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub fn save(&self, dir: &Path) -> AppResult<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::Internal(format!("Failed to create index dir: {}", e)))?;
        let path = dir.join(INDEX_FILE);
        let json = serde_json::to_vec(self)
            .map_err(|e| AppError::Internal(format!("Failed to serialize index: {}", e)))?;
        std::fs::write(&path, json)
            .map_err(|e| AppError::Internal(format!("Failed to write index: {}", e)))?;
        info!(path = %path.display(), entries = self.entries.len(), "Vector index saved");
        Ok(())
    }

    pub fn load(dir: &Path) -> AppResult<Self> {
        let path = dir.join(INDEX_FILE);
        let bytes = std::fs::read(&path).map_err(|e| {
            AppError::Internal(format!("Failed to read index at {}: {}", path.display(), e))
        })?;
        let index: VectorIndex = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Internal(format!("Failed to parse index: {}", e)))?;
        info!(path = %path.display(), entries = index.entries.len(), "Vector index loaded");
        Ok(index)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A vector index paired with the embedder that produced it, queryable by
/// text. This is what retriever tools wrap.
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
}

impl Retriever {
    pub const DEFAULT_K: usize = 4;

    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            k: Self::DEFAULT_K,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub async fn retrieve(&self, query: &str) -> AppResult<Vec<Document>> {
        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = vectors
            .first()
            .ok_or_else(|| AppError::Embedding("Embedder returned no vector for query".to_string()))?;
        Ok(self.index.similarity_search(query_vector, self.k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            // Deterministic: axis-aligned unit vectors by first byte.
            Ok(texts
                .iter()
                .map(|t| match t.bytes().next() {
                    Some(b'a') => vec![1.0, 0.0, 0.0],
                    Some(b'b') => vec![0.0, 1.0, 0.0],
                    _ => vec![0.0, 0.0, 1.0],
                })
                .collect())
        }
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new();
        index.add(vec![1.0, 0.0, 0.0], Document::new("alpha", "audit_data"));
        index.add(vec![0.9, 0.1, 0.0], Document::new("almost alpha", "audit_data"));
        index.add(vec![0.0, 1.0, 0.0], Document::new("beta", "audit_data"));
        index.add(vec![0.0, 0.0, 1.0], Document::new("gamma", "audit_data"));
        index
    }

    #[test]
    fn test_similarity_search_orders_by_cosine() {
        let index = sample_index();
        let results = index.similarity_search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].page_content, "alpha");
        assert_eq!(results[1].page_content, "almost alpha");
    }

    #[test]
    fn test_similarity_search_caps_at_index_size() {
        let index = sample_index();
        let results = index.similarity_search(&[0.0, 1.0, 0.0], 10);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].page_content, "beta");
    }

    #[test]
    fn test_cosine_handles_zero_and_mismatched_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index = sample_index();
        index.save(dir.path()).unwrap();

        let loaded = VectorIndex::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 4);
        let results = loaded.similarity_search(&[0.0, 0.0, 1.0], 1);
        assert_eq!(results[0].page_content, "gamma");
    }

    #[test]
    fn test_load_missing_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VectorIndex::load(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_retriever_embeds_query_and_searches() {
        let retriever = Retriever::new(Arc::new(sample_index()), Arc::new(UnitEmbedder)).with_k(2);
        let docs = retriever.retrieve("beta question").await.unwrap();
        assert_eq!(docs[0].page_content, "beta");
    }
}
