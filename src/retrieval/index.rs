// src/retrieval/index.rs
//! Brute-force cosine k-NN over an append-only document list.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::event::EventRecord;

/// An indexed record.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: u64,
    pub record: EventRecord,
    /// Text the embedding was computed from.
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct KnnIndex {
    docs: Vec<Document>,
}

impl KnnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append and return the assigned id (insertion position).
    pub fn insert(
        &mut self,
        record: EventRecord,
        text: String,
        embedding: Vec<f32>,
        indexed_at: DateTime<Utc>,
    ) -> u64 {
        let id = self.docs.len() as u64;
        self.docs.push(Document {
            id,
            record,
            text,
            embedding,
            indexed_at,
        });
        id
    }

    /// Top `k` by cosine similarity, best first. Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, &Document)> {
        let mut scored: Vec<(f32, &Document)> = self
            .docs
            .iter()
            .map(|d| (cosine(query, &d.embedding), d))
            .collect();
        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
