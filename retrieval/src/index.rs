//! Vector index over the record store.
//!
//! Each stored vector carries the [`RecordId`] of its record, so alignment
//! never depends on two parallel lists staying in step. Scoring is an exact
//! linear scan with cosine similarity.

use std::sync::Arc;

use member_qa_embeddings::{Embedding, dot_product, normalize};
use ordered_float::OrderedFloat;
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::record::{Record, RecordId, RecordStore};

/// Scores closer than this are treated as equal; the earlier record wins.
pub const TIE_EPSILON: f32 = 1e-6;

/// A stored vector and the record it belongs to.
#[derive(Debug, Clone)]
struct IndexEntry {
    record_id: RecordId,

    /// Unit-length embedding, or all zeros.
    embedding: Embedding,
}

/// A record with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: Arc<Record>,
    pub score: f32,
}

/// Immutable index pairing every record of a store with its vector.
#[derive(Debug)]
pub struct VectorIndex {
    records: Arc<RecordStore>,
    entries: Vec<IndexEntry>,
    dimension: usize,
    model: String,
}

impl VectorIndex {
    /// Build an index from a record store and one vector per record, given
    /// in store order.
    ///
    /// Vectors are normalized on the way in so scoring reduces to a dot
    /// product.
    pub fn build(
        records: Arc<RecordStore>,
        vectors: Vec<Embedding>,
        model: impl Into<String>,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }
        if records.len() != vectors.len() {
            return Err(RetrievalError::SizeMismatch {
                records: records.len(),
                vectors: vectors.len(),
            });
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        let mut entries = Vec::with_capacity(vectors.len());
        for (record, mut embedding) in records.iter().zip(vectors) {
            if embedding.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            normalize(&mut embedding);
            entries.push(IndexEntry {
                record_id: record.id,
                embedding,
            });
        }

        let model = model.into();
        debug!(
            "Built vector index: {} entries, dimension {dimension}, model {model}",
            entries.len()
        );

        Ok(Self {
            records,
            entries,
            dimension,
            model,
        })
    }

    /// Up to `k` records ordered by descending cosine similarity to `query`.
    ///
    /// Scores within [`TIE_EPSILON`] of each other keep corpus order.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        self.top_k_where(query, k, |_| true)
    }

    /// Like [`VectorIndex::top_k`], over only the records `keep` accepts.
    pub fn top_k_where<F>(&self, query: &[f32], k: usize, keep: F) -> Result<Vec<ScoredRecord>>
    where
        F: Fn(RecordId) -> bool,
    {
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scores = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let score = dot_product(&query, &entry.embedding)?;
            scores.push(if score.is_nan() {
                f32::NEG_INFINITY
            } else {
                score
            });
        }

        // Repeated selection scan: a later entry only displaces the current
        // best when it wins by more than the epsilon.
        let mut taken: Vec<bool> = self.entries.iter().map(|e| !keep(e.record_id)).collect();
        let candidates = taken.iter().filter(|t| !**t).count();
        let mut results = Vec::with_capacity(k.min(candidates));
        for _ in 0..k.min(candidates) {
            let mut best: Option<usize> = None;
            for (i, score) in scores.iter().enumerate() {
                if taken[i] {
                    continue;
                }
                match best {
                    Some(b) if OrderedFloat(*score) <= OrderedFloat(scores[b] + TIE_EPSILON) => {}
                    _ => best = Some(i),
                }
            }

            let Some(best) = best else { break };
            taken[best] = true;
            results.push(ScoredRecord {
                record: self.record_for(&self.entries[best])?,
                score: scores[best],
            });
        }

        Ok(results)
    }

    fn record_for(&self, entry: &IndexEntry) -> Result<Arc<Record>> {
        self.records
            .get(entry.record_id)
            .cloned()
            .ok_or(RetrievalError::UnknownRecord(entry.record_id))
    }

    /// The record store this index was built over.
    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Model the stored vectors were produced with.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that every stored vector pairs with a distinct record of the
    /// store and that the counts agree.
    pub fn is_consistent(&self) -> bool {
        self.entries.len() == self.records.len()
            && self
                .entries
                .iter()
                .zip(self.records.iter())
                .all(|(entry, record)| entry.record_id == record.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean;
    use crate::record::RawRecord;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;

    fn store(texts: &[&str]) -> Arc<RecordStore> {
        let ts = DateTime::parse_from_rfc3339("2025-01-02T03:04:05+00:00").unwrap();
        Arc::new(RecordStore::build(
            texts.iter().map(|t| RawRecord::new("Member", ts, *t)),
            clean,
        ))
    }

    fn texts(results: &[ScoredRecord]) -> Vec<&str> {
        results.iter().map(|r| r.record.text.as_str()).collect()
    }

    #[test]
    fn test_build_rejects_empty_corpus() {
        let err = VectorIndex::build(store(&[]), Vec::new(), "m").unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyCorpus));
    }

    #[test]
    fn test_build_rejects_size_mismatch() {
        let err = VectorIndex::build(store(&["a", "b"]), vec![vec![1.0, 0.0]], "m").unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::SizeMismatch {
                records: 2,
                vectors: 1
            }
        ));
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let err = VectorIndex::build(
            store(&["a", "b"]),
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
            "m",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_top_k_orders_by_score() {
        let index = VectorIndex::build(
            store(&["a", "b", "c"]),
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.7, 0.7, 0.0]],
            "m",
        )
        .unwrap();
        assert!(index.is_consistent());

        let results = index.top_k(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(texts(&results), vec!["a", "c"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);

        let all = index.top_k(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(texts(&all), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_top_k_zero() {
        let index = VectorIndex::build(store(&["a"]), vec![vec![1.0]], "m").unwrap();
        assert!(index.top_k(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_prefer_earlier_record() {
        let index = VectorIndex::build(
            store(&["first", "second", "third"]),
            vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0]],
            "m",
        )
        .unwrap();

        for _ in 0..10 {
            let results = index.top_k(&[1.0, 0.0], 3).unwrap();
            assert_eq!(texts(&results), vec!["second", "third", "first"]);
        }
    }

    #[test]
    fn test_top_k_where_skips_rejected_records() {
        let index = VectorIndex::build(
            store(&["a", "b", "c"]),
            vec![vec![1.0, 0.0], vec![0.8, 0.6], vec![0.0, 1.0]],
            "m",
        )
        .unwrap();

        let results = index
            .top_k_where(&[1.0, 0.0], 3, |id| id.position() != 0)
            .unwrap();
        assert_eq!(texts(&results), vec!["b", "c"]);
        assert!((results[0].score - 0.8).abs() < 1e-6);

        assert!(index.top_k_where(&[1.0, 0.0], 1, |_| false).unwrap().is_empty());
    }

    #[test]
    fn test_query_dimension_checked() {
        let index = VectorIndex::build(store(&["a"]), vec![vec![1.0, 0.0]], "m").unwrap();
        assert!(matches!(
            index.top_k(&[1.0], 1),
            Err(RetrievalError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
