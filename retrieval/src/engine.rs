//! Retrieval engine: the question-answering core.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use member_qa_embeddings::EmbeddingProvider;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clean::{Cleaner, clean};
use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::index::VectorIndex;
use crate::members::{MemberDirectory, MemberMention};
use crate::record::{RawRecord, Record, RecordId, RecordStore};

/// Outcome of answering a question.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// The best record scored at or above the relevance threshold.
    ///
    /// `score` is the cosine similarity, except for a question that only
    /// names a member, where it is the share of the name that matched.
    Found { record: Arc<Record>, score: f32 },

    /// No record is relevant enough, or the corpus is empty.
    NotFound,
}

impl MatchResult {
    pub fn is_found(&self) -> bool {
        matches!(self, MatchResult::Found { .. })
    }
}

/// One immutable generation of the index, served until a rebuild replaces it.
#[derive(Debug)]
pub struct IndexSnapshot {
    /// `None` when the corpus was empty.
    index: Option<VectorIndex>,
    members: MemberDirectory,
    built_at: Option<DateTime<Utc>>,
}

impl IndexSnapshot {
    fn empty(built_at: Option<DateTime<Utc>>) -> Self {
        Self {
            index: None,
            members: MemberDirectory::default(),
            built_at,
        }
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn members(&self) -> &MemberDirectory {
        &self.members
    }

    pub fn record_count(&self) -> usize {
        self.index.as_ref().map_or(0, VectorIndex::len)
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }
}

/// Summary of one rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Raw records handed to the rebuild.
    pub received: usize,

    /// Records now searchable.
    pub indexed: usize,

    /// Records excluded because their text cleaned to nothing.
    pub dropped: usize,

    pub model: String,
    pub elapsed_ms: u64,
}

/// Statistics about the engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub records: usize,
    pub model: String,
    pub dimension: usize,
    pub relevance_threshold: f32,
    pub member_threshold: f32,
    pub built_at: Option<DateTime<Utc>>,
}

/// Answers questions by nearest-neighbour search over member messages.
///
/// The engine owns the current [`IndexSnapshot`] behind a lock that is held
/// only long enough to clone or replace an `Arc`. Answers score against the
/// snapshot they started with; rebuilds construct a fresh snapshot and swap
/// it in whole.
pub struct RetrievalEngine {
    provider: Arc<dyn EmbeddingProvider>,
    cleaner: Cleaner,
    threshold: f32,
    member_threshold: f32,
    member_matching: bool,
    answer_timeout: Duration,
    snapshot: RwLock<Arc<IndexSnapshot>>,

    /// Serializes rebuilds so they never interleave.
    rebuild_lock: Mutex<()>,
}

impl RetrievalEngine {
    /// Create a new engine builder.
    pub fn builder(provider: Arc<dyn EmbeddingProvider>) -> RetrievalEngineBuilder {
        RetrievalEngineBuilder::new(provider)
    }

    /// Create an engine from configuration, instantiating its provider.
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        config.validate()?;
        let provider = config.embedding.build_provider()?;
        Self::builder(provider)
            .with_threshold(config.relevance_threshold)
            .with_member_threshold(config.member_threshold)
            .with_member_matching(config.member_matching)
            .with_answer_timeout(config.answer_timeout())
            .build()
    }

    /// Replace the corpus with `raw` records.
    ///
    /// On failure the previous snapshot stays in service. An empty corpus is
    /// not a failure: it installs an empty snapshot that answers every
    /// question with [`MatchResult::NotFound`].
    pub async fn rebuild(&self, raw: Vec<RawRecord>) -> Result<BuildReport> {
        let _guard = self.rebuild_lock.lock().await;
        let start = Instant::now();
        let received = raw.len();

        let store = Arc::new(RecordStore::build(raw, self.cleaner));
        let dropped = store.dropped();
        info!(
            "Rebuilding index: {received} messages received, {} usable",
            store.len()
        );

        let vectors = self.provider.embed_batch(&store.texts()).await?;
        let members = MemberDirectory::build(&store);
        let snapshot = match VectorIndex::build(store, vectors, self.provider.model()) {
            Ok(index) => IndexSnapshot {
                index: Some(index),
                members,
                built_at: Some(Utc::now()),
            },
            Err(RetrievalError::EmptyCorpus) => {
                warn!("No usable messages; every question will be answered as not found");
                IndexSnapshot::empty(Some(Utc::now()))
            }
            Err(e) => {
                warn!("Index rebuild failed, keeping previous index: {e}");
                return Err(e);
            }
        };

        let report = BuildReport {
            received,
            indexed: snapshot.record_count(),
            dropped,
            model: self.provider.model().to_string(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        *self.snapshot.write().await = Arc::new(snapshot);

        info!(
            "Index ready: {} records indexed, {} dropped, {}ms",
            report.indexed, report.dropped, report.elapsed_ms
        );
        Ok(report)
    }

    /// Answer a question with the most similar record, if relevant enough.
    ///
    /// Fails with [`RetrievalError::Timeout`] when the answer takes longer
    /// than the configured deadline.
    pub async fn answer(&self, question: &str) -> Result<MatchResult> {
        tokio::time::timeout(self.answer_timeout, self.answer_unbounded(question))
            .await
            .map_err(|_| RetrievalError::Timeout(self.answer_timeout))?
    }

    async fn answer_unbounded(&self, question: &str) -> Result<MatchResult> {
        let snapshot = self.snapshot().await;
        let Some(index) = snapshot.index() else {
            debug!("Answering against an empty corpus");
            return Ok(MatchResult::NotFound);
        };

        let cleaned = (self.cleaner)(question);
        let mention = if self.member_matching {
            snapshot.members().find(&cleaned)
        } else {
            None
        };

        let Some(mention) = mention else {
            return self
                .best_match(index, &cleaned, |_| true, self.threshold)
                .await;
        };

        debug!(
            "Question names {:?}; searching their {} records",
            mention.identities,
            mention.records.len()
        );

        if !mention.has_topic() {
            return Ok(latest_record(index, &mention));
        }

        let allowed: HashSet<RecordId> = mention.records.iter().copied().collect();
        self.best_match(
            index,
            &mention.remainder,
            |id| allowed.contains(&id),
            self.member_threshold,
        )
        .await
    }

    async fn best_match<F>(
        &self,
        index: &VectorIndex,
        text: &str,
        keep: F,
        threshold: f32,
    ) -> Result<MatchResult>
    where
        F: Fn(RecordId) -> bool,
    {
        let query = self
            .provider
            .embed(text)
            .await
            .map_err(RetrievalError::QueryEmbeddingFailure)?;

        let Some(best) = index.top_k_where(&query, 1, keep)?.into_iter().next() else {
            return Ok(MatchResult::NotFound);
        };

        debug!(
            "Best match {} scored {:.4} (threshold {:.4})",
            best.record.id, best.score, threshold
        );

        if best.score >= threshold {
            Ok(MatchResult::Found {
                record: best.record,
                score: best.score,
            })
        } else {
            Ok(MatchResult::NotFound)
        }
    }

    /// The snapshot currently being served.
    pub async fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn member_threshold(&self) -> f32 {
        self.member_threshold
    }

    /// Get engine statistics.
    pub async fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot().await;
        EngineStats {
            records: snapshot.record_count(),
            model: self.provider.model().to_string(),
            dimension: self.provider.dimension(),
            relevance_threshold: self.threshold,
            member_threshold: self.member_threshold,
            built_at: snapshot.built_at(),
        }
    }
}

/// The newest record of the mentioned members; the earlier one on equal
/// timestamps.
fn latest_record(index: &VectorIndex, mention: &MemberMention) -> MatchResult {
    let mut latest: Option<&Arc<Record>> = None;
    for record in mention
        .records
        .iter()
        .filter_map(|id| index.records().get(*id))
    {
        if latest.is_none_or(|best| record.timestamp > best.timestamp) {
            latest = Some(record);
        }
    }

    match latest {
        Some(record) => MatchResult::Found {
            record: Arc::clone(record),
            score: mention.confidence,
        },
        None => MatchResult::NotFound,
    }
}

/// Builder for [`RetrievalEngine`].
pub struct RetrievalEngineBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    cleaner: Cleaner,
    threshold: f32,
    member_threshold: f32,
    member_matching: bool,
    answer_timeout: Duration,
}

impl RetrievalEngineBuilder {
    /// Create a new builder with default threshold, timeout and cleaner.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let defaults = RetrievalConfig::default();
        Self {
            provider,
            cleaner: clean,
            threshold: defaults.relevance_threshold,
            member_threshold: defaults.member_threshold,
            member_matching: defaults.member_matching,
            answer_timeout: defaults.answer_timeout(),
        }
    }

    /// Set the relevance threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the threshold used when a question names a member.
    pub fn with_member_threshold(mut self, threshold: f32) -> Self {
        self.member_threshold = threshold;
        self
    }

    /// Turn member-name restriction on or off.
    pub fn with_member_matching(mut self, enabled: bool) -> Self {
        self.member_matching = enabled;
        self
    }

    /// Set the per-answer deadline.
    pub fn with_answer_timeout(mut self, timeout: Duration) -> Self {
        self.answer_timeout = timeout;
        self
    }

    /// Replace the text cleaner used for both corpus and questions.
    pub fn with_cleaner(mut self, cleaner: Cleaner) -> Self {
        self.cleaner = cleaner;
        self
    }

    /// Build the engine with an empty corpus.
    pub fn build(self) -> Result<RetrievalEngine> {
        if !self.provider.is_available() {
            return Err(RetrievalError::ModelUnavailable(format!(
                "provider {} is not available",
                self.provider.name()
            )));
        }

        Ok(RetrievalEngine {
            provider: self.provider,
            cleaner: self.cleaner,
            threshold: self.threshold,
            member_threshold: self.member_threshold,
            member_matching: self.member_matching,
            answer_timeout: self.answer_timeout,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty(None))),
            rebuild_lock: Mutex::new(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use member_qa_embeddings::HashingProvider;
    use pretty_assertions::assert_eq;

    fn engine() -> RetrievalEngine {
        RetrievalEngine::builder(Arc::new(HashingProvider::default()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_engine_answers_not_found() {
        let engine = engine();
        assert_eq!(
            engine.answer("anything at all").await.unwrap(),
            MatchResult::NotFound
        );
        assert_eq!(engine.stats().await.records, 0);
        assert_eq!(engine.stats().await.built_at, None);
    }

    #[tokio::test]
    async fn test_rebuild_with_only_blank_messages() {
        let engine = engine();
        let ts = DateTime::parse_from_rfc3339("2025-03-01T10:00:00+00:00").unwrap();
        let report = engine
            .rebuild(vec![RawRecord::new("Layla", ts, "   ")])
            .await
            .unwrap();

        assert_eq!(report.received, 1);
        assert_eq!(report.indexed, 0);
        assert_eq!(report.dropped, 1);
        assert!(engine.stats().await.built_at.is_some());
        assert_eq!(engine.answer("Layla").await.unwrap(), MatchResult::NotFound);
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_threshold() {
        let config = RetrievalConfig::default().with_threshold(2.0);
        assert!(matches!(
            RetrievalEngine::from_config(&config),
            Err(RetrievalError::Config(_))
        ));
    }
}
