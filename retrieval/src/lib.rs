//! # Retrieval Engine
//!
//! Answers a free-text question with the single most similar member
//! message, or reports that no message is relevant.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Retrieval Engine                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  RawRecord ──► clean ──► RecordStore ──► embed_batch            │
//! │                                               │                 │
//! │                                               ▼                 │
//! │                                         VectorIndex             │
//! │                                               │                 │
//! │  question ──► clean ──► embed ──► top_k(1) ◄──┘                 │
//! │             (named member: their records only)                  │
//! │                                      │                          │
//! │                                      ▼                          │
//! │                         score >= threshold ?                    │
//! │                          Found : NotFound                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use member_qa_retrieval::{RetrievalConfig, RetrievalEngine};
//!
//! let engine = RetrievalEngine::from_config(&RetrievalConfig::default())?;
//! engine.rebuild(records).await?;
//!
//! match engine.answer("Who is looking for an antiques dealer?").await? {
//!     MatchResult::Found { record, score } => println!("{}: {}", record.identity, record.text),
//!     MatchResult::NotFound => println!("no match"),
//! }
//! ```

pub mod clean;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod members;
pub mod record;

pub use clean::{Cleaner, clean};
pub use config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig};
pub use engine::{BuildReport, EngineStats, IndexSnapshot, MatchResult, RetrievalEngine};
pub use error::{Result, RetrievalError};
pub use index::{ScoredRecord, VectorIndex};
pub use members::{MemberDirectory, MemberMention};
pub use record::{RawRecord, Record, RecordId, RecordStore};

// Re-export from dependencies for convenience
pub use member_qa_embeddings::{EmbeddingProvider, HashingProvider};
