//! # Embeddings
//!
//! Text embedding generation and similarity math for member message
//! retrieval.
//!
//! ## Features
//!
//! - **Hashing provider**: deterministic local embedder, no model download
//! - **OpenAI provider**: any OpenAI-compatible `/embeddings` endpoint
//! - **Caching**: in-memory reuse of computed embeddings across rebuilds
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► cosine_similarity          │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  Hashing / OpenAI  ◄── CachedProvider                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod hashing;
pub mod provider;
pub mod similarity;

pub use cache::{CachedProvider, EmbeddingCache};
pub use error::{EmbeddingError, Result};
pub use hashing::{HashingProvider, is_stopword};
pub use provider::{EmbeddingProvider, OpenAIProvider};
pub use similarity::{cosine_similarity, dot_product, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
