//! Service configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables, then command-line flags (applied by the binary).

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use member_qa_retrieval::{EmbeddingProviderType, RetrievalConfig};
use serde::{Deserialize, Serialize};

/// Public messages API used when none is configured.
pub const DEFAULT_MESSAGES_URL: &str = "http://november7-730026606190.europe-west1.run.app";

/// Top-level configuration of the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub messages: MessagesConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where member messages are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MESSAGES_URL.to_string(),
            timeout_secs: 20,
        }
    }
}

impl MessagesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ServiceConfig {
    /// Load from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Apply `MEMBER_QA_*` overrides read through `lookup`.
    ///
    /// `OPENAI_API_KEY` is read by the OpenAI provider itself.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MEMBER_QA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MEMBER_QA_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("MEMBER_QA_PORT is not a port: {port}"))?;
        }
        if let Some(url) = lookup("MEMBER_QA_MESSAGES_URL") {
            self.messages.base_url = url;
        }
        if let Some(threshold) = lookup("MEMBER_QA_THRESHOLD") {
            self.retrieval.relevance_threshold = threshold
                .parse()
                .with_context(|| format!("MEMBER_QA_THRESHOLD is not a number: {threshold}"))?;
        }
        if let Some(threshold) = lookup("MEMBER_QA_MEMBER_THRESHOLD") {
            self.retrieval.member_threshold = threshold.parse().with_context(|| {
                format!("MEMBER_QA_MEMBER_THRESHOLD is not a number: {threshold}")
            })?;
        }
        if let Some(secs) = lookup("MEMBER_QA_REFRESH_SECS") {
            self.retrieval.refresh_interval_secs = Some(
                secs.parse()
                    .with_context(|| format!("MEMBER_QA_REFRESH_SECS is not a number: {secs}"))?,
            );
        }
        if let Some(provider) = lookup("MEMBER_QA_EMBEDDING_PROVIDER") {
            self.retrieval.embedding.provider = match provider.to_ascii_lowercase().as_str() {
                "hashing" => EmbeddingProviderType::Hashing,
                "openai" => EmbeddingProviderType::OpenAI,
                other => anyhow::bail!("unknown embedding provider: {other}"),
            };
        }
        if let Some(model) = lookup("MEMBER_QA_EMBEDDING_MODEL") {
            self.retrieval.embedding.model = Some(model);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.retrieval
            .validate()
            .context("invalid retrieval configuration")?;
        if self.messages.timeout_secs == 0 {
            anyhow::bail!("messages.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}
