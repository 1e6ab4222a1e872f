use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use member_qa_server::ServiceConfig;
use tracing_subscriber::EnvFilter;

/// Answer questions about members from their messages.
#[derive(Debug, Parser)]
#[command(name = "member-qa", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "MEMBER_QA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Minimum similarity for an answer to be returned.
    #[arg(long)]
    threshold: Option<f32>,

    /// Base URL of the messages API.
    #[arg(long)]
    messages_url: Option<String>,

    /// Re-fetch messages on this interval, in seconds.
    #[arg(long)]
    refresh_secs: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut ServiceConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(threshold) = self.threshold {
            config.retrieval.relevance_threshold = threshold;
        }
        if let Some(url) = self.messages_url {
            config.messages.base_url = url;
        }
        if let Some(secs) = self.refresh_secs {
            config.retrieval.refresh_interval_secs = Some(secs);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok())?;
    cli.apply(&mut config);

    member_qa_server::run(config).await
}
