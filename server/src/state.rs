use std::sync::Arc;
use std::time::Duration;

use member_qa_retrieval::{BuildReport, RetrievalEngine};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::ReloadError;
use crate::messages::MessagesClient;

/// Shared state for all handlers
pub struct AppState {
    pub engine: RetrievalEngine,
    pub messages: MessagesClient,
}

impl AppState {
    pub fn new(engine: RetrievalEngine, messages: MessagesClient) -> Arc<Self> {
        Arc::new(Self { engine, messages })
    }

    /// Startup load: an unreachable messages API leaves an empty corpus.
    pub async fn load_initial(&self) -> Option<BuildReport> {
        let records = self.messages.fetch_or_empty().await;
        match self.engine.rebuild(records).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Initial index build failed, serving an empty corpus: {e}");
                None
            }
        }
    }

    /// Re-fetch messages and rebuild the index.
    ///
    /// Unlike [`AppState::load_initial`], a failed fetch keeps the current
    /// index instead of replacing it with an empty one.
    pub async fn reload(&self) -> Result<BuildReport, ReloadError> {
        let records = self.messages.fetch().await?;
        Ok(self.engine.rebuild(records).await?)
    }
}

/// Reload the corpus every `interval` until the task is aborted.
pub fn spawn_refresh(state: Arc<AppState>, interval: Duration) -> JoinHandle<()> {
    info!("Refreshing member messages every {}s", interval.as_secs());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already loaded.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match state.reload().await {
                Ok(report) => info!(
                    "Scheduled refresh indexed {} of {} messages",
                    report.indexed, report.received
                ),
                Err(e) => error!("Scheduled refresh failed, keeping current index: {e}"),
            }
        }
    })
}
