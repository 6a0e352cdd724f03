//! Background refresh of remote metrics for every connected session.
//!
//! Each tick re-collects metrics for all connected sessions concurrently and
//! sweeps expired credentials from the vault. Failures are logged and never
//! stop the loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::collector::MetricsCollector;
use crate::hub::registry::ConnectionRegistry;
use crate::hub::vault::CredentialVault;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct MetricsPoller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl MetricsPoller {
    /// Starts polling on the current runtime. The first tick fires immediately.
    ///
    /// A zero interval is raised to one millisecond.
    pub fn spawn(
        registry: Arc<ConnectionRegistry>,
        collector: Arc<MetricsCollector>,
        vault: Arc<CredentialVault>,
        interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let cancel = token.clone();
        let interval = interval.max(MIN_POLL_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Metrics poller started (every {:?})", interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        poll_once(&registry, &collector, &vault).await;
                    }
                }
            }

            info!("Metrics poller stopped");
        });

        Self { token, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the loop and waits for an in-flight tick to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Metrics poller task ended abnormally: {}", e);
        }
    }
}

/// One polling pass. Returns how many sessions were refreshed.
pub(crate) async fn poll_once(
    registry: &ConnectionRegistry,
    collector: &MetricsCollector,
    vault: &CredentialVault,
) -> usize {
    vault.sweep_expired();

    let targets: Vec<_> = registry
        .sessions()
        .into_iter()
        .filter(|s| s.is_connected())
        .filter_map(|s| s.transport().map(|t| (s.connection_id().to_string(), t)))
        .collect();

    let results = join_all(targets.iter().map(|(id, transport)| async move {
        (id, collector.collect(id, transport.as_ref()).await)
    }))
    .await;

    let mut refreshed = 0;
    for (id, result) in results {
        match result {
            Ok(_) => refreshed += 1,
            Err(e) => warn!("Metrics poll for {} failed: {}", id, e),
        }
    }
    debug!("Metrics poll refreshed {}/{} session(s)", refreshed, targets.len());
    refreshed
}
