//! Proactive session renewal ahead of expiry.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::RefreshCoordinator;
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay between a completed refresh and the next one. Just under the session lifetime.
    pub interval: Duration,
    /// Delay before retrying a failed refresh.
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(22 * 60 * 60),
            retry_delay: Duration::from_secs(60),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Timer that renews the session through the same single-flight refresh as
/// expired requests, independent of request traffic.
pub struct ProactiveRefresh {
    coordinator: Arc<RefreshCoordinator>,
    session: Arc<Session>,
    config: SchedulerConfig,
    running: Mutex<Option<Running>>,
}

impl ProactiveRefresh {
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        session: Arc<Session>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            coordinator,
            session,
            config,
            running: Mutex::new(None),
        }
    }

    /// Schedules the first refresh one interval from now. Restarts the timer if already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            Self::cancel(previous).await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            Arc::clone(&self.coordinator),
            Arc::clone(&self.session),
            self.config.clone(),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        debug!(
            "Proactive refresh scheduled every {:?}",
            self.config.interval
        );
    }

    /// Cancels the pending timer. Safe to call any number of times.
    pub async fn stop(&self) {
        if let Some(running) = self.running.lock().await.take() {
            Self::cancel(running).await;
            debug!("Proactive refresh stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    async fn cancel(running: Running) {
        running.cancel.cancel();
        running.handle.abort();
        // Wait so nothing from the old task can fire after stop returns
        let _ = running.handle.await;
    }
}

impl Drop for ProactiveRefresh {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

async fn run(
    coordinator: Arc<RefreshCoordinator>,
    session: Arc<Session>,
    config: SchedulerConfig,
    cancel: CancellationToken,
) {
    let mut delay = config.interval;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(delay) => {}
        }
        if cancel.is_cancelled() || !session.is_authenticated() {
            debug!("Session no longer active, proactive refresh ends");
            break;
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = coordinator.refresh() => outcome,
        };

        // Measured from completion so cycles don't drift
        delay = match outcome {
            Ok(()) => {
                info!("Proactive session refresh succeeded");
                config.interval
            }
            Err(e) => {
                warn!(
                    "Proactive session refresh failed, retrying in {:?}: {e}",
                    config.retry_delay
                );
                config.retry_delay
            }
        };
    }
}
