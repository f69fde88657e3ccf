//! Periodic resolution timer.
//!
//! The ticker owns the [`ActivityResolver`] and re-resolves the schedule on
//! every tick, publishing the latest [`ResolutionView`] on a watch channel.
//! Dropping the ticker always cancels its task.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::models::ScheduleDocument;
use crate::resolver::{ActivityResolver, ResolutionView};

/// Latest schedule document, kept current by a storage subscription
pub type ScheduleSource = Arc<RwLock<Option<ScheduleDocument>>>;

pub struct ResolverTicker {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    latest: watch::Receiver<ResolutionView>,
}

impl ResolverTicker {
    /// Spawns the tick loop. The first tick runs immediately.
    pub fn start(
        mut resolver: ActivityResolver,
        schedule: ScheduleSource,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(ResolutionView::idle(clock.now()));
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("resolver_ticker_cancelled");
                        break;
                    }
                    _ = ticks.tick() => {
                        let view = {
                            let document = schedule.read().unwrap_or_else(|p| p.into_inner());
                            resolver.tick(document.as_ref(), clock.now())
                        };
                        tx.send_replace(view);
                    }
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "resolver_ticker_started");
        Self {
            cancel,
            handle: Some(handle),
            latest: rx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolutionView> {
        self.latest.clone()
    }

    pub fn latest(&self) -> ResolutionView {
        self.latest.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Cancels the tick loop and waits for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "resolver_ticker_join_failed");
            }
        }
        info!("resolver_ticker_stopped");
    }
}

impl Drop for ResolverTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
