use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatcher::Dispatcher;

#[cfg(feature = "tracing")]
fn trace_sweep_failure(tenant: &str, err: &crate::error::EngineError) {
    tracing::warn!(tenant = %tenant, error = %err, "retry sweep failed for tenant");
}

#[cfg(not(feature = "tracing"))]
fn trace_sweep_failure(_tenant: &str, _err: &crate::error::EngineError) {}

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Pause between sweep passes.
    pub interval: Duration,

    /// Retry window: failed deliveries older than this are left alone.
    pub max_age: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_age: Duration::from_secs(60 * 60),
        }
    }
}

/// Periodic background task that rescans failed deliveries and feeds
/// them back through the dispatcher's per-delivery execution path.
///
/// One pass covers every tenant that currently has failed deliveries
/// inside the window. A failing tenant sweep is logged and never stops
/// the pass. The task is stoppable at process shutdown.
pub struct RetrySweeper {
    is_running: Arc<AtomicBool>,
    notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl RetrySweeper {
    /// Spawn the sweep loop on the current runtime.
    pub fn spawn(dispatcher: Dispatcher, config: SweeperConfig) -> Self {
        let is_running = Arc::new(AtomicBool::new(true));
        let notify = Arc::new(Notify::new());

        let task_running = is_running.clone();
        let task_notify = notify.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the immediate first tick so the first sweep waits
            // a full interval.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = task_notify.notified() => {}
                }

                if !task_running.load(Ordering::SeqCst) {
                    return;
                }

                sweep_once(&dispatcher, config.max_age).await;
            }
        });

        Self {
            is_running,
            notify,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for the in-flight pass, if any, to finish.
    pub async fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        // notify_one stores a permit, so a loop that is mid-sweep still
        // observes the stop on its next wait.
        self.notify.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn sweep_once(dispatcher: &Dispatcher, max_age: Duration) {
    let tenants = match dispatcher.storage().tenants_with_failures(max_age).await {
        Ok(tenants) => tenants,
        Err(err) => {
            trace_sweep_failure("*", &err.into());
            return;
        }
    };

    for tenant in tenants {
        if let Err(err) = dispatcher.retry_failed(&tenant, max_age).await {
            trace_sweep_failure(&tenant.0, &err);
        }
    }
}
