use crate::infra::Runtime;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stayguard::compliance::SweepError;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Periodic sweep; the first tick fires immediately so a restart catches up right away.
pub(crate) fn spawn_sweep_task(
    runtime: Arc<Runtime>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            run_scheduled_sweep(runtime.clone()).await;
        }
    })
}

async fn run_scheduled_sweep(runtime: Arc<Runtime>) {
    let outcome = tokio::task::spawn_blocking(move || runtime.engine.run_sweep(Utc::now())).await;

    match outcome {
        Ok(Ok(report)) => info!(
            today = %report.today,
            transitions = report.switch_transitions(),
            failures = report.failures.len(),
            "scheduled compliance sweep complete"
        ),
        Ok(Err(SweepError::AlreadyRunning)) => {
            warn!("skipping scheduled sweep; an on-demand sweep is still running")
        }
        Ok(Err(err)) => error!(error = %err, "scheduled compliance sweep failed"),
        Err(join_error) => error!(error = %join_error, "scheduled sweep task panicked"),
    }
}
