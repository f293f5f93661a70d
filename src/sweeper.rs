use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use crate::rate_limit::RateLimiter;

// Idle record sweep - runs every `every` until the task is dropped/aborted
pub async fn run_sweeper(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = interval(every);

    tracing::info!("Idle record sweeper started (interval: {:?})", every);

    loop {
        interval.tick().await;
        let evicted = limiter.sweep_idle();
        tracing::debug!(
            "Sweep pass: evicted={evicted}, tracked={}",
            limiter.tracked_keys()
        );
    }
}

// None when the interval is zero (sweeping disabled)
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        tracing::info!("Idle record sweeper disabled");
        return None;
    }
    Some(tokio::spawn(run_sweeper(limiter, every)))
}
