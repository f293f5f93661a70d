use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attempt_throttle::config::{Args, ThrottleConfig};
use attempt_throttle::rate_limit::RateLimiter;
use attempt_throttle::replay::Replayer;
use attempt_throttle::{metrics, sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "attempt_throttle=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer().with_writer(std::io::stderr),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();
    let config = ThrottleConfig::load(&args).context("invalid configuration")?;
    let strategy = args.key_strategy();

    tracing::info!(
        "Rate limit: {} attempts per {} ms, block {} ms",
        config.limiter.max_attempts,
        config.limiter.window_ms,
        config.limiter.block_duration_ms
    );

    // timestamped input runs on its own clock, no wall-time sweeper
    let (mut replayer, sweep_task) = if args.timestamps {
        (Replayer::timed(config.limiter, strategy), None)
    } else {
        let limiter = Arc::new(RateLimiter::new(config.limiter));
        let handle = sweeper::spawn_sweeper(
            limiter.clone(),
            Duration::from_secs(config.sweeper.interval_secs),
        );
        (Replayer::live(limiter, strategy), handle)
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0;
    let mut skipped = 0;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        line_no += 1;
        match replayer.feed(line_no, &line, args.timestamps) {
            Ok(Some(decision)) => println!("{}", serde_json::to_string(&decision)?),
            Ok(None) => {}
            Err(e) => {
                skipped += 1;
                tracing::warn!("Skipping input: {e}");
            }
        }
    }

    tracing::info!(
        "Replayed {line_no} lines ({skipped} skipped), {} keys tracked",
        replayer.limiter().tracked_keys()
    );

    if let Some(handle) = sweep_task {
        handle.abort();
    }

    if args.metrics {
        eprint!("{}", metrics::render()?);
    }

    Ok(())
}
