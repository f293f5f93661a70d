//! Replays recorded attempts through a limiter.
//!
//! Input is one attempt per line, either `<key>` or, in timestamp mode,
//! `<ms-since-epoch> <key>`. Blank lines and `#` comments are skipped.

use std::sync::Arc;

use serde::Serialize;

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::config::RateLimiterConfig;
use crate::error::ReplayError;
use crate::key::KeyStrategy;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub line: usize,
    pub at_ms: Option<u64>,
    pub raw_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub line: usize,
    pub at_ms: u64,
    pub key: String,
    pub limited: bool,
    pub remaining_attempts: u32,
    pub retry_after_ms: u64,
}

pub fn parse_line(
    line_no: usize,
    line: &str,
    timestamps: bool,
) -> Result<Option<Attempt>, ReplayError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    if !timestamps {
        return Ok(Some(Attempt {
            line: line_no,
            at_ms: None,
            raw_key: line.to_string(),
        }));
    }

    let (ts, key) = line
        .split_once(char::is_whitespace)
        .ok_or(ReplayError::MissingKey { line: line_no })?;
    let at_ms = ts.parse::<u64>().map_err(|_| ReplayError::BadTimestamp {
        line: line_no,
        value: ts.to_string(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ReplayError::MissingKey { line: line_no });
    }

    Ok(Some(Attempt {
        line: line_no,
        at_ms: Some(at_ms),
        raw_key: key.to_string(),
    }))
}

pub struct Replayer {
    limiter: Arc<RateLimiter>,
    // only set in timestamp mode
    clock: Option<Arc<ManualClock>>,
    strategy: KeyStrategy,
    last_ms: Option<u64>,
}

impl Replayer {
    /// Replays against the wall clock; attempt timestamps are ignored.
    pub fn live(limiter: Arc<RateLimiter>, strategy: KeyStrategy) -> Self {
        Self {
            limiter,
            clock: None,
            strategy,
            last_ms: None,
        }
    }

    /// Replays on a manual clock driven by each attempt's timestamp.
    pub fn timed(config: RateLimiterConfig, strategy: KeyStrategy) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = Arc::new(RateLimiter::with_clock(config, clock.clone()));
        Self {
            limiter,
            clock: Some(clock),
            strategy,
            last_ms: None,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Parses and applies one input line. `Ok(None)` for blank and comment lines.
    ///
    /// A rejected line leaves the limiter and the replay clock untouched.
    pub fn feed(
        &mut self,
        line_no: usize,
        line: &str,
        timestamps: bool,
    ) -> Result<Option<Decision>, ReplayError> {
        match parse_line(line_no, line, timestamps)? {
            Some(attempt) => self.apply(&attempt).map(Some),
            None => Ok(None),
        }
    }

    pub fn apply(&mut self, attempt: &Attempt) -> Result<Decision, ReplayError> {
        if let (Some(clock), Some(at)) = (&self.clock, attempt.at_ms) {
            if let Some(previous) = self.last_ms {
                if at < previous {
                    return Err(ReplayError::NonMonotonic {
                        line: attempt.line,
                        previous,
                        got: at,
                    });
                }
            }
            clock.set(at);
            self.last_ms = Some(at);
        }

        let key = self.strategy.derive(&attempt.raw_key);
        let limited = self.limiter.is_rate_limited(&key);
        let status = self.limiter.status(&key);
        let at_ms = match &self.clock {
            Some(clock) => clock.now_ms(),
            None => SystemClock.now_ms(),
        };

        Ok(Decision {
            line: attempt.line,
            at_ms,
            key,
            limited,
            remaining_attempts: status.remaining_attempts,
            retry_after_ms: status.retry_after_ms,
        })
    }
}
