use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, TextEncoder, register_counter, register_gauge};

use crate::error::MetricsError;

lazy_static! {
    pub static ref CHECKS_TOTAL: Counter =
        register_counter!("attempt_throttle_checks_total", "Total number of rate limit checks").unwrap();
    pub static ref REJECTIONS_TOTAL: Counter =
        register_counter!("attempt_throttle_rejections_total", "Checks that were rate limited").unwrap();
    pub static ref BLOCKS_TOTAL: Counter =
        register_counter!("attempt_throttle_blocks_total", "Keys that entered the blocked state").unwrap();
    pub static ref EVICTIONS_TOTAL: Counter =
        register_counter!("attempt_throttle_evictions_total", "Idle records removed by the sweeper").unwrap();
    pub static ref TRACKED_KEYS: Gauge =
        register_gauge!("attempt_throttle_tracked_keys", "Current number of tracked keys").unwrap();
}

// Prometheus text format of everything in the default registry
pub fn render() -> Result<String, MetricsError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
