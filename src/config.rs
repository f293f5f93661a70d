use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::key::KeyStrategy;

pub const CONFIG_ENV: &str = "ATTEMPT_THROTTLE_CONFIG";

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "attempt-throttle")]
#[command(about = "Replay attempt streams through a fixed-window rate limiter")]
pub struct Args {
    // TOML config file (falls back to $ATTEMPT_THROTTLE_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    // Max attempts per window
    #[arg(long)]
    pub max_attempts: Option<u32>,

    // Window length in milliseconds
    #[arg(long)]
    pub window_ms: Option<u64>,

    // Block length in milliseconds
    #[arg(long)]
    pub block_ms: Option<u64>,

    // Idle record sweep interval in seconds, 0 disables
    #[arg(long)]
    pub sweep_interval: Option<u64>,

    // Input lines are "<ms> <key>" instead of "<key>"
    #[arg(short, long)]
    pub timestamps: bool,

    // Treat keys as emails (trim + lowercase)
    #[arg(long)]
    pub email_keys: bool,

    // Store sha256 of keys instead of raw keys
    #[arg(long)]
    pub hash_keys: bool,

    // Print prometheus metrics to stderr when done
    #[arg(long)]
    pub metrics: bool,
}

impl Args {
    pub fn key_strategy(&self) -> KeyStrategy {
        KeyStrategy::from_flags(self.email_keys, self.hash_keys)
    }
}

/// Limits for a [`RateLimiter`](crate::rate_limit::RateLimiter).
///
/// Not validated on construction; call [`RateLimiterConfig::validate`] to reject
/// zero values up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimiterConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    15 * 60 * 1000
}

fn default_block_duration_ms() -> u64 {
    60 * 60 * 1000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_ms: default_window_ms(),
            block_duration_ms: default_block_duration_ms(),
        }
    }
}

impl RateLimiterConfig {
    pub fn new(max_attempts: u32, window_ms: u64, block_duration_ms: u64) -> Self {
        Self {
            max_attempts,
            window_ms,
            block_duration_ms,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Zero("max_attempts"));
        }
        if self.window_ms == 0 {
            return Err(ConfigError::Zero("window_ms"));
        }
        if self.block_duration_ms == 0 {
            return Err(ConfigError::Zero("block_duration_ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Everything the binary reads from its config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default)]
    pub limiter: RateLimiterConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl ThrottleConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// File (from `--config` or the env var), then CLI overrides, then validation.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let path = args
            .config
            .clone()
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };

        config.apply_overrides(args);
        config.limiter.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, args: &Args) {
        if let Some(max) = args.max_attempts {
            self.limiter.max_attempts = max;
        }
        if let Some(window) = args.window_ms {
            self.limiter.window_ms = window;
        }
        if let Some(block) = args.block_ms {
            self.limiter.block_duration_ms = block;
        }
        if let Some(secs) = args.sweep_interval {
            self.sweeper.interval_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["attempt-throttle"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_match_login_profile() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.window_ms, 900_000);
        assert_eq!(config.block_duration_ms, 3_600_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_fields() {
        assert!(matches!(
            RateLimiterConfig::new(0, 1, 1).validate(),
            Err(ConfigError::Zero("max_attempts"))
        ));
        assert!(matches!(
            RateLimiterConfig::new(1, 0, 1).validate(),
            Err(ConfigError::Zero("window_ms"))
        ));
        assert!(matches!(
            RateLimiterConfig::new(1, 1, 0).validate(),
            Err(ConfigError::Zero("block_duration_ms"))
        ));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ThrottleConfig = toml::from_str("[limiter]\nmax_attempts = 3\n").unwrap();
        assert_eq!(config.limiter.max_attempts, 3);
        assert_eq!(config.limiter.window_ms, default_window_ms());
        assert_eq!(config.sweeper.interval_secs, 60);
    }

    #[test]
    fn load_reads_file_then_applies_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[limiter]\nmax_attempts = 3\nwindow_ms = 1000\n\n[sweeper]\ninterval_secs = 5"
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let config =
            ThrottleConfig::load(&args(&["--config", path, "--window-ms", "2000"])).unwrap();
        assert_eq!(config.limiter.max_attempts, 3);
        assert_eq!(config.limiter.window_ms, 2000);
        assert_eq!(
            config.limiter.block_duration_ms,
            default_block_duration_ms()
        );
        assert_eq!(config.sweeper.interval_secs, 5);
    }

    #[test]
    fn load_rejects_zero_override() {
        let err = ThrottleConfig::load(&args(&["--max-attempts", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("max_attempts")));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ThrottleConfig::from_file(Path::new("/nonexistent/throttle.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn key_strategy_from_flags() {
        assert_eq!(args(&[]).key_strategy(), KeyStrategy::Raw);
        assert_eq!(
            args(&["--email-keys", "--hash-keys"]).key_strategy(),
            KeyStrategy::HashedEmail
        );
    }
}
