//! Runtime configuration.
//!
//! `StateStoreConfig` is what the library consumes; `Args` is the command-line
//! surface of the `statestore` binary and converts into it.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Failure timeouts shorter than this multiple of the heartbeat interval make
/// false evictions likely under ordinary scheduling jitter.
pub const RECOMMENDED_TIMEOUT_MULTIPLE: u32 = 3;

/// Timing knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    /// How often subscribers are expected to heartbeat.
    pub heartbeat_interval: Duration,
    /// A subscriber silent for longer than this is evicted.
    pub failure_timeout: Duration,
    /// Period of the failure detector loop.
    pub failure_check_period: Duration,
    /// Period of the update dispatcher loop.
    pub dispatch_period: Duration,
    /// Upper bound on a single `DeliverUpdate` call.
    pub delivery_timeout: Duration,
    /// Period of the stats reporter.
    pub stats_interval: Duration,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            failure_timeout: Duration::from_secs(5),
            failure_check_period: Duration::from_millis(500),
            dispatch_period: Duration::from_secs(1),
            delivery_timeout: Duration::from_secs(2),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl StateStoreConfig {
    /// Rejects periods that would make the background loops spin.
    ///
    /// A failure timeout below the recommended multiple is accepted but logged:
    /// it trades false positives for detection latency.
    pub fn validate(&self) -> anyhow::Result<()> {
        let periods = [
            ("heartbeat_interval", self.heartbeat_interval),
            ("failure_timeout", self.failure_timeout),
            ("failure_check_period", self.failure_check_period),
            ("dispatch_period", self.dispatch_period),
            ("delivery_timeout", self.delivery_timeout),
            ("stats_interval", self.stats_interval),
        ];
        for (name, period) in periods {
            if period.is_zero() {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.failure_timeout < self.heartbeat_interval * RECOMMENDED_TIMEOUT_MULTIPLE {
            tracing::warn!(
                "failure_timeout {:?} is less than {}x heartbeat_interval {:?}; expect false evictions",
                self.failure_timeout,
                RECOMMENDED_TIMEOUT_MULTIPLE,
                self.heartbeat_interval
            );
        }

        Ok(())
    }

    /// A session that has been silent this long may be taken over by a new
    /// registration for the same id.
    pub fn stale_session_after(&self) -> Duration {
        self.heartbeat_interval * 2
    }
}

/// Command-line options for the `statestore` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "statestore", about = "Cluster metadata topic store and failure detector")]
pub struct Args {
    /// Address the HTTP API listens on.
    #[arg(long, default_value = "0.0.0.0:24000", env = "STATESTORE_BIND")]
    pub bind: SocketAddr,

    /// Expected subscriber heartbeat interval in milliseconds.
    #[arg(long, default_value_t = 1000, env = "STATESTORE_HEARTBEAT_INTERVAL_MS")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which a subscriber is evicted, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "STATESTORE_FAILURE_TIMEOUT_MS")]
    pub failure_timeout_ms: u64,

    /// Period between failure detector scans in milliseconds.
    #[arg(long, default_value_t = 500, env = "STATESTORE_FAILURE_CHECK_PERIOD_MS")]
    pub failure_check_period_ms: u64,

    /// Period between update dispatch cycles in milliseconds.
    #[arg(long, default_value_t = 1000, env = "STATESTORE_DISPATCH_PERIOD_MS")]
    pub dispatch_period_ms: u64,

    /// Timeout for a single update delivery in milliseconds.
    #[arg(long, default_value_t = 2000, env = "STATESTORE_DELIVERY_TIMEOUT_MS")]
    pub delivery_timeout_ms: u64,

    /// Interval between cluster stats log lines, in seconds.
    #[arg(long, default_value_t = 30, env = "STATESTORE_STATS_INTERVAL_SECS")]
    pub stats_interval_secs: u64,

    /// Maximum log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info", env = "STATESTORE_LOG_LEVEL")]
    pub log_level: tracing::Level,
}

impl Args {
    pub fn to_config(&self) -> StateStoreConfig {
        StateStoreConfig {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            failure_timeout: Duration::from_millis(self.failure_timeout_ms),
            failure_check_period: Duration::from_millis(self.failure_check_period_ms),
            dispatch_period: Duration::from_millis(self.dispatch_period_ms),
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
            stats_interval: Duration::from_secs(self.stats_interval_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StateStoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.failure_timeout >= config.heartbeat_interval * RECOMMENDED_TIMEOUT_MULTIPLE);
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let config = StateStoreConfig {
            dispatch_period: Duration::ZERO,
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dispatch_period"));
    }

    #[test]
    fn test_args_parse_into_config() {
        let args = Args::try_parse_from([
            "statestore",
            "--bind",
            "127.0.0.1:7000",
            "--heartbeat-interval-ms",
            "250",
            "--failure-timeout-ms",
            "1000",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.bind, "127.0.0.1:7000".parse::<SocketAddr>().unwrap());
        assert_eq!(args.log_level, tracing::Level::DEBUG);

        let config = args.to_config();
        assert_eq!(config.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.failure_timeout, Duration::from_secs(1));
        assert_eq!(config.dispatch_period, Duration::from_secs(1));
    }
}
