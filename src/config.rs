use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::IntervalLadder;
use crate::services::filter::ContentFilter;
use crate::services::scheduler::SchedulerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    /// Enables the rotating log files when set.
    pub log_dir: Option<PathBuf>,
    pub db_path: PathBuf,
    /// Base URL of a sync server, for clients.
    pub sync_endpoint: Option<String>,
    pub sync_timeout: Duration,
    pub dal_timeout: Option<Duration>,
    pub intervals: IntervalLadder,
    pub filter_allow_overflow: bool,
    pub scheduler_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let log_dir = std::env::var("SYNC_LOG_DIR")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let db_path = std::env::var("SYNC_DB_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/sync.db"));

        let sync_endpoint = std::env::var("SYNC_ENDPOINT")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let intervals = match std::env::var("REVIEW_INTERVALS") {
            Ok(raw) if !raw.trim().is_empty() => parse_intervals(&raw)?,
            _ => IntervalLadder::default(),
        };

        Ok(Self {
            host,
            port,
            log_level,
            log_dir,
            db_path,
            sync_endpoint,
            sync_timeout: Duration::from_millis(env_u64("SYNC_TIMEOUT_MS", 30_000)),
            dal_timeout: env_opt_u64("DAL_TIMEOUT_MS").map(Duration::from_millis),
            intervals,
            filter_allow_overflow: env_bool("FILTER_ALLOW_OVERFLOW", true),
            scheduler_seed: env_opt_u64("SCHEDULER_SEED"),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            intervals: self.intervals.clone(),
            filter: ContentFilter {
                allow_overflow: self.filter_allow_overflow,
                ..ContentFilter::default()
            },
            seed: self.scheduler_seed,
        }
    }
}

/// Comma-separated seconds, e.g. `5,25,120`.
pub fn parse_intervals(raw: &str) -> Result<IntervalLadder, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "REVIEW_INTERVALS",
        value: raw.to_string(),
    };
    let intervals = raw
        .split(',')
        .map(|part| part.trim().parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if intervals.is_empty() {
        return Err(invalid());
    }
    Ok(IntervalLadder::new(intervals))
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt_u64(key).unwrap_or(default)
}

fn env_opt_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interval_list() {
        let ladder = parse_intervals("60, 300,900").unwrap();
        assert_eq!(ladder.as_slice(), &[60, 300, 900]);
        assert!(parse_intervals("60,soon").is_err());
        assert!(parse_intervals("60,,300").is_err());
    }

    #[test]
    fn scheduler_config_carries_overflow_flag() {
        let config = Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            log_level: "info".into(),
            log_dir: None,
            db_path: PathBuf::from("x.db"),
            sync_endpoint: None,
            sync_timeout: Duration::from_secs(1),
            dal_timeout: None,
            intervals: IntervalLadder::new(vec![1, 2]),
            filter_allow_overflow: false,
            scheduler_seed: Some(4),
        };
        let scheduler = config.scheduler_config();
        assert!(!scheduler.filter.allow_overflow);
        assert_eq!(scheduler.seed, Some(4));
        assert_eq!(scheduler.intervals.len(), 2);
    }
}
