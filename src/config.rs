use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Process settings, read once from `STITCHBOOK_*` environment variables.
/// Unparseable values fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_in_flight: usize,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub reminder_interval: Duration,
    pub metrics_port: Option<u16>,
    /// JSON file of tailor id → display name.
    pub directory_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            max_in_flight: 256,
            compact_threshold: 1000,
            reminder_interval: Duration::from_secs(300),
            metrics_port: None,
            directory_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            bind: lookup("STITCHBOOK_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "STITCHBOOK_PORT").unwrap_or(defaults.port),
            data_dir: lookup("STITCHBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            max_in_flight: parse_var(&lookup, "STITCHBOOK_MAX_IN_FLIGHT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_in_flight),
            compact_threshold: parse_var(&lookup, "STITCHBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            reminder_interval: parse_var(&lookup, "STITCHBOOK_REMINDER_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map_or(defaults.reminder_interval, Duration::from_secs),
            metrics_port: parse_var(&lookup, "STITCHBOOK_METRICS_PORT"),
            directory_path: lookup("STITCHBOOK_DIRECTORY").map(PathBuf::from),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("stitchbook.wal")
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
