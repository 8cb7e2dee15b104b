use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::limits::{DEFAULT_COMPACT_THRESHOLD, DEFAULT_LOCK_TIMEOUT_MS};

/// Process configuration. Every setting is a global flag that falls back
/// to its `ROTAPLAN_*` environment variable, then to a default.
#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct Config {
    /// Directory holding the journal.
    #[arg(long, global = true, env = "ROTAPLAN_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Roster JSON file [default: <data-dir>/roster.json].
    #[arg(long = "roster", global = true, env = "ROTAPLAN_ROSTER")]
    pub roster_file: Option<PathBuf>,

    /// Upper bound on waiting for a slot, the engine gate or the roster.
    #[arg(long, global = true, env = "ROTAPLAN_LOCK_TIMEOUT_MS", default_value_t = DEFAULT_LOCK_TIMEOUT_MS)]
    pub lock_timeout_ms: u64,

    /// Journal appends between automatic compactions (0 disables).
    #[arg(long, global = true, env = "ROTAPLAN_COMPACT_THRESHOLD", default_value_t = DEFAULT_COMPACT_THRESHOLD)]
    pub compact_threshold: u64,

    /// Serve Prometheus metrics on this port.
    #[arg(long, global = true, env = "ROTAPLAN_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn roster_path(&self) -> PathBuf {
        self.roster_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("roster.json"))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("rotaplan.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    fn config(args: &[&str]) -> Result<Config, clap::Error> {
        TestCli::try_parse_from(std::iter::once("rotaplan").chain(args.iter().copied())).map(|cli| cli.config)
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.data_dir, PathBuf::from("./data"));
        assert_eq!(c.roster_path(), PathBuf::from("./data/roster.json"));
        assert_eq!(c.wal_path(), PathBuf::from("./data/rotaplan.wal"));
        assert_eq!(c.lock_timeout(), Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS));
        assert_eq!(c.compact_threshold, DEFAULT_COMPACT_THRESHOLD);
        assert_eq!(c.metrics_port, None);
    }

    #[test]
    fn flags_override_defaults() {
        let c = config(&[
            "--data-dir",
            "/var/lib/rotaplan",
            "--roster",
            "/etc/staff.json",
            "--lock-timeout-ms",
            "250",
            "--metrics-port",
            "9100",
        ])
        .unwrap();
        assert_eq!(c.wal_path(), PathBuf::from("/var/lib/rotaplan/rotaplan.wal"));
        assert_eq!(c.roster_path(), PathBuf::from("/etc/staff.json"));
        assert_eq!(c.lock_timeout(), Duration::from_millis(250));
        assert_eq!(c.metrics_port, Some(9100));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&["--compact-threshold", "lots"]).is_err());
        assert!(config(&["--metrics-port", "70000"]).is_err());
    }
}
