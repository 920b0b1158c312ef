//! warden.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{ConfigError, ConfigResult};

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/warden/warden.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub service: ServiceConfig,
    pub health: HealthConfig,
    pub logs: LogsConfig,
    pub thresholds: ThresholdsConfig,
    pub recovery: RecoveryConfig,
    pub monitor: MonitorConfig,
}

/// The supervised service and how to find its workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// systemd unit name.
    pub unit: String,
    /// Substrings that must all appear in a worker's command line.
    pub process_match: Vec<String>,
    /// Treat `systemctl is-active` != active as a breach.
    pub check_active: bool,
    /// Stale unix sockets removed by a full restart.
    pub socket_files: Vec<PathBuf>,
    /// Root of the proc filesystem.
    pub proc_root: PathBuf,
    /// Path to `systemctl`.
    pub systemctl: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            unit: "currency-exchange".to_string(),
            process_match: vec!["gunicorn".to_string(), "currency-exchange".to_string()],
            check_active: true,
            socket_files: vec![
                PathBuf::from("/tmp/gunicorn.sock"),
                PathBuf::from("/var/run/gunicorn/currency-exchange.sock"),
            ],
            proc_root: PathBuf::from("/proc"),
            systemctl: "systemctl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// HTTP endpoint probed each cycle.
    pub url: String,
    /// Timeout per probe (e.g., "5s").
    pub timeout: String,
    /// Optional `host:port` checked with a bare TCP connect.
    pub port: Option<String>,
    /// Consecutive non-up samples before health counts as breached.
    pub unhealthy_threshold: u32,
    /// Number of recent samples kept for trend decisions.
    pub history: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5001/health".to_string(),
            timeout: "5s".to_string(),
            port: Some("127.0.0.1:5001".to_string()),
            unhealthy_threshold: 1,
            history: 10,
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> ConfigResult<Duration> {
        duration_field("health.timeout", &self.timeout)
    }
}

/// Where log entries are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSourceKind {
    /// `journalctl -u <unit>`.
    Journal,
    /// A plain text log file.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub source: LogSourceKind,
    /// Journal unit; defaults to `service.unit`.
    pub unit: Option<String>,
    /// Log file for the `file` source.
    pub path: Option<PathBuf>,
    /// How far back the first scan looks.
    pub window: String,
    /// Path to `journalctl`.
    pub journalctl: String,
    pub categories: Vec<CategoryConfig>,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            source: LogSourceKind::Journal,
            unit: None,
            path: None,
            window: "5m".to_string(),
            journalctl: "journalctl".to_string(),
            categories: default_categories(),
        }
    }
}

impl LogsConfig {
    pub fn window(&self) -> ConfigResult<Duration> {
        duration_field("logs.window", &self.window)
    }
}

/// An error signature counted in the log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub pattern: String,
    /// Interpret `pattern` as a regular expression instead of a substring.
    #[serde(default)]
    pub regex: bool,
    /// Per-category limit; falls back to `thresholds.max_errors`.
    #[serde(default)]
    pub limit: Option<u64>,
}

impl CategoryConfig {
    pub fn substring(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            regex: false,
            limit: None,
        }
    }
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::substring("bad-descriptor", "Bad file descriptor"),
        CategoryConfig::substring("broken-pipe", "Broken pipe"),
        CategoryConfig::substring("connection-reset", "Connection reset by peer"),
    ]
}

/// Breach limits. A signal breaches when it is strictly greater than its limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Default per-category error limit.
    pub max_errors: u64,
    /// Optional limit on the sum across categories.
    pub max_errors_total: Option<u64>,
    pub max_memory_mb: u64,
    pub max_open_fds: u64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            max_errors: 5,
            max_errors_total: None,
            max_memory_mb: 500,
            max_open_fds: 1000,
        }
    }
}

/// How the service is restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    /// `systemctl restart <unit>`.
    Restart,
    /// Stop, kill leftover workers, remove stale sockets, start.
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub strategy: RestartStrategy,
    /// Minimum interval between restarts.
    pub cooldown: String,
    /// Health polls after a restart before declaring failure.
    pub verify_attempts: u32,
    pub verify_delay: String,
    /// Longest a single cycle may run before it is abandoned.
    pub max_cycle: String,
    /// Consecutive failed restarts before the controller stops trying.
    pub max_consecutive_failures: u32,
    /// Pause after `systemctl stop` in the full strategy.
    pub stop_settle: String,
    /// `pkill` timeout before escalating to SIGKILL.
    pub kill_timeout: String,
    /// `pkill -f` pattern for leftover workers.
    pub kill_pattern: Option<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            strategy: RestartStrategy::Full,
            cooldown: "5m".to_string(),
            verify_attempts: 6,
            verify_delay: "5s".to_string(),
            max_cycle: "3m".to_string(),
            max_consecutive_failures: 3,
            stop_settle: "5s".to_string(),
            kill_timeout: "10s".to_string(),
            kill_pattern: Some("gunicorn.*currency-exchange".to_string()),
        }
    }
}

impl RecoveryConfig {
    pub fn cooldown(&self) -> ConfigResult<Duration> {
        duration_field("recovery.cooldown", &self.cooldown)
    }

    pub fn verify_delay(&self) -> ConfigResult<Duration> {
        duration_field("recovery.verify_delay", &self.verify_delay)
    }

    pub fn max_cycle(&self) -> ConfigResult<Duration> {
        duration_field("recovery.max_cycle", &self.max_cycle)
    }

    pub fn stop_settle(&self) -> ConfigResult<Duration> {
        duration_field("recovery.stop_settle", &self.stop_settle)
    }

    pub fn kill_timeout(&self) -> ConfigResult<Duration> {
        duration_field("recovery.kill_timeout", &self.kill_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Polling interval in daemon mode.
    pub interval: String,
    /// redb file holding the audit log and cool-down marker.
    pub audit_db: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            audit_db: PathBuf::from("/var/lib/warden/audit.redb"),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> ConfigResult<Duration> {
        duration_field("monitor.interval", &self.interval)
    }
}

impl WardenConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: WardenConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// The journal unit scanned for errors.
    pub fn log_unit(&self) -> &str {
        self.logs.unit.as_deref().unwrap_or(&self.service.unit)
    }

    /// Check every derived value up front so the daemon fails at startup,
    /// not on its first tick.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.service.unit.trim().is_empty() {
            return Err(ConfigError::Invalid("service.unit is empty".to_string()));
        }
        if self.service.process_match.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "service.process_match needs at least one non-empty substring".to_string(),
            ));
        }
        if self.logs.source == LogSourceKind::File && self.logs.path.is_none() {
            return Err(ConfigError::Invalid(
                "logs.path is required for the file source".to_string(),
            ));
        }
        if self.health.history == 0 {
            return Err(ConfigError::Invalid("health.history must be at least 1".to_string()));
        }

        self.health.timeout()?;
        self.logs.window()?;
        self.recovery.cooldown()?;
        self.recovery.verify_delay()?;
        if self.recovery.max_cycle()?.is_zero() {
            return Err(ConfigError::Invalid("recovery.max_cycle must be non-zero".to_string()));
        }
        self.recovery.stop_settle()?;
        self.recovery.kill_timeout()?;
        if self.monitor.interval()?.is_zero() {
            return Err(ConfigError::Invalid("monitor.interval must be non-zero".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for category in &self.logs.categories {
            if !seen.insert(category.name.as_str()) {
                return Err(ConfigError::Category {
                    name: category.name.clone(),
                    reason: "duplicate name".to_string(),
                });
            }
            if category.pattern.is_empty() {
                return Err(ConfigError::Category {
                    name: category.name.clone(),
                    reason: "empty pattern".to_string(),
                });
            }
            if category.regex {
                regex::Regex::new(&category.pattern).map_err(|e| ConfigError::Category {
                    name: category.name.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = WardenConfig::from_toml("").unwrap();
        assert_eq!(config.service.unit, "currency-exchange");
        assert_eq!(config.thresholds.max_errors, 5);
        assert_eq!(config.thresholds.max_memory_mb, 500);
        assert_eq!(config.thresholds.max_open_fds, 1000);
        assert_eq!(config.logs.categories.len(), 3);
        assert_eq!(config.monitor.interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.recovery.cooldown().unwrap(), Duration::from_secs(300));
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = WardenConfig::from_toml(
            r#"
[thresholds]
max_errors = 3

[logs]
source = "file"
path = "/var/log/currency-exchange/error.log"

[[logs.categories]]
name = "bad-descriptor"
pattern = "Bad file descriptor"
limit = 2
"#,
        )
        .unwrap();
        assert_eq!(config.thresholds.max_errors, 3);
        assert_eq!(config.thresholds.max_open_fds, 1000);
        assert_eq!(config.logs.source, LogSourceKind::File);
        assert_eq!(config.logs.categories.len(), 1);
        assert_eq!(config.logs.categories[0].limit, Some(2));
        config.validate().unwrap();
    }

    #[test]
    fn log_unit_falls_back_to_service_unit() {
        let mut config = WardenConfig::default();
        assert_eq!(config.log_unit(), "currency-exchange");
        config.logs.unit = Some("gunicorn".to_string());
        assert_eq!(config.log_unit(), "gunicorn");
    }

    #[test]
    fn bad_duration_is_reported_with_field() {
        let mut config = WardenConfig::default();
        config.recovery.cooldown = "a while".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Duration { field: "recovery.cooldown", .. }
        ));
    }

    #[test]
    fn zero_interval_and_cycle_limit_rejected() {
        let mut config = WardenConfig::default();
        config.monitor.interval = "0s".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("monitor.interval")));

        let mut config = WardenConfig::default();
        config.recovery.max_cycle = "0ms".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(m)) if m.contains("recovery.max_cycle")));

        let mut config = WardenConfig::default();
        config.recovery.cooldown = "0s".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn overflowing_duration_is_reported_with_field() {
        let mut config = WardenConfig::default();
        config.logs.window = "999999999999999999h".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duration { field: "logs.window", .. })
        ));
    }

    #[test]
    fn file_source_requires_path() {
        let mut config = WardenConfig::default();
        config.logs.source = LogSourceKind::File;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_regex_category_rejected() {
        let mut config = WardenConfig::default();
        config.logs.categories.push(CategoryConfig {
            name: "broken".to_string(),
            pattern: "([".to_string(),
            regex: true,
            limit: None,
        });
        assert!(matches!(config.validate(), Err(ConfigError::Category { .. })));
    }

    #[test]
    fn duplicate_category_rejected() {
        let mut config = WardenConfig::default();
        config
            .logs
            .categories
            .push(CategoryConfig::substring("broken-pipe", "EPIPE"));
        assert!(matches!(config.validate(), Err(ConfigError::Category { .. })));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = WardenConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = WardenConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.service.process_match, config.service.process_match);
        assert_eq!(parsed.recovery.strategy, RestartStrategy::Full);
    }

    #[test]
    fn shipped_sample_config_is_valid() {
        let config =
            WardenConfig::from_toml(include_str!("../../../deploy/warden.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.logs.categories.len(), 4);
        assert_eq!(config.logs.categories[3].limit, Some(2));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[service]\nunit = \"rates\"\n").unwrap();
        let config = WardenConfig::from_file(&path).unwrap();
        assert_eq!(config.service.unit, "rates");

        let missing = WardenConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
