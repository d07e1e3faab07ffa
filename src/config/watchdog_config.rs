//! Watchdog Configuration - schedule, retry budget and the monitored items
//!
//! Every field has a default matching the built-in constants in
//! [`super::defaults`], so a config file only needs to list what it changes.
//! Both TOML and the legacy JSON layout (camelCase keys, numbers stored as
//! strings) deserialize into the same structs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use super::defaults;
use super::validation::{validate_unknown_keys, ValidationWarning};

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    ParseJson(PathBuf, #[source] serde_json::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// File Format
// ============================================================================

/// On-disk representation of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    /// Legacy camelCase JSON layout.
    Json,
}

impl ConfigFormat {
    /// Pick the format from the file extension; anything but `.json` is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Process-wide watchdog settings. Loaded once before the loop starts and
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Time between health-check cycles
    #[serde(
        default = "default_health_check_interval_ms",
        alias = "healthCheckInterval",
        deserialize_with = "lenient::u64"
    )]
    pub health_check_interval_ms: u64,

    /// Recovery action timeout used when an item has no override
    #[serde(
        default = "default_recovery_execution_timeout_ms",
        alias = "recoveryExecutionTimeout",
        deserialize_with = "lenient::u64"
    )]
    pub recovery_execution_timeout_ms: u64,

    /// Attempt budget per unhealthy detection (see [`crate::background::RetryPolicy`])
    #[serde(
        default = "default_critical_counts",
        alias = "criticalCounts",
        deserialize_with = "lenient::u32"
    )]
    pub critical_counts: u32,

    /// Run recovery actions without an attached console
    #[serde(
        default,
        alias = "noConsoleForRecoveryScript",
        deserialize_with = "lenient::bool"
    )]
    pub no_console_for_recovery_script: bool,

    /// Executable queried for sub-application status
    #[serde(default = "default_status_query_program", alias = "statusQueryProgram")]
    pub status_query_program: String,

    /// Monitored items, checked in this order
    #[serde(default, alias = "recoveryItems")]
    pub recovery_items: Vec<RecoveryItem>,
}

fn default_health_check_interval_ms() -> u64 {
    defaults::HEALTH_CHECK_INTERVAL_MS
}

fn default_recovery_execution_timeout_ms() -> u64 {
    defaults::RECOVERY_EXECUTION_TIMEOUT_MS
}

fn default_critical_counts() -> u32 {
    defaults::CRITICAL_COUNTS
}

fn default_status_query_program() -> String {
    defaults::STATUS_QUERY_PROGRAM.to_string()
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            recovery_execution_timeout_ms: default_recovery_execution_timeout_ms(),
            critical_counts: default_critical_counts(),
            no_console_for_recovery_script: false,
            status_query_program: default_status_query_program(),
            recovery_items: Vec::new(),
        }
    }
}

impl WatchdogConfig {
    /// Load, parse and validate a config file.
    ///
    /// Unknown keys are logged as warnings; everything else that goes wrong
    /// is a [`ConfigError`].
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, warnings) = Self::load_with_warnings(path)?;
        for w in warnings {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Like [`Self::load_from_file`], but hands unknown-key warnings back to
    /// the caller instead of logging them.
    pub fn load_with_warnings(path: &Path) -> Result<(Self, Vec<ValidationWarning>), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let format = ConfigFormat::from_path(path);
        let warnings = validate_unknown_keys(&contents, format);

        let config = Self::parse(&contents, format, path)?;
        config.validate()?;
        Ok((config, warnings))
    }

    /// Parse config text without validating it.
    ///
    /// Items in the legacy JSON layout that don't mention `elevated` run
    /// elevated; TOML items default to the watchdog's own identity.
    pub fn parse(contents: &str, format: ConfigFormat, origin: &Path) -> Result<Self, ConfigError> {
        match format {
            ConfigFormat::Toml => {
                toml::from_str(contents).map_err(|e| ConfigError::Parse(origin.to_path_buf(), e))
            }
            ConfigFormat::Json => {
                let mut value: serde_json::Value = serde_json::from_str(contents)
                    .map_err(|e| ConfigError::ParseJson(origin.to_path_buf(), e))?;
                default_legacy_elevation(&mut value);
                serde_json::from_value(value)
                    .map_err(|e| ConfigError::ParseJson(origin.to_path_buf(), e))
            }
        }
    }

    /// Reject values the watchdog cannot run with. All problems are reported at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.critical_counts < 1 {
            errors.push(format!(
                "critical_counts = {} must be at least 1",
                self.critical_counts
            ));
        }
        if self.health_check_interval_ms == 0 {
            errors.push("health_check_interval_ms must be greater than 0".to_string());
        }
        if self.recovery_execution_timeout_ms == 0 {
            errors.push("recovery_execution_timeout_ms must be greater than 0".to_string());
        }
        if self.status_query_program.trim().is_empty() {
            errors.push("status_query_program must not be empty".to_string());
        }
        for (idx, item) in self.recovery_items.iter().enumerate() {
            if item.recovery_batch.trim().is_empty() {
                errors.push(format!("recovery_items[{idx}].recovery_batch must not be empty"));
            }
            if !item.app_names.is_empty() && item.database.trim().is_empty() {
                errors.push(format!(
                    "recovery_items[{idx}] lists app_names but no database to query"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn default_recovery_execution_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_execution_timeout_ms)
    }

    /// Multi-line description of every setting, logged once at startup.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Watchdog will be started with:\n    \
             healthCheckInterval : {}\n    \
             recoveryExecutionTimeout : {}\n    \
             noConsoleForRecoveryScript : {}\n    \
             criticalCounts : {}\n    \
             statusQueryProgram : {}\n",
            self.health_check_interval_ms,
            self.recovery_execution_timeout_ms,
            self.no_console_for_recovery_script,
            self.critical_counts,
            self.status_query_program,
        );
        for item in &self.recovery_items {
            out.push_str(&item.to_string());
        }
        out
    }
}

// ============================================================================
// Recovery Item
// ============================================================================

/// One monitored unit: what must be running, and what to launch when it isn't.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryItem {
    /// Command or script launched to recover the item
    #[serde(default, alias = "recoveryBatch")]
    pub recovery_batch: String,

    /// Per-item timeout in milliseconds; 0 means "use the config default"
    #[serde(
        default,
        alias = "overrideRecoveryExecutionTimeout",
        deserialize_with = "lenient::u64"
    )]
    pub override_recovery_execution_timeout_ms: u64,

    /// Directory holding the status-query executable
    #[serde(default, alias = "starcounterBinDirectory")]
    pub bin_directory: Option<PathBuf>,

    /// Database scope passed to the status query
    #[serde(default, alias = "scDatabase")]
    pub database: String,

    /// OS process names that must all be running
    #[serde(default)]
    pub processes: Vec<String>,

    /// Sub-applications that must all be reported running in `database`
    #[serde(default, alias = "scAppNames")]
    pub app_names: Vec<String>,

    /// Ask the launcher to run the recovery action with elevated rights
    #[serde(default, deserialize_with = "lenient::bool")]
    pub elevated: bool,
}

impl RecoveryItem {
    /// Per-item timeout, if one is configured.
    pub fn recovery_timeout_override(&self) -> Option<Duration> {
        match self.override_recovery_execution_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Status-query directory, treating an empty path as unset.
    pub fn bin_directory(&self) -> Option<&Path> {
        self.bin_directory
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Marker the status query prints for a running app, e.g. `"Shop (in default)"`.
    pub fn app_marker(&self, app_name: &str) -> String {
        format!("{app_name} (in {})", self.database)
    }
}

impl fmt::Display for RecoveryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    recoveryItem :")?;
        writeln!(f, "        recoveryBatch : {}", self.recovery_batch)?;
        writeln!(
            f,
            "        overrideRecoveryExecutionTimeout : {}",
            self.override_recovery_execution_timeout_ms
        )?;
        if let Some(dir) = self.bin_directory() {
            writeln!(f, "        binDirectory : {}", dir.display())?;
        }
        writeln!(f, "        database : {}", self.database)?;
        writeln!(f, "        processes : {}", self.processes.join(", "))?;
        writeln!(f, "        appNames : {}", self.app_names.join(", "))?;
        writeln!(f, "        elevated : {}", self.elevated)
    }
}

/// Mark every legacy JSON item without an `elevated` key as elevated.
fn default_legacy_elevation(value: &mut serde_json::Value) {
    for key in ["recoveryItems", "recovery_items"] {
        let Some(items) = value.get_mut(key).and_then(serde_json::Value::as_array_mut) else {
            continue;
        };
        for item in items.iter_mut().filter_map(serde_json::Value::as_object_mut) {
            item.entry("elevated").or_insert(serde_json::Value::Bool(true));
        }
    }
}

// ============================================================================
// Lenient scalar parsing
// ============================================================================

/// Accepts numbers and booleans either natively or as strings (`"10000"`,
/// `"true"`). Strings that don't parse are hard errors.
mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Num(u64),
        Str(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    pub fn u64<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
        match NumOrString::deserialize(de)? {
            NumOrString::Num(n) => Ok(n),
            NumOrString::Str(s) => s
                .trim()
                .parse()
                .map_err(|e| D::Error::custom(format!("invalid number '{s}': {e}"))),
        }
    }

    pub fn u32<'de, D: Deserializer<'de>>(de: D) -> Result<u32, D::Error> {
        let n = u64(de)?;
        u32::try_from(n).map_err(|_| D::Error::custom(format!("number {n} is out of range")))
    }

    pub fn bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
        match BoolOrString::deserialize(de)? {
            BoolOrString::Bool(b) => Ok(b),
            BoolOrString::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(D::Error::custom(format!("invalid boolean '{s}'"))),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_toml(s: &str) -> Result<WatchdogConfig, ConfigError> {
        WatchdogConfig::parse(s, ConfigFormat::Toml, Path::new("test.toml"))
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.health_check_interval(), Duration::from_secs(10));
        assert_eq!(
            config.default_recovery_execution_timeout(),
            Duration::from_secs(300)
        );
        assert_eq!(config.critical_counts, 10);
        assert!(!config.no_console_for_recovery_script);
        assert_eq!(config.status_query_program, "staradmin");
        assert!(config.recovery_items.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_items_keep_order() {
        let config = parse_toml(
            r#"
            critical_counts = 3

            [[recovery_items]]
            recovery_batch = "/opt/first.sh"
            processes = ["alpha"]

            [[recovery_items]]
            recovery_batch = "/opt/second.sh"
            database = "default"
            app_names = ["Shop"]
            override_recovery_execution_timeout_ms = 30000
        "#,
        )
        .unwrap();

        assert_eq!(config.recovery_items.len(), 2);
        assert_eq!(config.recovery_items[0].recovery_batch, "/opt/first.sh");
        assert_eq!(config.recovery_items[1].recovery_batch, "/opt/second.sh");
        assert_eq!(
            config.recovery_items[1].recovery_timeout_override(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.recovery_items[0].recovery_timeout_override(), None);
    }

    #[test]
    fn test_legacy_json_with_string_scalars() {
        let json = r#"{
            "healthCheckInterval": "5000",
            "recoveryExecutionTimeout": "60000",
            "criticalCounts": "4",
            "noConsoleForRecoveryScript": "True",
            "recoveryItems": [
                {
                    "recoveryBatch": "C:\\recover.bat",
                    "overrideRecoveryExecutionTimeout": "1000",
                    "starcounterBinDirectory": "C:\\Starcounter",
                    "scDatabase": "default",
                    "processes": ["scdata"],
                    "scAppNames": ["Shop"]
                }
            ]
        }"#;
        let config =
            WatchdogConfig::parse(json, ConfigFormat::Json, Path::new("legacy.json")).unwrap();
        assert_eq!(config.health_check_interval_ms, 5000);
        assert_eq!(config.recovery_execution_timeout_ms, 60000);
        assert_eq!(config.critical_counts, 4);
        assert!(config.no_console_for_recovery_script);
        let item = &config.recovery_items[0];
        assert_eq!(item.database, "default");
        assert_eq!(item.processes, vec!["scdata".to_string()]);
        assert_eq!(item.app_names, vec!["Shop".to_string()]);
        assert_eq!(item.bin_directory(), Some(Path::new("C:\\Starcounter")));
    }

    #[test]
    fn test_legacy_json_items_elevate_unless_told_otherwise() {
        let json = r#"{
            "recoveryItems": [
                { "recoveryBatch": "C:\\a.bat" },
                { "recoveryBatch": "C:\\b.bat", "elevated": "false" }
            ]
        }"#;
        let config =
            WatchdogConfig::parse(json, ConfigFormat::Json, Path::new("legacy.json")).unwrap();
        assert!(config.recovery_items[0].elevated);
        assert!(!config.recovery_items[1].elevated);

        let toml = parse_toml(
            r#"
            [[recovery_items]]
            recovery_batch = "/opt/a.sh"
        "#,
        )
        .unwrap();
        assert!(!toml.recovery_items[0].elevated);
    }

    #[test]
    fn test_malformed_number_is_parse_error() {
        let err = parse_toml(r#"critical_counts = "lots""#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn test_malformed_bool_is_parse_error() {
        let err = WatchdogConfig::parse(
            r#"{"noConsoleForRecoveryScript": "maybe"}"#,
            ConfigFormat::Json,
            Path::new("x.json"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ParseJson(..)));
    }

    #[test]
    fn test_zero_critical_counts_rejected() {
        let config = parse_toml("critical_counts = 0").unwrap();
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("critical_counts"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = parse_toml(
            r#"
            health_check_interval_ms = 0
            critical_counts = 0

            [[recovery_items]]
            app_names = ["Shop"]
        "#,
        )
        .unwrap();
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_bin_directory_is_unset() {
        let item = RecoveryItem {
            bin_directory: Some(PathBuf::new()),
            ..RecoveryItem::default()
        };
        assert_eq!(item.bin_directory(), None);
    }

    #[test]
    fn test_app_marker_format() {
        let item = RecoveryItem {
            database: "default".to_string(),
            ..RecoveryItem::default()
        };
        assert_eq!(item.app_marker("Shop"), "Shop (in default)");
    }

    #[test]
    fn test_summary_lists_items() {
        let config = WatchdogConfig {
            recovery_items: vec![RecoveryItem {
                recovery_batch: "/opt/recover.sh".to_string(),
                ..RecoveryItem::default()
            }],
            ..WatchdogConfig::default()
        };
        let summary = config.summary();
        assert!(summary.contains("criticalCounts : 10"));
        assert!(summary.contains("recoveryBatch : /opt/recover.sh"));
    }
}
