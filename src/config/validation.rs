//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw file is parsed into a generic value tree first, every dotted key
//! path is compared against the known field names, and unknown ones produce
//! warnings with a "did you mean?" hint. Warnings never break a config;
//! range checks that must stop startup live in `WatchdogConfig::validate`.

use std::collections::HashSet;
use tracing::debug;

use super::ConfigFormat;

/// A non-fatal config warning (typo, unsupported key).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Top-level keys, snake_case and their legacy camelCase aliases.
const TOP_LEVEL_KEYS: &[&str] = &[
    "health_check_interval_ms",
    "healthCheckInterval",
    "recovery_execution_timeout_ms",
    "recoveryExecutionTimeout",
    "critical_counts",
    "criticalCounts",
    "no_console_for_recovery_script",
    "noConsoleForRecoveryScript",
    "status_query_program",
    "statusQueryProgram",
    "recovery_items",
    "recoveryItems",
];

/// Keys allowed inside each `recovery_items` entry.
const ITEM_KEYS: &[&str] = &[
    "recovery_batch",
    "recoveryBatch",
    "override_recovery_execution_timeout_ms",
    "overrideRecoveryExecutionTimeout",
    "bin_directory",
    "starcounterBinDirectory",
    "database",
    "scDatabase",
    "processes",
    "app_names",
    "scAppNames",
    "elevated",
];

/// Returns the complete set of valid dotted key paths for `WatchdogConfig`.
///
/// Must be kept in step with the serde names in `watchdog_config.rs`.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = TOP_LEVEL_KEYS.iter().map(|k| (*k).to_string()).collect();
    for list in ["recovery_items", "recoveryItems"] {
        for field in ITEM_KEYS {
            keys.insert(format!("{list}.{field}"));
        }
    }
    keys
}

// ============================================================================
// Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// Tables inside arrays share their parent's path, so every entry of
/// `[[recovery_items]]` yields `recovery_items.<field>`. Duplicates are kept.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                keys.push(path.clone());
                if v.is_table() || v.is_array() {
                    keys.extend(walk_toml_keys(v, &path));
                }
            }
        }
        toml::Value::Array(items) => {
            for item in items.iter().filter(|v| v.is_table()) {
                keys.extend(walk_toml_keys(item, prefix));
            }
        }
        _ => {}
    }
    keys
}

/// JSON counterpart of [`walk_toml_keys`]. `null` values are plain leaves.
pub fn walk_json_keys(value: &serde_json::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                keys.push(path.clone());
                if v.is_object() || v.is_array() {
                    keys.extend(walk_json_keys(v, &path));
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter().filter(|v| v.is_object()) {
                keys.extend(walk_json_keys(item, prefix));
            }
        }
        _ => {}
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        // Ties break alphabetically so the hint is stable across runs.
        let better = match best {
            None => true,
            Some((best_key, best_dist)) => {
                dist < best_dist || (dist == best_dist && k.as_str() < best_key)
            }
        };
        if better {
            best = Some((k.as_str(), dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse raw config text and return warnings for any unknown keys.
///
/// This does NOT fail on unknown keys. Text that doesn't parse yields no
/// warnings; the typed parse reports the real error afterwards.
pub fn validate_unknown_keys(raw: &str, format: ConfigFormat) -> Vec<ValidationWarning> {
    let keys = match format {
        ConfigFormat::Toml => match raw.parse::<toml::Value>() {
            Ok(v) => walk_toml_keys(&v, ""),
            Err(e) => {
                debug!("Skipping unknown-key check, config is not valid TOML: {}", e);
                return Vec::new();
            }
        },
        ConfigFormat::Json => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(v) => walk_json_keys(&v, ""),
            Err(e) => {
                debug!("Skipping unknown-key check, config is not valid JSON: {}", e);
                return Vec::new();
            }
        },
    };

    let known = known_config_keys();
    let mut seen = HashSet::new();
    let mut warnings = Vec::new();

    for key in keys {
        if known.contains(&key) || !seen.insert(key.clone()) {
            continue;
        }
        let suggestion = suggest_correction(&key, &known);
        warnings.push(ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            field: key,
            suggestion,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
