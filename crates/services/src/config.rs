use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_DB_URL: &str = "COURSE_DB_URL";
pub const ENV_CATALOG_PATH: &str = "COURSE_CATALOG_PATH";
pub const ENV_SCORING: &str = "COURSE_SCORING";
pub const ENV_TICK_MS: &str = "COURSE_TICK_MS";

const DEFAULT_DB_URL: &str = "sqlite://course.sqlite3?mode=rwc";
const DEFAULT_TICK_MS: u64 = 1000;

/// How test submissions are graded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoringMode {
    /// Uniform draw bounded by the answered count.
    #[default]
    Random,
    /// Every answered question is correct.
    Answered,
    /// Each answer judged by the exercise rules.
    Evaluated,
}

impl FromStr for ScoringMode {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(ScoringMode::Random),
            "answered" => Ok(ScoringMode::Answered),
            "evaluated" => Ok(ScoringMode::Evaluated),
            _ => Err(ConfigError::InvalidValue {
                var: ENV_SCORING,
                raw: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    /// JSON catalog file; the bundled catalog is used when absent.
    pub catalog_path: Option<PathBuf>,
    pub scoring: ScoringMode,
    pub countdown_tick_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DB_URL.to_string(),
            catalog_path: None,
            scoring: ScoringMode::default(),
            countdown_tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl AppConfig {
    /// Reads `COURSE_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a blank database URL, an
    /// unknown scoring mode or a non-positive tick.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] over an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_DB_URL) {
            if raw.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    var: ENV_DB_URL,
                    raw,
                });
            }
            config.database_url = normalize_sqlite_url(&raw);
        }
        if let Some(raw) = lookup(ENV_CATALOG_PATH).filter(|v| !v.trim().is_empty()) {
            config.catalog_path = Some(PathBuf::from(raw.trim()));
        }
        if let Some(raw) = lookup(ENV_SCORING) {
            config.scoring = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_TICK_MS) {
            config.countdown_tick_ms = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidValue { var: ENV_TICK_MS, raw })?;
        }
        Ok(config)
    }

    #[must_use]
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }
}

/// Turns a bare path or `sqlite:` URL into an absolute `sqlite://` URL that
/// creates the file on first use.
#[must_use]
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite://") || storage::sqlite::is_memory_url(trimmed) {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.countdown_tick(), Duration::from_secs(1));
    }

    #[test]
    fn variables_override_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_DB_URL, "sqlite::memory:"),
            (ENV_CATALOG_PATH, "content/catalog.json"),
            (ENV_SCORING, "Answered"),
            (ENV_TICK_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.catalog_path, Some(PathBuf::from("content/catalog.json")));
        assert_eq!(config.scoring, ScoringMode::Answered);
        assert_eq!(config.countdown_tick_ms, 250);
    }

    #[test]
    fn invalid_values_are_errors() {
        for (var, raw) in [(ENV_SCORING, "best"), (ENV_TICK_MS, "0"), (ENV_TICK_MS, "soon"), (ENV_DB_URL, " ")] {
            let err = AppConfig::from_lookup(lookup(&[(var, raw)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { var: v, .. } if v == var));
        }
    }

    #[test]
    fn sqlite_urls_are_normalized() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:file:course?mode=memory&cache=shared"),
            "sqlite:file:course?mode=memory&cache=shared"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/a.db"),
            "sqlite:///tmp/a.db"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:/var/data/progress.db"),
            "sqlite:///var/data/progress.db?mode=rwc"
        );
        let relative = normalize_sqlite_url("progress.db");
        assert!(relative.starts_with("sqlite:///"));
        assert!(relative.ends_with("progress.db?mode=rwc"));
    }
}
