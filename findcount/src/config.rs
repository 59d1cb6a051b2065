use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{CountError, CountResult};
use crate::source::SourceKind;

/// Configuration for a counting run.
///
/// # Configuration Locations
///
/// Values are layered from these files, later ones taking precedence:
/// 1. Global `$HOME/.config/findcount/config.yaml`
/// 2. Local `.findcount.yaml` in the current directory
/// 3. Custom config file given via `--config` (must exist)
///
/// Command-line flags override all of them, see [`CountConfig::merge_with_cli`].
///
/// # Configuration Format
///
/// ```yaml
/// # Substring to count (empty counts nothing)
/// substring: "Go"
///
/// # Where targets come from: url | file
/// source_type: "file"
///
/// # Maximum number of targets fetched at once (default: CPU cores)
/// pool_size: 8
///
/// # Overall time budget
/// time_limit: "30s"
///
/// # Which per-target error is reported at the end: first | last
/// error_policy: "last"
///
/// # Invalid UTF-8 handling: lossy | failfast
/// encoding_mode: "lossy"
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "warn"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CountConfig {
    /// The substring to count
    pub substring: String,

    /// Source gateway used to open each target
    pub source_type: SourceKind,

    /// Maximum number of concurrently running workers
    pub pool_size: NonZeroUsize,

    /// Time budget for the whole run
    #[serde(deserialize_with = "deserialize_duration")]
    pub time_limit: Duration,

    /// Which per-target error the run reports
    pub error_policy: ErrorPolicy,

    /// How invalid UTF-8 in a source is handled
    pub encoding_mode: EncodingMode,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            substring: default_substring(),
            source_type: SourceKind::Url,
            pool_size: default_pool_size(),
            time_limit: default_time_limit(),
            error_policy: ErrorPolicy::default(),
            encoding_mode: EncodingMode::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_substring() -> String {
    "Go".to_string()
}

fn default_pool_size() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_time_limit() -> Duration {
    Duration::from_secs(60)
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

/// Which per-target error a completed run reports when several targets fail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Keep the first error consumed
    First,
    /// Keep the most recent error consumed
    #[default]
    Last,
}

impl FromStr for ErrorPolicy {
    type Err = CountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" => Ok(ErrorPolicy::First),
            "last" => Ok(ErrorPolicy::Last),
            other => Err(CountError::config_error(format!(
                "unknown error policy '{}' (expected first|last)",
                other
            ))),
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::First => write!(f, "first"),
            ErrorPolicy::Last => write!(f, "last"),
        }
    }
}

/// How to handle invalid UTF-8 while decoding a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Abort the target with a read error
    FailFast,
    /// Replace each invalid sequence with U+FFFD and keep counting
    #[default]
    Lossy,
}

impl FromStr for EncodingMode {
    type Err = CountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "failfast" => Ok(EncodingMode::FailFast),
            "lossy" => Ok(EncodingMode::Lossy),
            other => Err(CountError::config_error(format!(
                "unknown encoding mode '{}' (expected failfast|lossy)",
                other
            ))),
        }
    }
}

/// Values given on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub substring: Option<String>,
    pub source_type: Option<SourceKind>,
    pub pool_size: Option<NonZeroUsize>,
    pub time_limit: Option<Duration>,
    pub error_policy: Option<ErrorPolicy>,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
}

impl CountConfig {
    /// Loads configuration from the default locations
    pub fn load() -> CountResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration, adding a custom file on top of the default locations
    pub fn load_from(config_path: Option<&Path>) -> CountResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("findcount/config.yaml")),
            Some(PathBuf::from(".findcount.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicitly requested file has to exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(substring) = cli.substring {
            self.substring = substring;
        }
        if let Some(source_type) = cli.source_type {
            self.source_type = source_type;
        }
        if let Some(pool_size) = cli.pool_size {
            self.pool_size = pool_size;
        }
        if let Some(time_limit) = cli.time_limit {
            self.time_limit = time_limit;
        }
        if let Some(error_policy) = cli.error_policy {
            self.error_policy = error_policy;
        }
        if let Some(encoding_mode) = cli.encoding_mode {
            self.encoding_mode = encoding_mode;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }
}

/// Validates a raw pool size coming from user input. Zero and negative
/// values are rejected.
pub fn parse_pool_size(raw: i64) -> CountResult<NonZeroUsize> {
    usize::try_from(raw)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| CountError::config_error("pool-size should be greater than 0"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let config_path = dir.path().join("config.yaml");
        let mut file = File::create(&config_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        config_path
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
            substring: "TODO"
            source_type: "file"
            pool_size: 4
            time_limit: "1m 30s"
            error_policy: "first"
            encoding_mode: "failfast"
            log_level: "debug"
        "#,
        );

        let config = CountConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.substring, "TODO");
        assert_eq!(config.source_type, SourceKind::File);
        assert_eq!(config.pool_size, NonZeroUsize::new(4).unwrap());
        assert_eq!(config.time_limit, Duration::from_secs(90));
        assert_eq!(config.error_policy, ErrorPolicy::First);
        assert_eq!(config.encoding_mode, EncodingMode::FailFast);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = write_config(&dir, "substring: \"Го\"\n");

        let config = CountConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.substring, "Го");
        assert_eq!(config.source_type, SourceKind::Url);
        assert_eq!(
            config.pool_size,
            NonZeroUsize::new(num_cpus::get()).unwrap()
        );
        assert_eq!(config.time_limit, Duration::from_secs(60));
        assert_eq!(config.error_policy, ErrorPolicy::Last);
        assert_eq!(config.encoding_mode, EncodingMode::Lossy);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let dir = tempdir().unwrap();
        let config_path = write_config(&dir, "pool_size: 0\n");

        let result = CountConfig::load_from(Some(&config_path));
        assert!(result.is_err(), "pool_size 0 must be rejected");
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = write_config(
            &dir,
            r#"
            time_limit: "soon"
            source_type: "ftp"
        "#,
        );

        let result = CountConfig::load_from(Some(&config_path));
        assert!(result.is_err(), "Expected error loading invalid config");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = CountConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = CountConfig {
            substring: "TODO".to_string(),
            source_type: SourceKind::File,
            pool_size: NonZeroUsize::new(4).unwrap(),
            time_limit: Duration::from_secs(10),
            error_policy: ErrorPolicy::First,
            encoding_mode: EncodingMode::Lossy,
            log_level: "info".to_string(),
        };

        let overrides = ConfigOverrides {
            substring: Some("FIXME".to_string()),
            pool_size: Some(NonZeroUsize::new(8).unwrap()),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        let merged = file_config.merge_with_cli(overrides);
        assert_eq!(merged.substring, "FIXME"); // CLI value
        assert_eq!(merged.source_type, SourceKind::File); // File value
        assert_eq!(merged.pool_size, NonZeroUsize::new(8).unwrap()); // CLI value
        assert_eq!(merged.time_limit, Duration::from_secs(10)); // File value
        assert_eq!(merged.error_policy, ErrorPolicy::First); // File value
        assert_eq!(merged.log_level, "debug"); // CLI value
    }

    #[test]
    fn test_parse_pool_size() {
        assert_eq!(parse_pool_size(3).unwrap().get(), 3);
        for raw in [0, -1, i64::MIN] {
            let err = parse_pool_size(raw).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Configuration error: pool-size should be greater than 0"
            );
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("First".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::First);
        assert_eq!("last".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Last);
        assert!("middle".parse::<ErrorPolicy>().is_err());
        assert_eq!(
            "failfast".parse::<EncodingMode>().unwrap(),
            EncodingMode::FailFast
        );
        assert!("ascii".parse::<EncodingMode>().is_err());
    }
}
