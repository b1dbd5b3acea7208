//! Defines all configuration structures for the admissions engine.
//!
//! Settings are layered with the `config` crate: serde defaults first, then an
//! optional TOML file, then `VIBHA__*` environment variables (for example
//! `VIBHA__SUBMISSION__DELAY_MS=500`).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory when no
/// explicit path is given. The extension is resolved by the `config` crate.
pub const DEFAULT_CONFIG_NAME: &str = "vibha";

/// Prefix of the environment variables that override file settings.
pub const ENV_PREFIX: &str = "VIBHA";

/// The top-level configuration for the `AdmissionsEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// The tick speed of the master `SystemClock`. Countdowns are recomputed
    /// on every tick, so the default is one tick per second.
    #[serde(default)]
    pub resolution: ClockResolution,

    /// The school's timezone. Deadlines are written in local time.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Named deadlines to mount as countdowns at startup.
    #[serde(default)]
    pub deadlines: Vec<DeadlineConfig>,

    #[serde(default)]
    pub submission: SubmissionConfig,

    #[serde(default)]
    pub rotator: RotatorConfig,
}

/// Defines the operational speed of the `SystemClock`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// ~60 ticks per second.
    High,
    /// ~30 ticks per second.
    Medium,
    /// 1 tick per second, the countdown's natural cadence.
    #[default]
    Low,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
}

/// A named deadline, such as the close of admissions.
#[derive(Debug, Clone, Deserialize)]
pub struct DeadlineConfig {
    /// Shown as the countdown's title, e.g. "Admissions Closing In".
    pub name: String,
    /// Local date-time in the configured timezone, e.g. `2026-03-31T23:59:59`.
    pub closes_at: NaiveDateTime,
}

impl DeadlineConfig {
    /// Resolves the local deadline to an instant.
    ///
    /// Returns `None` when the local time does not exist in `timezone`
    /// (a DST gap). An ambiguous time resolves to its earliest instant.
    pub fn target(&self, timezone: &Tz) -> Option<DateTime<Utc>> {
        timezone
            .from_local_datetime(&self.closes_at)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}

/// Settings for the simulated submission collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Fixed latency of every simulated submission, in milliseconds.
    #[serde(default = "default_submission_delay_ms")]
    pub delay_ms: u64,

    /// When set, every simulated submission fails with this reason.
    #[serde(default)]
    pub fail_with: Option<String>,
}

impl SubmissionConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Settings for testimonial rotators.
#[derive(Debug, Clone, Deserialize)]
pub struct RotatorConfig {
    #[serde(default = "default_rotator_interval_ms")]
    pub interval_ms: u64,
}

impl RotatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// --- Default value functions for serde ---

fn default_timezone() -> Tz {
    Tz::Asia__Kolkata
}

fn default_submission_delay_ms() -> u64 {
    2000
}

fn default_rotator_interval_ms() -> u64 {
    5000
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_submission_delay_ms(),
            fail_with: None,
        }
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_rotator_interval_ms(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            resolution: ClockResolution::default(),
            timezone: default_timezone(),
            deadlines: Vec::new(),
            submission: SubmissionConfig::default(),
            rotator: RotatorConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Loads configuration from an optional file and the environment.
    ///
    /// An explicit `path` must exist. Without one, `vibha.toml` in the working
    /// directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parses configuration from TOML text, without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Resolves every configured deadline, skipping the ones that fall in a
    /// DST gap.
    pub fn deadline_targets(&self) -> Vec<(String, DateTime<Utc>)> {
        self.deadlines
            .iter()
            .filter_map(|deadline| {
                deadline
                    .target(&self.timezone)
                    .map(|target| (deadline.name.clone(), target))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SiteConfig::from_toml_str("").unwrap();
        assert_eq!(config.resolution, ClockResolution::Low);
        assert_eq!(config.timezone, Tz::Asia__Kolkata);
        assert_eq!(config.submission.delay(), Duration::from_secs(2));
        assert!(config.submission.fail_with.is_none());
        assert_eq!(config.rotator.interval(), Duration::from_secs(5));
        assert!(config.deadlines.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let config = SiteConfig::from_toml_str(
            r#"
            resolution = "medium"
            timezone = "Europe/London"

            [submission]
            delay_ms = 250
            fail_with = "service unavailable"

            [rotator]
            interval_ms = 8000

            [[deadlines]]
            name = "Admissions Closing In"
            closes_at = "2026-03-31T23:59:59"
            "#,
        )
        .unwrap();

        assert_eq!(config.resolution, ClockResolution::Medium);
        assert_eq!(config.timezone, Tz::Europe__London);
        assert_eq!(config.submission.delay_ms, 250);
        assert_eq!(config.submission.fail_with.as_deref(), Some("service unavailable"));
        assert_eq!(config.rotator.interval_ms, 8000);
        assert_eq!(config.deadlines.len(), 1);
        assert_eq!(config.deadlines[0].name, "Admissions Closing In");
    }

    #[test]
    fn deadline_is_resolved_in_school_timezone() {
        let config = SiteConfig::from_toml_str(
            r#"
            [[deadlines]]
            name = "Admissions"
            closes_at = "2026-03-31T18:00:00"
            "#,
        )
        .unwrap();

        let targets = config.deadline_targets();
        assert_eq!(targets.len(), 1);
        // Asia/Kolkata is UTC+05:30 all year round.
        let expected = Utc.with_ymd_and_hms(2026, 3, 31, 12, 30, 0).unwrap();
        assert_eq!(targets[0], ("Admissions".to_string(), expected));
    }

    #[test]
    fn deadline_in_dst_gap_is_skipped() {
        let config = SiteConfig::from_toml_str(
            r#"
            timezone = "Europe/London"

            [[deadlines]]
            name = "Lost hour"
            closes_at = "2026-03-29T01:30:00"
            "#,
        )
        .unwrap();

        assert!(config.deadline_targets().is_empty());
    }

    #[test]
    fn environment_overrides_defaults() {
        // No other test reads this key, so setting it cannot race.
        std::env::set_var("VIBHA__ROTATOR__INTERVAL_MS", "7500");
        let config = SiteConfig::load(None);
        std::env::remove_var("VIBHA__ROTATOR__INTERVAL_MS");

        let config = config.unwrap();
        assert_eq!(config.rotator.interval(), Duration::from_millis(7500));
        assert_eq!(config.resolution, ClockResolution::Low);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = SiteConfig::load(Some(Path::new("/nonexistent/vibha.toml")));
        assert!(result.is_err());
    }
}
