use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::criteria::{UnparsableTimestamp, ValidationPolicy};
use crate::layout::Resolution;

pub const DEFAULT_API_BASE_URL: &str = "https://api.clashofclans.com/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Real mouse, keyboard and screen of this machine, with the emulator window on it.
    Desktop,
    /// An Android device over adb. Layout points are device pixels, not desktop points.
    Adb,
    DryRun,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub api_base_url: String,
    pub backend: BackendKind,
    pub adb_path: String,
    pub adb_serial: Option<String>,
    /// adb only: host command printing the clipboard to stdout (e.g. `xclip -selection clipboard -o`).
    pub clipboard_command: Option<Vec<String>>,
    /// Skip display detection and resolve the layout for this resolution.
    pub resolution: Option<Resolution>,
    pub layout_file: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub max_cycles: u32,
    pub max_pages: u32,
    pub focus_delay: Duration,
    pub confidence: f32,
    pub dry_run_tags: Vec<String>,
    pub activity_days: i64,
    pub unparsable_last_seen: UnparsableTimestamp,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_token = lookup("CLASH_API_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("CLASH_API_TOKEN".into()))?;

        let api_base_url =
            lookup("CLASH_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.into());

        let backend = match lookup("RECRUITER_BACKEND").as_deref() {
            None | Some("desktop") => BackendKind::Desktop,
            Some("adb") => BackendKind::Adb,
            Some("dry-run") | Some("dry_run") => BackendKind::DryRun,
            Some(other) => {
                return Err(invalid("RECRUITER_BACKEND", format!("unknown backend {other:?}")));
            }
        };

        let adb_path = lookup("RECRUITER_ADB_PATH").unwrap_or_else(|| "adb".into());
        let adb_serial = lookup("RECRUITER_ADB_SERIAL").filter(|s| !s.is_empty());

        let clipboard_command = lookup("RECRUITER_CLIPBOARD_CMD")
            .map(|cmd| cmd.split_whitespace().map(String::from).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());

        let resolution = lookup("RECRUITER_RESOLUTION")
            .map(|value| {
                value
                    .parse::<Resolution>()
                    .map_err(|e| invalid("RECRUITER_RESOLUTION", e))
            })
            .transpose()?;

        let layout_file = lookup("RECRUITER_LAYOUT_FILE").map(PathBuf::from);
        let assets_dir = lookup("RECRUITER_ASSETS_DIR").map(PathBuf::from);

        let max_cycles = parse_or(&lookup, "RECRUITER_MAX_CYCLES", 100u32)?;
        let max_pages = parse_or(&lookup, "RECRUITER_MAX_PAGES", 12u32)?;
        let focus_delay = Duration::from_secs(parse_or(&lookup, "RECRUITER_FOCUS_DELAY_SECS", 8u64)?);

        let confidence = parse_or(&lookup, "RECRUITER_CONFIDENCE", 0.8f32)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(invalid("RECRUITER_CONFIDENCE", "must be between 0 and 1"));
        }

        let dry_run_tags = lookup("RECRUITER_DRY_RUN_TAGS")
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let activity_days = parse_or(&lookup, "RECRUITER_ACTIVITY_DAYS", 30i64)?;

        let unparsable_last_seen = match lookup("RECRUITER_UNPARSABLE_LAST_SEEN").as_deref() {
            None | Some("active") => UnparsableTimestamp::AssumeActive,
            Some("inactive") => UnparsableTimestamp::AssumeInactive,
            Some(other) => {
                return Err(invalid(
                    "RECRUITER_UNPARSABLE_LAST_SEEN",
                    format!("expected \"active\" or \"inactive\", got {other:?}"),
                ));
            }
        };

        Ok(Config {
            api_token,
            api_base_url,
            backend,
            adb_path,
            adb_serial,
            clipboard_command,
            resolution,
            layout_file,
            assets_dir,
            max_cycles,
            max_pages,
            focus_delay,
            confidence,
            dry_run_tags,
            activity_days,
            unparsable_last_seen,
        })
    }
}

impl Config {
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            activity_window: chrono::Duration::days(self.activity_days),
            unparsable_last_seen: self.unparsable_last_seen,
            ..ValidationPolicy::default()
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| invalid(name, e)),
        None => Ok(default),
    }
}

fn invalid(name: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name: name.into(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let err = config_with(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(ref name) if name == "CLASH_API_TOKEN"));
    }

    #[test]
    fn test_blank_token_is_an_error() {
        assert!(config_with(&[("CLASH_API_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[("CLASH_API_TOKEN", "secret")]).unwrap();
        assert_eq!(config.api_token, "secret");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.backend, BackendKind::Desktop);
        assert_eq!(config.max_cycles, 100);
        assert_eq!(config.max_pages, 12);
        assert_eq!(config.focus_delay, Duration::from_secs(8));
        assert!((config.confidence - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.activity_days, 30);
        assert_eq!(config.unparsable_last_seen, UnparsableTimestamp::AssumeActive);
        assert!(config.resolution.is_none());
        assert!(config.dry_run_tags.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("CLASH_API_TOKEN", "secret"),
            ("RECRUITER_BACKEND", "dry-run"),
            ("RECRUITER_RESOLUTION", "2560x1440"),
            ("RECRUITER_MAX_CYCLES", "3"),
            ("RECRUITER_DRY_RUN_TAGS", "#AAA, BBB ,,"),
            ("RECRUITER_CLIPBOARD_CMD", "xclip -selection clipboard -o"),
            ("RECRUITER_UNPARSABLE_LAST_SEEN", "inactive"),
        ])
        .unwrap();
        assert_eq!(config.backend, BackendKind::DryRun);
        assert_eq!(config.resolution, Some(Resolution::new(2560, 1440)));
        assert_eq!(config.max_cycles, 3);
        assert_eq!(config.dry_run_tags, vec!["#AAA".to_string(), "BBB".to_string()]);
        assert_eq!(config.clipboard_command.unwrap().len(), 4);
        assert_eq!(config.unparsable_last_seen, UnparsableTimestamp::AssumeInactive);
    }

    #[test]
    fn test_backend_names() {
        for (value, expected) in [
            ("desktop", BackendKind::Desktop),
            ("adb", BackendKind::Adb),
            ("dry_run", BackendKind::DryRun),
        ] {
            let config =
                config_with(&[("CLASH_API_TOKEN", "secret"), ("RECRUITER_BACKEND", value)]).unwrap();
            assert_eq!(config.backend, expected, "{value}");
        }
    }

    #[test]
    fn test_validation_policy_follows_config() {
        let config = config_with(&[
            ("CLASH_API_TOKEN", "secret"),
            ("RECRUITER_ACTIVITY_DAYS", "7"),
            ("RECRUITER_UNPARSABLE_LAST_SEEN", "inactive"),
        ])
        .unwrap();
        let policy = config.validation_policy();
        assert_eq!(policy.activity_window, chrono::Duration::days(7));
        assert_eq!(policy.unparsable_last_seen, UnparsableTimestamp::AssumeInactive);
        assert_eq!(policy.min_exp_level, 50);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (name, value) in [
            ("RECRUITER_BACKEND", "x11"),
            ("RECRUITER_MAX_PAGES", "lots"),
            ("RECRUITER_RESOLUTION", "1920*1080"),
            ("RECRUITER_CONFIDENCE", "1.5"),
            ("RECRUITER_UNPARSABLE_LAST_SEEN", "maybe"),
        ] {
            let result = config_with(&[("CLASH_API_TOKEN", "secret"), (name, value)]);
            assert!(
                matches!(result, Err(ConfigError::Invalid { name: ref n, .. }) if n == name),
                "{name}={value} should be rejected"
            );
        }
    }
}
