//! Runtime settings, read from `SLOTKEEPER_*` environment variables.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};

use crate::limits::MAX_SLOT_DURATION_MINUTES;

#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Settings the HTTP layer needs on every request.
#[derive(Debug, Clone)]
pub struct Settings {
    pub default_slot_minutes: u32,
    pub urgent_slot_minutes: u32,
    /// Offset used to turn a calendar date into a day span.
    pub utc_offset: FixedOffset,
    pub dedup_slots: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_slot_minutes: 30,
            urgent_slot_minutes: 15,
            utc_offset: Utc.fix(),
            dedup_slots: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Keep state in memory only; nothing is written to `data_dir`.
    pub ephemeral: bool,
    pub metrics_port: Option<u16>,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults; set but
    /// unparsable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind = parse_or(&get, "SLOTKEEPER_BIND", IpAddr::from([0, 0, 0, 0]))?;
        let port = parse_or(&get, "SLOTKEEPER_PORT", 8080u16)?;
        let data_dir = get("SLOTKEEPER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let ephemeral = parse_bool(&get, "SLOTKEEPER_EPHEMERAL")?;
        let metrics_port = get("SLOTKEEPER_METRICS_PORT")
            .map(|v| parse_value::<u16>("SLOTKEEPER_METRICS_PORT", &v))
            .transpose()?;
        let compact_threshold = parse_or(&get, "SLOTKEEPER_COMPACT_THRESHOLD", 1000u64)?;
        if compact_threshold == 0 {
            return Err(ConfigError("SLOTKEEPER_COMPACT_THRESHOLD must be positive".into()));
        }

        let default_slot_minutes = slot_minutes(&get, "SLOTKEEPER_DEFAULT_SLOT_MINUTES", 30)?;
        let urgent_slot_minutes = slot_minutes(&get, "SLOTKEEPER_URGENT_SLOT_MINUTES", 15)?;
        let offset_minutes = parse_or(&get, "SLOTKEEPER_UTC_OFFSET_MINUTES", 0i32)?;
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError(format!(
                    "SLOTKEEPER_UTC_OFFSET_MINUTES out of range: {offset_minutes}"
                ))
            })?;
        let dedup_slots = parse_bool(&get, "SLOTKEEPER_DEDUP_SLOTS")?;

        Ok(Self {
            bind,
            port,
            data_dir,
            ephemeral,
            metrics_port,
            compact_threshold,
            settings: Settings {
                default_slot_minutes,
                urgent_slot_minutes,
                utc_offset,
                dedup_slots,
            },
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotkeeper.wal")
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ConfigError(format!("failed to parse {key}={raw:?}: {e}")))
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    let Some(raw) = get(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError(format!("{key} must be a boolean, got {raw:?}"))),
    }
}

fn slot_minutes(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    let minutes = parse_or(get, key, default)?;
    if minutes == 0 || minutes > MAX_SLOT_DURATION_MINUTES {
        return Err(ConfigError(format!(
            "{key} must be between 1 and {MAX_SLOT_DURATION_MINUTES}, got {minutes}"
        )));
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind, IpAddr::from([0, 0, 0, 0]));
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.data_dir, PathBuf::from("./data"));
        assert!(!cfg.ephemeral);
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.settings.default_slot_minutes, 30);
        assert_eq!(cfg.settings.urgent_slot_minutes, 15);
        assert_eq!(cfg.settings.utc_offset.local_minus_utc(), 0);
        assert!(!cfg.settings.dedup_slots);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/slotkeeper.wal"));
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("SLOTKEEPER_BIND", "127.0.0.1"),
            ("SLOTKEEPER_PORT", "9000"),
            ("SLOTKEEPER_DATA_DIR", "/var/lib/slotkeeper"),
            ("SLOTKEEPER_EPHEMERAL", "true"),
            ("SLOTKEEPER_METRICS_PORT", "9100"),
            ("SLOTKEEPER_COMPACT_THRESHOLD", "50"),
            ("SLOTKEEPER_DEFAULT_SLOT_MINUTES", "20"),
            ("SLOTKEEPER_URGENT_SLOT_MINUTES", "10"),
            ("SLOTKEEPER_UTC_OFFSET_MINUTES", "-300"),
            ("SLOTKEEPER_DEDUP_SLOTS", "yes"),
        ])
        .unwrap();
        assert_eq!(cfg.bind, IpAddr::from([127, 0, 0, 1]));
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/slotkeeper"));
        assert!(cfg.ephemeral);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 50);
        assert_eq!(cfg.settings.default_slot_minutes, 20);
        assert_eq!(cfg.settings.urgent_slot_minutes, 10);
        assert_eq!(cfg.settings.utc_offset.local_minus_utc(), -300 * 60);
        assert!(cfg.settings.dedup_slots);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let cfg = config(&[("SLOTKEEPER_PORT", ""), ("SLOTKEEPER_METRICS_PORT", " ")]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("SLOTKEEPER_PORT", "eighty")]).is_err());
        assert!(config(&[("SLOTKEEPER_BIND", "localhost")]).is_err());
        assert!(config(&[("SLOTKEEPER_EPHEMERAL", "maybe")]).is_err());
        assert!(config(&[("SLOTKEEPER_COMPACT_THRESHOLD", "0")]).is_err());
        assert!(config(&[("SLOTKEEPER_DEFAULT_SLOT_MINUTES", "0")]).is_err());
        assert!(config(&[("SLOTKEEPER_URGENT_SLOT_MINUTES", "481")]).is_err());
        assert!(config(&[("SLOTKEEPER_UTC_OFFSET_MINUTES", "1440")]).is_err());
    }
}
