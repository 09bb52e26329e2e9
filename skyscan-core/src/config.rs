//! Configuration for skyscan.
//!
//! Reads/writes `~/.skyscan/config.yaml` with observer location, selection
//! thresholds, and service settings. Command-line flags and environment
//! variables are layered on top by the binary; the merged result must pass
//! `Config::validate` before an engine is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::filter::OcclusionMap;
use crate::geo::Location;
use crate::ledger::STALE_TIMEOUT;
use crate::types::{Result, SkyscanError};

// ---------------------------------------------------------------------------
// Switch hysteresis
// ---------------------------------------------------------------------------

/// Minimum improvement required before abandoning the current target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "policy", content = "value", rename_all = "snake_case")]
pub enum SwitchMargin {
    /// Switch when `current - best >= meters`.
    Absolute(f64),
    /// Switch when `(current - best) / current > fraction`.
    Relative(f64),
}

impl SwitchMargin {
    pub fn from_policy(policy: &str, value: f64) -> Result<Self> {
        match policy.trim().to_ascii_lowercase().as_str() {
            "absolute" => Ok(SwitchMargin::Absolute(value)),
            "relative" => Ok(SwitchMargin::Relative(value)),
            other => Err(SkyscanError::Config(format!(
                "unknown switch policy '{other}' (expected absolute or relative)"
            ))),
        }
    }

    pub fn policy(&self) -> &'static str {
        match self {
            SwitchMargin::Absolute(_) => "absolute",
            SwitchMargin::Relative(_) => "relative",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            SwitchMargin::Absolute(v) | SwitchMargin::Relative(v) => *v,
        }
    }

    /// Whether moving from `current_m` to `best_m` clears the margin.
    pub fn permits_switch(&self, current_m: f64, best_m: f64) -> bool {
        let improvement = current_m - best_m;
        match self {
            SwitchMargin::Absolute(meters) => improvement >= *meters,
            SwitchMargin::Relative(fraction) => {
                current_m > 0.0 && improvement / current_m > *fraction
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config structures
// ---------------------------------------------------------------------------

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub observer: ObserverConfig,
    pub service: ServiceConfig,
}

/// Camera location and selection constraints. Immutable once an engine is
/// built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverConfig {
    pub location: Location,
    pub min_tilt_deg: f64,
    pub max_tilt_deg: f64,
    pub min_altitude_m: f64,
    pub max_altitude_m: f64,
    /// Maximum ground range from the observer, if any.
    pub max_range_m: Option<f64>,
    /// Seconds without a report before an aircraft is evicted.
    pub stale_after: f64,
    pub switch_margin: SwitchMargin,
    /// Seconds of dead-reckoning applied before evaluation.
    pub lead_time: f64,
    /// Minimum seconds between refresh commands for an unchanged target.
    pub refresh_interval: f64,
    /// JSON occlusion map file; loaded into `occlusion` by `load_occlusion`.
    pub mapping_filepath: Option<String>,
    pub occlusion: Option<OcclusionMap>,
}

/// Settings for the long-running service around the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub hostname: String,
    pub host: String,
    pub port: u16,
    pub tick_interval: f64,
    pub heartbeat_interval: f64,
    /// Base URL pointing commands are POSTed to (`<url>/<topic>`).
    pub publish_url: Option<String>,
    pub auth_token: Option<String>,
    pub object_topic: String,
    pub prioritized_ledger_topic: String,
    pub heartbeat_topic: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            location: Location::new(0.0, 0.0, 0.0),
            min_tilt_deg: 0.0,
            max_tilt_deg: 90.0,
            min_altitude_m: 0.0,
            max_altitude_m: 100_000_000.0,
            max_range_m: None,
            stale_after: STALE_TIMEOUT,
            switch_margin: SwitchMargin::Absolute(500.0),
            lead_time: 0.0,
            refresh_interval: 1.0,
            mapping_filepath: None,
            occlusion: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            hostname: "skyscan".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            tick_interval: 1.0,
            heartbeat_interval: 10.0,
            publish_url: None,
            auth_token: None,
            object_topic: "skyscan/c2/object".into(),
            prioritized_ledger_topic: "skyscan/c2/prioritized-ledger".into(),
            heartbeat_topic: "skyscan/c2/heartbeat".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn config_err(msg: String) -> SkyscanError {
    SkyscanError::Config(msg)
}

fn check_finite(name: &str, v: f64) -> Result<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(config_err(format!("{name} must be finite, got {v}")))
    }
}

impl ObserverConfig {
    /// Reject self-contradictory or out-of-range constraints.
    pub fn validate(&self) -> Result<()> {
        self.location
            .validate()
            .map_err(|e| config_err(format!("observer location: {e}")))?;

        check_finite("min_tilt", self.min_tilt_deg)?;
        check_finite("max_tilt", self.max_tilt_deg)?;
        for (name, v) in [("min_tilt", self.min_tilt_deg), ("max_tilt", self.max_tilt_deg)] {
            if !(-90.0..=90.0).contains(&v) {
                return Err(config_err(format!("{name} {v} outside [-90, 90]")));
            }
        }
        if self.min_tilt_deg > self.max_tilt_deg {
            return Err(config_err(format!(
                "min_tilt {} > max_tilt {}",
                self.min_tilt_deg, self.max_tilt_deg
            )));
        }

        check_finite("min_altitude", self.min_altitude_m)?;
        check_finite("max_altitude", self.max_altitude_m)?;
        if self.min_altitude_m > self.max_altitude_m {
            return Err(config_err(format!(
                "min_altitude {} > max_altitude {}",
                self.min_altitude_m, self.max_altitude_m
            )));
        }

        if let Some(range) = self.max_range_m {
            check_finite("max_range", range)?;
            if range <= 0.0 {
                return Err(config_err(format!("max_range must be positive, got {range}")));
            }
        }

        check_finite("stale_after", self.stale_after)?;
        if self.stale_after <= 0.0 {
            return Err(config_err(format!(
                "stale_after must be positive, got {}",
                self.stale_after
            )));
        }

        let margin = self.switch_margin.value();
        check_finite("switch_margin", margin)?;
        if margin < 0.0 {
            return Err(config_err(format!("switch_margin must be >= 0, got {margin}")));
        }
        if matches!(self.switch_margin, SwitchMargin::Relative(f) if f >= 1.0) {
            return Err(config_err(format!(
                "relative switch_margin must be < 1, got {margin}"
            )));
        }

        for (name, v) in [
            ("lead_time", self.lead_time),
            ("refresh_interval", self.refresh_interval),
        ] {
            check_finite(name, v)?;
            if v < 0.0 {
                return Err(config_err(format!("{name} must be >= 0, got {v}")));
            }
        }

        if self.mapping_filepath.is_some() && self.occlusion.is_none() {
            return Err(config_err("occlusion map configured but not loaded".into()));
        }
        Ok(())
    }

    /// Load the occlusion map named by `mapping_filepath`, if any.
    pub fn load_occlusion(&mut self) -> Result<()> {
        self.occlusion = match &self.mapping_filepath {
            Some(path) => Some(OcclusionMap::load(Path::new(path))?),
            None => None,
        };
        Ok(())
    }
}

/// A positive interval in seconds that a `Duration` can hold.
fn period(name: &str, v: f64) -> Result<Duration> {
    check_finite(name, v)?;
    if v <= 0.0 {
        return Err(config_err(format!("{name} must be positive, got {v}")));
    }
    Duration::try_from_secs_f64(v)
        .map_err(|e| config_err(format!("{name} out of range ({v}): {e}")))
}

impl ServiceConfig {
    pub fn tick_period(&self) -> Result<Duration> {
        period("tick_interval", self.tick_interval)
    }

    pub fn heartbeat_period(&self) -> Result<Duration> {
        period("heartbeat_interval", self.heartbeat_interval)
    }

    pub fn validate(&self) -> Result<()> {
        self.tick_period()?;
        self.heartbeat_period()?;
        for (name, topic) in [
            ("object_topic", &self.object_topic),
            ("prioritized_ledger_topic", &self.prioritized_ledger_topic),
            ("heartbeat_topic", &self.heartbeat_topic),
        ] {
            if topic.trim().is_empty() {
                return Err(config_err(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.observer.validate()?;
        self.service.validate()
    }
}

// ---------------------------------------------------------------------------
// File location
// ---------------------------------------------------------------------------

/// Get the config directory path (`~/.skyscan/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".skyscan")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`.
///
/// Returns default config if the file doesn't exist; a file that exists but
/// cannot be read or parsed is an error.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Load config from `~/.skyscan/config.yaml`.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_file())
}

/// Save config to `path`, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Save config to `~/.skyscan/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;
    let mut switch_policy = config.observer.switch_margin.policy().to_string();
    let mut switch_value = config.observer.switch_margin.value();

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            return Err(config_err(format!("line {}: expected 'key: value'", lineno + 1)));
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            if val.is_empty() {
                current_section = Some(key.to_string());
            } else {
                current_section = None;
                tracing::warn!("config line {}: ignoring top-level key '{key}'", lineno + 1);
            }
            continue;
        }

        let Some(section) = current_section.as_deref() else {
            continue;
        };
        let at = |e: SkyscanError| config_err(format!("line {}: {e}", lineno + 1));
        let obs = &mut config.observer;
        let svc = &mut config.service;

        match (section, key) {
            ("observer", "latitude") => obs.location.latitude = parse_float(key, val).map_err(at)?,
            ("observer", "longitude") => {
                obs.location.longitude = parse_float(key, val).map_err(at)?
            }
            ("observer", "altitude") => obs.location.altitude = parse_float(key, val).map_err(at)?,
            ("observer", "mapping_filepath") => obs.mapping_filepath = parse_string_value(val),

            ("selection", "min_tilt") => obs.min_tilt_deg = parse_float(key, val).map_err(at)?,
            ("selection", "max_tilt") => obs.max_tilt_deg = parse_float(key, val).map_err(at)?,
            ("selection", "min_altitude") => {
                obs.min_altitude_m = parse_float(key, val).map_err(at)?
            }
            ("selection", "max_altitude") => {
                obs.max_altitude_m = parse_float(key, val).map_err(at)?
            }
            ("selection", "max_range") => {
                obs.max_range_m = parse_opt_float(key, val).map_err(at)?
            }
            ("selection", "stale_after") => obs.stale_after = parse_float(key, val).map_err(at)?,
            ("selection", "switch_policy") => {
                switch_policy = parse_string_value(val).unwrap_or_default()
            }
            ("selection", "switch_margin") => switch_value = parse_float(key, val).map_err(at)?,
            ("selection", "lead_time") => obs.lead_time = parse_float(key, val).map_err(at)?,
            ("selection", "refresh_interval") => {
                obs.refresh_interval = parse_float(key, val).map_err(at)?
            }

            ("service", "hostname") => {
                if let Some(v) = parse_string_value(val) {
                    svc.hostname = v;
                }
            }
            ("service", "host") => {
                if let Some(v) = parse_string_value(val) {
                    svc.host = v;
                }
            }
            ("service", "port") => {
                svc.port = val
                    .parse::<u16>()
                    .map_err(|_| config_err(format!("line {}: invalid port '{val}'", lineno + 1)))?
            }
            ("service", "tick_interval") => {
                svc.tick_interval = parse_float(key, val).map_err(at)?
            }
            ("service", "heartbeat_interval") => {
                svc.heartbeat_interval = parse_float(key, val).map_err(at)?
            }
            ("service", "publish_url") => svc.publish_url = parse_string_value(val),
            ("service", "object_topic") => {
                if let Some(v) = parse_string_value(val) {
                    svc.object_topic = v;
                }
            }
            ("service", "prioritized_ledger_topic") => {
                if let Some(v) = parse_string_value(val) {
                    svc.prioritized_ledger_topic = v;
                }
            }
            ("service", "heartbeat_topic") => {
                if let Some(v) = parse_string_value(val) {
                    svc.heartbeat_topic = v;
                }
            }
            _ => tracing::warn!("config line {}: ignoring unknown key {section}.{key}", lineno + 1),
        }
    }

    config.observer.switch_margin = SwitchMargin::from_policy(&switch_policy, switch_value)?;
    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_opt_float(key: &str, val: &str) -> Result<Option<f64>> {
    if val == "null" || val == "~" || val.is_empty() {
        return Ok(None);
    }
    val.parse()
        .map(Some)
        .map_err(|_| config_err(format!("invalid number for {key}: '{val}'")))
}

fn parse_float(key: &str, val: &str) -> Result<f64> {
    parse_opt_float(key, val)?.ok_or_else(|| config_err(format!("{key} requires a value")))
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn opt_float(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "null".into())
}

fn opt_string(v: &Option<String>) -> String {
    v.as_ref()
        .map(|v| format!("\"{v}\""))
        .unwrap_or_else(|| "null".into())
}

/// Serialize config to YAML-like text. The auth token is never written.
pub fn serialize_config(config: &Config) -> String {
    let obs = &config.observer;
    let svc = &config.service;
    let mut lines = vec!["# skyscan configuration".to_string(), String::new()];

    lines.push("observer:".into());
    lines.push(format!("  latitude: {}", obs.location.latitude));
    lines.push(format!("  longitude: {}", obs.location.longitude));
    lines.push(format!("  altitude: {}", obs.location.altitude));
    lines.push(format!("  mapping_filepath: {}", opt_string(&obs.mapping_filepath)));
    lines.push(String::new());

    lines.push("selection:".into());
    lines.push(format!("  min_tilt: {}", obs.min_tilt_deg));
    lines.push(format!("  max_tilt: {}", obs.max_tilt_deg));
    lines.push(format!("  min_altitude: {}", obs.min_altitude_m));
    lines.push(format!("  max_altitude: {}", obs.max_altitude_m));
    lines.push(format!("  max_range: {}", opt_float(obs.max_range_m)));
    lines.push(format!("  stale_after: {}", obs.stale_after));
    lines.push(format!("  switch_policy: {}", obs.switch_margin.policy()));
    lines.push(format!("  switch_margin: {}", obs.switch_margin.value()));
    lines.push(format!("  lead_time: {}", obs.lead_time));
    lines.push(format!("  refresh_interval: {}", obs.refresh_interval));
    lines.push(String::new());

    lines.push("service:".into());
    lines.push(format!("  hostname: \"{}\"", svc.hostname));
    lines.push(format!("  host: \"{}\"", svc.host));
    lines.push(format!("  port: {}", svc.port));
    lines.push(format!("  tick_interval: {}", svc.tick_interval));
    lines.push(format!("  heartbeat_interval: {}", svc.heartbeat_interval));
    lines.push(format!("  publish_url: {}", opt_string(&svc.publish_url)));
    lines.push(format!("  object_topic: \"{}\"", svc.object_topic));
    lines.push(format!(
        "  prioritized_ledger_topic: \"{}\"",
        svc.prioritized_ledger_topic
    ));
    lines.push(format!("  heartbeat_topic: \"{}\"", svc.heartbeat_topic));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.service.port, 8080);
        assert_eq!(config.observer.switch_margin, SwitchMargin::Absolute(500.0));
        assert_eq!(config.observer.stale_after, 60.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let text = r#"
observer:
  latitude: 38.9
  longitude: -77.0
  altitude: 25.0

selection:
  min_tilt: 5
  max_tilt: 85
  min_altitude: 100
  max_altitude: 12000
  max_range: 40000
  stale_after: 30
  switch_policy: relative
  switch_margin: 0.1
  lead_time: 1.5

service:
  hostname: "tripod-1"
  port: 9090
  tick_interval: 0.5
  publish_url: "http://127.0.0.1:9000/publish"
"#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.observer.location.latitude, 38.9);
        assert_eq!(config.observer.location.longitude, -77.0);
        assert_eq!(config.observer.min_tilt_deg, 5.0);
        assert_eq!(config.observer.max_range_m, Some(40000.0));
        assert_eq!(config.observer.stale_after, 30.0);
        assert_eq!(config.observer.switch_margin, SwitchMargin::Relative(0.1));
        assert_eq!(config.observer.lead_time, 1.5);
        assert_eq!(config.service.hostname, "tripod-1");
        assert_eq!(config.service.port, 9090);
        assert_eq!(config.service.tick_interval, 0.5);
        assert_eq!(
            config.service.publish_url.as_deref(),
            Some("http://127.0.0.1:9000/publish")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config_null_values() {
        let text = r#"
selection:
  max_range: null
service:
  publish_url: ~
"#;
        let config = parse_config(text).unwrap();
        assert!(config.observer.max_range_m.is_none());
        assert!(config.service.publish_url.is_none());
    }

    #[test]
    fn test_parse_config_bad_number() {
        let err = parse_config("selection:\n  min_tilt: steep\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_config("service:\n  port: 99999\n").is_err());
        assert!(parse_config("selection:\n  switch_policy: sideways\n").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.observer.location = Location::new(35.5, -82.5, 640.0);
        config.observer.max_range_m = Some(25_000.0);
        config.observer.switch_margin = SwitchMargin::Relative(0.2);
        config.service.port = 9090;
        config.service.auth_token = Some("secret".into());

        let text = serialize_config(&config);
        assert!(!text.contains("secret"));

        let parsed = parse_config(&text).unwrap();
        assert_eq!(parsed.observer, config.observer);
        assert_eq!(parsed.service.port, 9090);
        assert!(parsed.service.auth_token.is_none());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.observer.min_altitude_m = 150.0;

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.observer.min_altitude_m, 150.0);

        let missing = load_config_from(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(missing, Config::default());
    }

    #[test]
    fn test_validate_contradictory_altitudes() {
        let mut config = Config::default();
        config.observer.min_altitude_m = 5000.0;
        config.observer.max_altitude_m = 1000.0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SkyscanError::Config(_)));
        assert!(err.to_string().contains("min_altitude"));
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let cases: Vec<Box<dyn Fn(&mut Config)>> = vec![
            Box::new(|c| c.observer.min_tilt_deg = 95.0),
            Box::new(|c| {
                c.observer.min_tilt_deg = 60.0;
                c.observer.max_tilt_deg = 30.0;
            }),
            Box::new(|c| c.observer.location.latitude = 100.0),
            Box::new(|c| c.observer.stale_after = 0.0),
            Box::new(|c| c.observer.switch_margin = SwitchMargin::Absolute(-1.0)),
            Box::new(|c| c.observer.switch_margin = SwitchMargin::Relative(1.5)),
            Box::new(|c| c.observer.max_range_m = Some(0.0)),
            Box::new(|c| c.observer.lead_time = f64::NAN),
            Box::new(|c| c.service.tick_interval = 0.0),
            Box::new(|c| c.service.tick_interval = 1e300),
            Box::new(|c| c.service.heartbeat_interval = f64::MAX),
            Box::new(|c| c.service.object_topic = " ".into()),
            Box::new(|c| c.observer.mapping_filepath = Some("mapping.json".into())),
        ];
        for (i, mutate) in cases.iter().enumerate() {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(config.validate().is_err(), "case {i} should be rejected");
        }
    }

    #[test]
    fn test_service_periods() {
        let mut service = ServiceConfig {
            tick_interval: 0.25,
            ..ServiceConfig::default()
        };
        assert_eq!(service.tick_period().unwrap(), Duration::from_millis(250));

        service.tick_interval = 1e300;
        let err = service.tick_period().unwrap_err();
        assert!(matches!(err, SkyscanError::Config(_)));
        assert!(err.to_string().contains("tick_interval"));
    }

    #[test]
    fn test_load_occlusion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(&path, r#"[{"azimuth": 180, "elevation": 10}]"#).unwrap();

        let mut obs = ObserverConfig {
            mapping_filepath: Some(path.to_string_lossy().into_owned()),
            ..ObserverConfig::default()
        };
        obs.load_occlusion().unwrap();
        assert_eq!(obs.occlusion.as_ref().map(|m| m.len()), Some(1));
        assert!(obs.validate().is_ok());

        obs.mapping_filepath = Some(dir.path().join("nope.json").to_string_lossy().into_owned());
        assert!(obs.load_occlusion().is_err());
    }

    #[test]
    fn test_switch_margin_policies() {
        let abs = SwitchMargin::Absolute(500.0);
        assert!(abs.permits_switch(9800.0, 9000.0));
        assert!(abs.permits_switch(9500.0, 9000.0));
        assert!(!abs.permits_switch(9000.0, 8950.0));

        let rel = SwitchMargin::Relative(0.1);
        assert!(rel.permits_switch(10_000.0, 8_900.0));
        assert!(!rel.permits_switch(10_000.0, 9_000.0));
        assert!(!rel.permits_switch(0.0, 0.0));
    }
}
