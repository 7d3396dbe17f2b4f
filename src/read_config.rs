use crate::device::DeviceMode;
use crate::notification::Severity;
use crate::sound_policy::{SoundMapping, SoundOverride};
use serde::de::{Deserializer, Error as DeError};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    InvalidValue { field: &'static str, reason: String },
}

impl std::error::Error for ConfigError {}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse configuration: {}", e),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> ConfigError {
        ConfigError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> ConfigError {
        ConfigError::Parse(err)
    }
}

pub const MAX_VOLUME: u8 = 100;

fn default_device_address() -> u8 {
    67
}

fn default_bank() -> u8 {
    10
}

fn default_volume() -> u8 {
    40
}

fn default_sound() -> Option<i64> {
    Some(1)
}

fn default_server() -> String {
    "127.0.0.1:8375".to_string()
}

fn default_output() -> String {
    STDOUT_OUTPUT.to_string()
}

fn default_startup_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_volume_delay() -> Duration {
    Duration::from_secs(1)
}

/// Output name meaning standard output
pub const STDOUT_OUTPUT: &str = "-";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    pub notification: String,
    #[serde(default, deserialize_with = "deserialize_sound")]
    pub sound: Option<i64>,
}

/// Static configuration, read once at start
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ButtonConfig {
    #[serde(default = "default_device_address")]
    pub device_address: u8,
    #[serde(default = "default_bank")]
    pub bank: u8,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub mode: Option<DeviceMode>,
    #[serde(default = "default_sound", deserialize_with = "deserialize_sound")]
    pub warn_sound: Option<i64>,
    #[serde(default = "default_sound", deserialize_with = "deserialize_sound")]
    pub alert_sound: Option<i64>,
    #[serde(default = "default_sound", deserialize_with = "deserialize_sound")]
    pub alarm_sound: Option<i64>,
    #[serde(default = "default_sound", deserialize_with = "deserialize_sound")]
    pub emergency_sound: Option<i64>,
    #[serde(default)]
    pub mappings: Vec<MappingConfig>,
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(
        default = "default_startup_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub startup_delay: Duration,
    #[serde(
        default = "default_volume_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub volume_delay: Duration,
    #[serde(default)]
    pub silence_on_stop: bool,
}

impl Default for ButtonConfig {
    fn default() -> ButtonConfig {
        ButtonConfig {
            device_address: default_device_address(),
            bank: default_bank(),
            volume: default_volume(),
            mode: None,
            warn_sound: default_sound(),
            alert_sound: default_sound(),
            alarm_sound: default_sound(),
            emergency_sound: default_sound(),
            mappings: Vec::new(),
            server: default_server(),
            output: default_output(),
            startup_delay: default_startup_delay(),
            volume_delay: default_volume_delay(),
            silence_on_stop: false,
        }
    }
}

impl ButtonConfig {
    pub fn sound_mapping(&self) -> SoundMapping {
        let mut defaults = [None; 4];
        defaults[Severity::Warn.index()] = self.warn_sound;
        defaults[Severity::Alert.index()] = self.alert_sound;
        defaults[Severity::Alarm.index()] = self.alarm_sound;
        defaults[Severity::Emergency.index()] = self.emergency_sound;
        let overrides = self
            .mappings
            .iter()
            .map(|m| SoundOverride {
                notification: m.notification.clone(),
                sound: m.sound,
            })
            .collect();
        SoundMapping::new(defaults, overrides)
    }

    // Sound values are not checked here, they fall back when resolved.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.volume > MAX_VOLUME {
            return Err(ConfigError::InvalidValue {
                field: "volume",
                reason: format!("{} is above {}", self.volume, MAX_VOLUME),
            });
        }
        if self.server.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "server",
                reason: "empty address".to_string(),
            });
        }
        if let Some(m) = self.mappings.iter().find(|m| m.notification.is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: "mappings",
                reason: format!("empty notification path for sound {:?}", m.sound),
            });
        }
        Ok(())
    }
}

/// Parse a duration like "5s", "1.5m" or "6h"
pub fn parse_duration(time_str: &str) -> Result<Duration, String> {
    let time_str = time_str.trim();
    let unit_start = time_str
        .char_indices()
        .last()
        .map(|(i, _)| i)
        .ok_or_else(|| "Empty duration".to_string())?;
    let (value_str, unit_str) = time_str.split_at(unit_start);
    let value: f64 = value_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid duration value '{}'", value_str))?;
    let scale = match unit_str {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 60.0 * 60.0,
        u => return Err(format!("Unknown time unit '{}'", u)),
    };
    if !(value.is_finite() && value >= 0.0) {
        return Err(format!("Invalid duration value '{}'", value_str));
    }
    Duration::try_from_secs_f64(value * scale)
        .map_err(|e| format!("Invalid duration value '{}': {}", value_str, e))
}

/// Any JSON value is accepted for a sound. Values that are not integers
/// are read as unset and resolve to the fallback sound.
fn deserialize_sound<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_null() && value.as_i64().is_none() {
        warn!("Sound {} is not a sound number, using fallback", value);
    }
    Ok(value.as_i64())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(D::Error::custom)
}

pub fn read_config<R: Read>(source: R) -> Result<ButtonConfig, ConfigError> {
    let config: ButtonConfig = serde_json::from_reader(source)?;
    config.validate()?;
    Ok(config)
}

pub fn read_file(path: &Path) -> Result<ButtonConfig, ConfigError> {
    let f = File::open(path)?;
    read_config(BufReader::new(f))
}

#[test]
fn test_empty_config() {
    let conf = read_config("{}".as_bytes()).unwrap();
    assert_eq!(conf.device_address, 67);
    assert_eq!(conf.bank, 10);
    assert_eq!(conf.volume, 40);
    assert_eq!(conf.mode, None);
    assert_eq!(conf.warn_sound, Some(1));
    assert_eq!(conf.emergency_sound, Some(1));
    assert!(conf.mappings.is_empty());
    assert_eq!(conf.server, "127.0.0.1:8375");
    assert_eq!(conf.output, "-");
    assert_eq!(conf.startup_delay, Duration::from_secs(5));
    assert_eq!(conf.volume_delay, Duration::from_secs(1));
    assert!(!conf.silence_on_stop);
}

#[test]
fn test_full_config() {
    let doc = r#"
{
  "deviceAddress": 12,
  "bank": 3,
  "volume": 80,
  "mode": "DS",
  "warnSound": 2,
  "alertSound": 0,
  "alarmSound": 30,
  "emergencySound": null,
  "mappings": [
    {"notification": "notifications.mob", "sound": 5},
    {"notification": "notifications.anchor"}
  ],
  "server": "signalk.local:8375",
  "output": "/run/canboat/n2k.sock",
  "startupDelay": "10s",
  "volumeDelay": "0.5s",
  "silenceOnStop": true
}
"#;
    let conf = read_config(doc.as_bytes()).unwrap();
    assert_eq!(conf.device_address, 12);
    assert_eq!(conf.bank, 3);
    assert_eq!(conf.mode, Some(DeviceMode::DigitalSwitching));
    assert_eq!(conf.alarm_sound, Some(30));
    assert_eq!(conf.emergency_sound, None);
    assert_eq!(conf.mappings[1].sound, None);
    assert_eq!(conf.volume_delay, Duration::from_millis(500));
    assert!(conf.silence_on_stop);

    let mapping = conf.sound_mapping();
    assert_eq!(mapping.resolve_sound("x", &"warn".into()).id(), 2);
    assert!(mapping.resolve_sound("x", &"alert".into()).is_none());
    assert_eq!(mapping.resolve_sound("x", &"alarm".into()).id(), 1);
    assert_eq!(mapping.resolve_sound("x", &"emergency".into()).id(), 1);
    assert_eq!(
        mapping
            .resolve_sound("notifications.mob", &"warn".into())
            .id(),
        5
    );
    assert_eq!(
        mapping
            .resolve_sound("notifications.anchor", &"alert".into())
            .id(),
        1
    );
}

#[test]
fn test_non_integer_sounds() {
    let doc = r#"
{
  "warnSound": 2.5,
  "alertSound": "3",
  "alarmSound": 4,
  "emergencySound": [7],
  "mappings": [
    {"notification": "notifications.mob", "sound": 1e20},
    {"notification": "notifications.fire", "sound": {"id": 6}}
  ]
}
"#;
    let conf = read_config(doc.as_bytes()).unwrap();
    assert_eq!(conf.warn_sound, None);
    assert_eq!(conf.alert_sound, None);
    assert_eq!(conf.alarm_sound, Some(4));
    assert_eq!(conf.emergency_sound, None);
    assert_eq!(conf.mappings[0].sound, None);
    assert_eq!(conf.mappings[1].sound, None);

    let mapping = conf.sound_mapping();
    assert_eq!(mapping.resolve_sound("x", &"warn".into()).id(), 1);
    assert_eq!(mapping.resolve_sound("x", &"alert".into()).id(), 1);
    assert_eq!(mapping.resolve_sound("x", &"alarm".into()).id(), 4);
    assert_eq!(mapping.resolve_sound("x", &"emergency".into()).id(), 1);
    assert_eq!(
        mapping
            .resolve_sound("notifications.fire", &"alarm".into())
            .id(),
        1
    );
}

#[test]
fn test_config_errors() {
    assert!(matches!(
        read_config(r#"{"volume": 101}"#.as_bytes()),
        Err(ConfigError::InvalidValue { field: "volume", .. })
    ));
    assert!(matches!(
        read_config(r#"{"bank": 300}"#.as_bytes()),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        read_config(r#"{"volumme": 10}"#.as_bytes()),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        read_config(r#"{"mode": "DISCO"}"#.as_bytes()),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        read_config(r#"{"startupDelay": "5 parsecs"}"#.as_bytes()),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        read_config(r#"{"startupDelay": "1e300s"}"#.as_bytes()),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        read_config(r#"{"mappings": [{"notification": "", "sound": 2}]}"#.as_bytes()),
        Err(ConfigError::InvalidValue { field: "mappings", .. })
    ));
    assert!(matches!(
        read_file(Path::new("/nonexistent/alarm_button.json")),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
    assert_eq!(parse_duration(" 2m "), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1.5 h"), Ok(Duration::from_secs(5400)));
    assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("s").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration("-1s").is_err());
    assert!(parse_duration("1e300s").is_err());
    assert!(parse_duration("1e18h").is_err());
}
