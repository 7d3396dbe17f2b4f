use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// States that may drive the alarm, lowest severity first.
#[derive(PartialEq, Eq, Debug, Clone, Copy, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Severity {
    Warn = 0,
    Alert = 1,
    Alarm = 2,
    Emergency = 3,
}

use Severity::*;

/// Priority order used when picking the condition that drives the device.
/// Later entries win.
pub const SEVERITY_ORDER: [Severity; 4] = [Warn, Alert, Alarm, Emergency];

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Warn => "warn",
            Alert => "alert",
            Alarm => "alarm",
            Emergency => "emergency",
        }
    }

    /// Index into per-severity tables
    pub fn index(self) -> usize {
        usize::from(u8::from(self))
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum NotificationState {
    Normal,
    Nominal,
    Raised(Severity),
    /// Any state string outside the known set. Counts as active but has no
    /// rank.
    Unranked(String),
}

const NORMAL: &str = "normal";
const NOMINAL: &str = "nominal";

impl NotificationState {
    pub fn is_active(&self) -> bool {
        !matches!(self, NotificationState::Normal | NotificationState::Nominal)
    }

    pub fn severity(&self) -> Option<Severity> {
        match self {
            NotificationState::Raised(severity) => Some(*severity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationState::Normal => NORMAL,
            NotificationState::Nominal => NOMINAL,
            NotificationState::Raised(severity) => severity.as_str(),
            NotificationState::Unranked(name) => name,
        }
    }
}

// State names are matched exactly, the way the server sends them.
impl From<&str> for NotificationState {
    fn from(s: &str) -> Self {
        match s {
            NORMAL => NotificationState::Normal,
            NOMINAL => NotificationState::Nominal,
            "warn" => NotificationState::Raised(Warn),
            "alert" => NotificationState::Raised(Alert),
            "alarm" => NotificationState::Raised(Alarm),
            "emergency" => NotificationState::Raised(Emergency),
            other => NotificationState::Unranked(other.to_string()),
        }
    }
}

impl Display for NotificationState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method name that requests an audible signal
pub const SOUND_METHOD: &str = "sound";

/// Typed view of the value carried by a notification path.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationSignal {
    /// The method list includes sound
    Audible {
        state: NotificationState,
        message: Option<String>,
    },
    /// Well formed, but sound is not requested
    Muted { state: NotificationState },
    /// Null value, or state or method missing or of the wrong type
    Malformed,
}

impl NotificationSignal {
    /// The state if the notification asks for sound and is not normal
    pub fn audible_state(&self) -> Option<&NotificationState> {
        match self {
            NotificationSignal::Audible { state, .. } if state.is_active() => Some(state),
            _ => None,
        }
    }
}

impl From<&Value> for NotificationSignal {
    fn from(value: &Value) -> Self {
        let fields = match value {
            Value::Object(fields) => fields,
            _ => return NotificationSignal::Malformed,
        };
        let state = match fields.get("state") {
            Some(Value::String(state)) => NotificationState::from(state.as_str()),
            _ => return NotificationSignal::Malformed,
        };
        let audible = match fields.get("method") {
            Some(Value::Array(methods)) => methods
                .iter()
                .any(|m| m.as_str() == Some(SOUND_METHOD)),
            _ => return NotificationSignal::Malformed,
        };
        if audible {
            let message = fields
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            NotificationSignal::Audible { state, message }
        } else {
            NotificationSignal::Muted { state }
        }
    }
}

#[cfg(test)]
use serde_json::json;

#[test]
fn test_state_names() {
    assert_eq!(NotificationState::from("normal"), NotificationState::Normal);
    assert_eq!(NotificationState::from("nominal"), NotificationState::Nominal);
    assert_eq!(
        NotificationState::from("emergency"),
        NotificationState::Raised(Emergency)
    );
    assert_eq!(
        NotificationState::from("Alarm"),
        NotificationState::Unranked("Alarm".to_string())
    );
    assert!(!NotificationState::Normal.is_active());
    assert!(!NotificationState::Nominal.is_active());
    assert!(NotificationState::from("alert").is_active());
    assert!(NotificationState::from("whatever").is_active());
    assert_eq!(NotificationState::from("whatever").severity(), None);
    assert_eq!(NotificationState::from("warn").to_string(), "warn");
}

#[test]
fn test_severity_index() {
    for (i, severity) in SEVERITY_ORDER.iter().enumerate() {
        assert_eq!(severity.index(), i);
        assert_eq!(Severity::try_from(i as u8).ok(), Some(*severity));
    }
}

#[test]
fn test_signal_from_value() {
    let value = json!({"state": "alarm", "method": ["visual", "sound"], "message": "Bilge"});
    assert_eq!(
        NotificationSignal::from(&value),
        NotificationSignal::Audible {
            state: NotificationState::Raised(Alarm),
            message: Some("Bilge".to_string())
        }
    );
    let value = json!({"state": "alarm", "method": ["visual"]});
    assert_eq!(
        NotificationSignal::from(&value),
        NotificationSignal::Muted {
            state: NotificationState::Raised(Alarm)
        }
    );
    assert_eq!(
        NotificationSignal::from(&json!({"state": "alarm"})),
        NotificationSignal::Malformed
    );
    assert_eq!(
        NotificationSignal::from(&json!({"method": ["sound"]})),
        NotificationSignal::Malformed
    );
    assert_eq!(
        NotificationSignal::from(&json!({"state": 3, "method": ["sound"]})),
        NotificationSignal::Malformed
    );
    assert_eq!(
        NotificationSignal::from(&json!({"state": "alarm", "method": "sound"})),
        NotificationSignal::Malformed
    );
    assert_eq!(NotificationSignal::from(&Value::Null), NotificationSignal::Malformed);
    assert_eq!(NotificationSignal::from(&json!(12.5)), NotificationSignal::Malformed);
}

#[test]
fn test_audible_state() {
    let raised = NotificationSignal::from(&json!({"state": "warn", "method": ["sound"]}));
    assert_eq!(
        raised.audible_state(),
        Some(&NotificationState::Raised(Warn))
    );
    let normal = NotificationSignal::from(&json!({"state": "normal", "method": ["sound"]}));
    assert_eq!(normal.audible_state(), None);
    let muted = NotificationSignal::from(&json!({"state": "warn", "method": []}));
    assert_eq!(muted.audible_state(), None);
}
