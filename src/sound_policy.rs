use crate::notification::{NotificationState, Severity};
use std::fmt::{self, Display, Formatter};

/// Number of switch positions, and sounds, on the alarm button
pub const SOUND_COUNT: u8 = 28;

/// A sound number on the device. 0 means no sound.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct Sound(u8);

impl Sound {
    pub const NONE: Sound = Sound(0);
    pub const FALLBACK: Sound = Sound(1);

    /// Validate a configured sound number. Missing or out of range values
    /// give the fallback sound.
    pub fn from_config(value: Option<i64>) -> Sound {
        match value {
            Some(0) => Sound::NONE,
            Some(n) if (1..=i64::from(SOUND_COUNT)).contains(&n) => Sound(n as u8),
            _ => Sound::FALLBACK,
        }
    }

    pub fn id(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self == Sound::NONE
    }
}

impl Display for Sound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sound for a specific notification path
#[derive(Debug, Clone, PartialEq)]
pub struct SoundOverride {
    pub notification: String,
    pub sound: Option<i64>,
}

/// Maps notifications to sounds. Overrides are searched in order and the
/// first matching path wins, otherwise the default for the state is used.
#[derive(Debug, Clone, Default)]
pub struct SoundMapping {
    overrides: Vec<SoundOverride>,
    defaults: [Option<i64>; 4],
}

impl SoundMapping {
    /// `defaults` is indexed by `Severity::index`
    pub fn new(defaults: [Option<i64>; 4], overrides: Vec<SoundOverride>) -> SoundMapping {
        SoundMapping {
            overrides,
            defaults,
        }
    }

    pub fn default_for(&self, severity: Severity) -> Option<i64> {
        self.defaults[severity.index()]
    }

    pub fn resolve_sound(&self, path: &str, state: &NotificationState) -> Sound {
        let configured = match self.overrides.iter().find(|o| o.notification == path) {
            Some(o) => o.sound,
            None => state.severity().and_then(|s| self.default_for(s)),
        };
        Sound::from_config(configured)
    }
}

#[cfg(test)]
fn test_mapping() -> SoundMapping {
    SoundMapping::new(
        [Some(2), Some(3), Some(4), Some(6)],
        vec![
            SoundOverride {
                notification: "notifications.mob".to_string(),
                sound: Some(5),
            },
            SoundOverride {
                notification: "notifications.mob".to_string(),
                sound: Some(9),
            },
            SoundOverride {
                notification: "notifications.anchor".to_string(),
                sound: Some(0),
            },
            SoundOverride {
                notification: "notifications.depth".to_string(),
                sound: None,
            },
        ],
    )
}

#[test]
fn test_sound_from_config() {
    assert_eq!(Sound::from_config(Some(0)), Sound::NONE);
    assert_eq!(Sound::from_config(Some(1)).id(), 1);
    assert_eq!(Sound::from_config(Some(28)).id(), 28);
    assert_eq!(Sound::from_config(Some(29)), Sound::FALLBACK);
    assert_eq!(Sound::from_config(Some(30)), Sound::FALLBACK);
    assert_eq!(Sound::from_config(Some(-4)), Sound::FALLBACK);
    assert_eq!(Sound::from_config(None), Sound::FALLBACK);
}

#[test]
fn test_defaults_by_state() {
    let mapping = test_mapping();
    let path = "notifications.engine.overTemperature";
    assert_eq!(mapping.resolve_sound(path, &"warn".into()).id(), 2);
    assert_eq!(mapping.resolve_sound(path, &"alert".into()).id(), 3);
    assert_eq!(mapping.resolve_sound(path, &"alarm".into()).id(), 4);
    assert_eq!(mapping.resolve_sound(path, &"emergency".into()).id(), 6);
    // No default for unranked states
    assert_eq!(mapping.resolve_sound(path, &"bogus".into()), Sound::FALLBACK);
}

#[test]
fn test_override_wins_for_any_state() {
    let mapping = test_mapping();
    for state in ["warn", "alert", "alarm", "emergency", "bogus"] {
        assert_eq!(
            mapping
                .resolve_sound("notifications.mob", &state.into())
                .id(),
            5
        );
        assert!(mapping
            .resolve_sound("notifications.anchor", &state.into())
            .is_none());
        assert_eq!(
            mapping.resolve_sound("notifications.depth", &state.into()),
            Sound::FALLBACK
        );
    }
}

#[test]
fn test_invalid_default() {
    let mapping = SoundMapping::new([Some(30), None, Some(0), Some(28)], Vec::new());
    assert_eq!(mapping.resolve_sound("a", &"warn".into()), Sound::FALLBACK);
    assert_eq!(mapping.resolve_sound("a", &"alert".into()), Sound::FALLBACK);
    assert_eq!(mapping.resolve_sound("a", &"alarm".into()), Sound::NONE);
    assert_eq!(mapping.resolve_sound("a", &"emergency".into()).id(), 28);
}
