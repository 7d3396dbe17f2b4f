use crate::active_set::{pick_winner, ActiveSet};
use crate::device::{CommandSink, DeviceCommand};
use crate::notification::{NotificationSignal, NotificationState, SEVERITY_ORDER};
use crate::read_config::ButtonConfig;
use crate::signalk::Delta;
use crate::sound_policy::{Sound, SoundMapping};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;

/// The condition currently driving the device
#[derive(Debug, Clone, PartialEq)]
pub struct Playing {
    pub path: String,
    pub state: NotificationState,
}

/// Keeps track of active notifications and switches the sound of the
/// alarm button to the most severe one.
pub struct Controller<S: CommandSink> {
    device_address: u8,
    bank: u8,
    silence_on_stop: bool,
    mapping: SoundMapping,
    active: ActiveSet,
    playing: Option<Playing>,
    sink: S,
}

impl<S: CommandSink> Controller<S> {
    pub fn new(config: &ButtonConfig, sink: S) -> Controller<S> {
        Controller {
            device_address: config.device_address,
            bank: config.bank,
            silence_on_stop: config.silence_on_stop,
            mapping: config.sound_mapping(),
            active: ActiveSet::new(),
            playing: None,
            sink,
        }
    }

    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    pub fn playing(&self) -> Option<&Playing> {
        self.playing.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Apply one notification value. Returns true if the active set changed.
    pub fn apply_value(&mut self, path: &str, value: &Value, updated: DateTime<Utc>) -> bool {
        let signal = NotificationSignal::from(value);
        self.active.apply(path, signal, updated, &self.mapping)
    }

    /// Handle a batch of updates, re-evaluating once if anything changed
    pub fn on_delta(&mut self, delta: &Delta) {
        let mut changed = false;
        for update in &delta.updates {
            let updated = update.time();
            for value in &update.values {
                changed |= self.apply_value(&value.path, &value.value, updated);
            }
        }
        if changed {
            self.reevaluate();
        }
    }

    fn emit(&mut self, command: DeviceCommand) {
        self.sink.emit(command);
    }

    /// Select the sound that should be playing and send a command if it
    /// differs from the current one. An empty active set always sends
    /// silence.
    pub fn reevaluate(&mut self) {
        let winner = pick_winner(&self.active, &SEVERITY_ORDER)
            .map(|(path, condition)| (path.to_string(), condition.state.clone()));
        let (path, state) = match winner {
            Some(winner) => winner,
            None => {
                debug!("Stopping sound");
                self.emit(DeviceCommand::silence_all(self.device_address, self.bank));
                self.playing = None;
                return;
            }
        };
        let sound = self.mapping.resolve_sound(&path, &state);
        let playing_sound: Option<Sound> = self
            .playing
            .as_ref()
            .map(|p| self.mapping.resolve_sound(&p.path, &p.state));
        if playing_sound != Some(sound) {
            debug!("Playing sound {} for {} ({})", sound, path, state);
            self.emit(DeviceCommand::play(self.device_address, self.bank, sound));
            self.playing = Some(Playing { path, state });
        }
    }

    /// Tear down the controller. Optionally silences the device first.
    pub fn stop(mut self) -> S {
        if self.silence_on_stop {
            info!("Silencing alarm on stop");
            self.emit(DeviceCommand::silence_all(self.device_address, self.bank));
        }
        self.sink
    }
}

#[cfg(test)]
use crate::read_config::MappingConfig;
#[cfg(test)]
use crate::signalk::{PathValue, Update};
#[cfg(test)]
use serde_json::json;

#[cfg(test)]
fn notification(path: &str, state: &str) -> PathValue {
    PathValue {
        path: path.to_string(),
        value: json!({"state": state, "method": ["visual", "sound"], "message": path}),
    }
}

#[cfg(test)]
fn delta(values: Vec<PathValue>) -> Delta {
    Delta {
        context: Some("vessels.self".to_string()),
        updates: vec![Update {
            source: Some("test".to_string()),
            timestamp: Some("2024-06-01T12:00:00.000Z".to_string()),
            values,
        }],
    }
}

#[cfg(test)]
fn sounds(warn: i64, alert: i64, alarm: i64, emergency: i64) -> ButtonConfig {
    ButtonConfig {
        warn_sound: Some(warn),
        alert_sound: Some(alert),
        alarm_sound: Some(alarm),
        emergency_sound: Some(emergency),
        ..ButtonConfig::default()
    }
}

#[cfg(test)]
fn play(sound: i64) -> DeviceCommand {
    DeviceCommand::play(67, 10, Sound::from_config(Some(sound)))
}

#[cfg(test)]
fn silence() -> DeviceCommand {
    DeviceCommand::silence_all(67, 10)
}

#[test]
fn test_scenario_sequence() {
    let mut ctrl = Controller::new(&sounds(2, 3, 4, 5), Vec::new());

    // Scenario 1
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert_eq!(ctrl.active().paths(), vec!["a"]);
    assert_eq!(ctrl.sink(), &vec![play(2)]);

    // Scenario 2
    ctrl.on_delta(&delta(vec![notification("b", "alarm")]));
    assert_eq!(ctrl.active().paths(), vec!["a", "b"]);
    assert_eq!(ctrl.sink(), &vec![play(2), play(4)]);
    assert_eq!(ctrl.playing().map(|p| p.path.as_str()), Some("b"));

    // Scenario 3
    ctrl.on_delta(&delta(vec![notification("b", "normal")]));
    assert_eq!(ctrl.active().paths(), vec!["a"]);
    assert_eq!(ctrl.sink(), &vec![play(2), play(4), play(2)]);

    // Scenario 4
    ctrl.on_delta(&delta(vec![notification("a", "normal")]));
    assert!(ctrl.active().is_empty());
    assert_eq!(ctrl.sink(), &vec![play(2), play(4), play(2), silence()]);
    assert_eq!(ctrl.playing(), None);
}

#[test]
fn test_same_sound_not_repeated() {
    // Every severity uses sound 1
    let mut ctrl = Controller::new(&ButtonConfig::default(), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    ctrl.on_delta(&delta(vec![notification("b", "alarm")]));
    ctrl.on_delta(&delta(vec![notification("b", "normal")]));
    assert_eq!(ctrl.sink(), &vec![play(1)]);
    // The winner changed but the sound didn't, so the old record stays
    assert_eq!(ctrl.playing().map(|p| p.path.as_str()), Some("a"));
    ctrl.on_delta(&delta(vec![notification("a", "nominal")]));
    assert_eq!(ctrl.sink(), &vec![play(1), silence()]);
}

#[test]
fn test_override_sound() {
    let config = ButtonConfig {
        mappings: vec![MappingConfig {
            notification: "a".to_string(),
            sound: Some(5),
        }],
        ..sounds(2, 3, 4, 6)
    };
    let mut ctrl = Controller::new(&config, Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert_eq!(ctrl.sink(), &vec![play(5)]);
}

#[test]
fn test_invalid_default_sound() {
    let mut ctrl = Controller::new(&sounds(30, 3, 4, 6), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert_eq!(ctrl.sink(), &vec![play(1)]);
}

#[test]
fn test_reevaluate_idempotent() {
    let mut ctrl = Controller::new(&sounds(2, 3, 4, 5), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "alert")]));
    ctrl.reevaluate();
    ctrl.reevaluate();
    assert_eq!(ctrl.sink(), &vec![play(3)]);
    // Repeating the same update changes the set but not the sound
    ctrl.on_delta(&delta(vec![notification("a", "alert")]));
    assert_eq!(ctrl.sink(), &vec![play(3)]);
}

#[test]
fn test_empty_reevaluate_repeats_silence() {
    let mut ctrl = Controller::new(&ButtonConfig::default(), Vec::new());
    ctrl.reevaluate();
    ctrl.reevaluate();
    assert_eq!(ctrl.sink(), &vec![silence(), silence()]);
}

#[test]
fn test_unchanged_batch_sends_nothing() {
    let mut ctrl = Controller::new(&ButtonConfig::default(), Vec::new());
    ctrl.on_delta(&delta(vec![
        notification("a", "normal"),
        PathValue {
            path: "b".to_string(),
            value: Value::Null,
        },
    ]));
    assert!(ctrl.sink().is_empty());
}

#[test]
fn test_batch_reevaluates_once() {
    let mut ctrl = Controller::new(&sounds(2, 3, 4, 5), Vec::new());
    ctrl.on_delta(&delta(vec![
        notification("a", "warn"),
        notification("b", "emergency"),
        notification("c", "alert"),
    ]));
    assert_eq!(ctrl.sink(), &vec![play(5)]);
    assert_eq!(
        ctrl.playing(),
        Some(&Playing {
            path: "b".to_string(),
            state: NotificationState::from("emergency")
        })
    );
}

#[test]
fn test_silent_sound_never_active() {
    let mut ctrl = Controller::new(&sounds(0, 3, 4, 5), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert!(ctrl.active().is_empty());
    assert!(ctrl.sink().is_empty());

    // Dropping from alert to a silent warn removes the path
    ctrl.on_delta(&delta(vec![notification("a", "alert")]));
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert!(ctrl.active().is_empty());
    assert_eq!(ctrl.sink(), &vec![play(3), silence()]);
}

#[test]
fn test_malformed_removes() {
    let mut ctrl = Controller::new(&sounds(2, 3, 4, 5), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "alarm")]));
    ctrl.on_delta(&delta(vec![PathValue {
        path: "a".to_string(),
        value: json!({"state": "alarm"}),
    }]));
    assert!(ctrl.active().is_empty());
    ctrl.on_delta(&delta(vec![notification("a", "alarm")]));
    ctrl.on_delta(&delta(vec![PathValue {
        path: "a".to_string(),
        value: json!({"state": "alarm", "method": ["visual"]}),
    }]));
    assert_eq!(ctrl.sink(), &vec![play(4), silence(), play(4), silence()]);
}

#[test]
fn test_tie_keeps_first() {
    let config = ButtonConfig {
        mappings: vec![MappingConfig {
            notification: "b".to_string(),
            sound: Some(7),
        }],
        ..sounds(2, 3, 4, 5)
    };
    let mut ctrl = Controller::new(&config, Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "alarm")]));
    ctrl.on_delta(&delta(vec![notification("b", "alarm")]));
    assert_eq!(ctrl.sink(), &vec![play(4)]);
    ctrl.on_delta(&delta(vec![notification("a", "normal")]));
    assert_eq!(ctrl.sink(), &vec![play(4), play(7)]);
}

#[test]
fn test_never_keeps_normal_paths() {
    let mut ctrl = Controller::new(&sounds(2, 3, 0, 5), Vec::new());
    let steps = [
        ("a", "warn"),
        ("b", "alarm"),
        ("c", "emergency"),
        ("a", "normal"),
        ("b", "alert"),
        ("c", "nominal"),
        ("d", "odd"),
        ("b", "alarm"),
        ("a", "alert"),
        ("d", "normal"),
    ];
    let mut latest = std::collections::HashMap::new();
    for (path, state) in steps {
        ctrl.on_delta(&delta(vec![notification(path, state)]));
        latest.insert(path, state);
        for (active_path, condition) in ctrl.active().iter() {
            assert!(condition.state.is_active());
            assert_eq!(latest.get(active_path).copied(), Some(condition.state.as_str()));
        }
        let playing = ctrl.playing().map(|p| p.path.clone());
        match pick_winner(ctrl.active(), &SEVERITY_ORDER) {
            Some((path, _)) => assert!(playing.is_some(), "nothing playing, {} active", path),
            None => assert_eq!(playing, None),
        }
    }
    assert_eq!(ctrl.active().paths(), vec!["a"]);
}

#[test]
fn test_stop() {
    let mut ctrl = Controller::new(&ButtonConfig::default(), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert_eq!(ctrl.stop(), vec![play(1)]);

    let config = ButtonConfig {
        silence_on_stop: true,
        ..ButtonConfig::default()
    };
    let mut ctrl = Controller::new(&config, Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    assert_eq!(ctrl.stop(), vec![play(1), silence()]);
}

#[test]
fn test_condition_timestamp() {
    let mut ctrl = Controller::new(&ButtonConfig::default(), Vec::new());
    ctrl.on_delta(&delta(vec![notification("a", "warn")]));
    let condition = ctrl.active().get("a").unwrap();
    assert_eq!(condition.updated.to_rfc3339(), "2024-06-01T12:00:00+00:00");
    assert_eq!(condition.message.as_deref(), Some("a"));
}
