use crate::notification::{NotificationSignal, NotificationState, Severity};
use crate::sound_policy::SoundMapping;
use chrono::{DateTime, Utc};
use log::debug;

/// A notification that currently asks for sound
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveCondition {
    pub state: NotificationState,
    pub message: Option<String>,
    /// Time of the update that last set this condition
    pub updated: DateTime<Utc>,
}

/// Active conditions keyed by notification path, kept in insertion order.
/// Overwriting a path keeps its position, removing and adding it again
/// moves it last.
#[derive(Debug, Default)]
pub struct ActiveSet {
    entries: Vec<(String, ActiveCondition)>,
}

impl ActiveSet {
    pub fn new() -> ActiveSet {
        ActiveSet {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ActiveCondition> {
        self.position(path).map(|i| &self.entries[i].1)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ActiveCondition)> {
        self.entries.iter().map(|(path, cond)| (path.as_str(), cond))
    }

    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|(path, _)| path.as_str()).collect()
    }

    fn position(&self, path: &str) -> Option<usize> {
        self.entries.iter().position(|(p, _)| p == path)
    }

    fn insert(&mut self, path: &str, condition: ActiveCondition) {
        match self.position(path) {
            Some(index) => self.entries[index].1 = condition,
            None => self.entries.push((path.to_string(), condition)),
        }
    }

    fn remove(&mut self, path: &str) -> bool {
        match self.position(path) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Update the set from the latest value of a notification path.
    /// Returns true if the set changed. Storing a condition always counts as
    /// a change, even if the content is the same.
    pub fn apply(
        &mut self,
        path: &str,
        signal: NotificationSignal,
        updated: DateTime<Utc>,
        mapping: &SoundMapping,
    ) -> bool {
        match signal {
            NotificationSignal::Audible { state, message } if state.is_active() => {
                let sound = mapping.resolve_sound(path, &state);
                if sound.is_none() {
                    let removed = self.remove(path);
                    if removed {
                        debug!("removed {} (no sound for {})", path, state);
                    }
                    removed
                } else {
                    debug!("adding {} ({}, sound {})", path, state, sound);
                    self.insert(
                        path,
                        ActiveCondition {
                            state,
                            message,
                            updated,
                        },
                    );
                    true
                }
            }
            _ => {
                let removed = self.remove(path);
                if removed {
                    debug!("removed {}", path);
                }
                removed
            }
        }
    }
}

/// Pick the condition with the highest severity. Unranked states lose to
/// every ranked one. On a tie the condition that was inserted first wins.
pub fn pick_winner<'a>(
    active: &'a ActiveSet,
    order: &[Severity],
) -> Option<(&'a str, &'a ActiveCondition)> {
    let mut winner: Option<(Option<usize>, &str, &ActiveCondition)> = None;
    for (path, condition) in active.iter() {
        let rank = condition
            .state
            .severity()
            .and_then(|s| order.iter().position(|o| *o == s));
        match winner {
            Some((best, _, _)) if rank <= best => {}
            _ => winner = Some((rank, path, condition)),
        }
    }
    winner.map(|(_, path, condition)| (path, condition))
}

#[cfg(test)]
use crate::notification::SEVERITY_ORDER;
#[cfg(test)]
use serde_json::json;

#[cfg(test)]
fn audible(state: &str) -> NotificationSignal {
    NotificationSignal::from(&json!({"state": state, "method": ["visual", "sound"]}))
}

#[cfg(test)]
fn apply(set: &mut ActiveSet, mapping: &SoundMapping, path: &str, state: &str) -> bool {
    set.apply(path, audible(state), Utc::now(), mapping)
}

#[cfg(test)]
fn winner_path<'a>(set: &'a ActiveSet) -> Option<&'a str> {
    pick_winner(set, &SEVERITY_ORDER).map(|(path, _)| path)
}

#[test]
fn test_apply_add_and_remove() {
    let mapping = SoundMapping::new([Some(1); 4], Vec::new());
    let mut set = ActiveSet::new();
    assert!(apply(&mut set, &mapping, "a", "warn"));
    assert!(set.contains("a"));
    // Overwrite with the same content still counts
    assert!(apply(&mut set, &mapping, "a", "warn"));
    assert_eq!(set.len(), 1);
    assert!(apply(&mut set, &mapping, "a", "alarm"));
    assert_eq!(
        set.get("a").map(|c| c.state.clone()),
        Some(NotificationState::from("alarm"))
    );
    assert!(apply(&mut set, &mapping, "a", "normal"));
    assert!(set.is_empty());
    // Removing something absent is not a change
    assert!(!apply(&mut set, &mapping, "a", "nominal"));
    assert!(!set.apply("b", NotificationSignal::Malformed, Utc::now(), &mapping));
}

#[test]
fn test_apply_not_audible_removes() {
    let mapping = SoundMapping::new([Some(1); 4], Vec::new());
    let mut set = ActiveSet::new();
    apply(&mut set, &mapping, "a", "alert");
    apply(&mut set, &mapping, "b", "alert");
    let muted = NotificationSignal::from(&json!({"state": "alert", "method": ["visual"]}));
    assert!(set.apply("a", muted, Utc::now(), &mapping));
    assert!(set.apply("b", NotificationSignal::Malformed, Utc::now(), &mapping));
    assert!(set.is_empty());
}

#[test]
fn test_apply_silent_sound() {
    let mapping = SoundMapping::new([Some(0), Some(2), Some(3), Some(4)], Vec::new());
    let mut set = ActiveSet::new();
    assert!(!apply(&mut set, &mapping, "a", "warn"));
    assert!(set.is_empty());
    assert!(apply(&mut set, &mapping, "a", "alert"));
    // Dropping to a state without sound removes the path
    assert!(apply(&mut set, &mapping, "a", "warn"));
    assert!(set.is_empty());
}

#[test]
fn test_apply_keeps_message() {
    let mapping = SoundMapping::default();
    let mut set = ActiveSet::new();
    let signal = NotificationSignal::from(
        &json!({"state": "alarm", "method": ["sound"], "message": "High water"}),
    );
    set.apply("notifications.bilge", signal, Utc::now(), &mapping);
    assert_eq!(
        set.get("notifications.bilge").and_then(|c| c.message.as_deref()),
        Some("High water")
    );
}

#[test]
fn test_pick_highest_severity() {
    let mapping = SoundMapping::default();
    let mut set = ActiveSet::new();
    assert_eq!(winner_path(&set), None);
    apply(&mut set, &mapping, "a", "warn");
    assert_eq!(winner_path(&set), Some("a"));
    apply(&mut set, &mapping, "b", "alarm");
    apply(&mut set, &mapping, "c", "alert");
    assert_eq!(winner_path(&set), Some("b"));
    apply(&mut set, &mapping, "d", "emergency");
    assert_eq!(winner_path(&set), Some("d"));
    apply(&mut set, &mapping, "d", "normal");
    assert_eq!(winner_path(&set), Some("b"));
}

#[test]
fn test_pick_tie_first_inserted() {
    let mapping = SoundMapping::default();
    let mut set = ActiveSet::new();
    apply(&mut set, &mapping, "a", "alert");
    apply(&mut set, &mapping, "b", "alert");
    apply(&mut set, &mapping, "c", "alert");
    assert_eq!(winner_path(&set), Some("a"));
    assert_eq!(winner_path(&set), Some("a"));
    // Overwriting keeps the position
    apply(&mut set, &mapping, "a", "alert");
    assert_eq!(winner_path(&set), Some("a"));
    // Re-adding moves it last
    apply(&mut set, &mapping, "a", "normal");
    apply(&mut set, &mapping, "a", "alert");
    assert_eq!(set.paths(), vec!["b", "c", "a"]);
    assert_eq!(winner_path(&set), Some("b"));
}

#[test]
fn test_pick_unranked() {
    let mapping = SoundMapping::default();
    let mut set = ActiveSet::new();
    apply(&mut set, &mapping, "x", "strange");
    apply(&mut set, &mapping, "y", "odd");
    assert_eq!(winner_path(&set), Some("x"));
    apply(&mut set, &mapping, "a", "warn");
    assert_eq!(winner_path(&set), Some("a"));
}

#[test]
fn test_pick_custom_order() {
    let mapping = SoundMapping::default();
    let mut set = ActiveSet::new();
    apply(&mut set, &mapping, "a", "alarm");
    apply(&mut set, &mapping, "b", "warn");
    let reversed = [
        Severity::Emergency,
        Severity::Alarm,
        Severity::Alert,
        Severity::Warn,
    ];
    assert_eq!(pick_winner(&set, &reversed).map(|(p, _)| p), Some("b"));
}
