use super::delta::{Delta, PathSubscription, SubscribeRequest, UnsubscribeRequest};

/// Selects the paths delivered to the controller
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionFilter {
    pub context: String,
    pub paths: Vec<String>,
    pub policy: String,
}

impl Default for SubscriptionFilter {
    fn default() -> SubscriptionFilter {
        SubscriptionFilter {
            context: "vessels.self".to_string(),
            paths: vec!["notifications.*".to_string()],
            policy: "instant".to_string(),
        }
    }
}

// A '*' segment matches exactly one segment, except as the last segment
// where it matches the rest of the path.
fn path_matches(pattern: &str, path: &str) -> bool {
    let mut pattern_segs = pattern.split('.').peekable();
    let mut path_segs = path.split('.');
    while let Some(p) = pattern_segs.next() {
        let last = pattern_segs.peek().is_none();
        match path_segs.next() {
            None => return false,
            Some(_) if p == "*" && last => return true,
            Some(s) if p == "*" || p == s => {}
            Some(_) => return false,
        }
    }
    path_segs.next().is_none()
}

impl SubscriptionFilter {
    pub fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|p| path_matches(p, path))
    }

    pub fn subscribe_request(&self) -> SubscribeRequest {
        SubscribeRequest {
            context: self.context.clone(),
            subscribe: self
                .paths
                .iter()
                .map(|path| PathSubscription {
                    path: path.clone(),
                    policy: Some(self.policy.clone()),
                })
                .collect(),
        }
    }

    pub fn unsubscribe_request(&self) -> UnsubscribeRequest {
        UnsubscribeRequest {
            context: self.context.clone(),
            unsubscribe: self
                .paths
                .iter()
                .map(|path| PathSubscription {
                    path: path.clone(),
                    policy: None,
                })
                .collect(),
        }
    }
}

/// Handle for an active subscription. Give it back to the connection to
/// unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    filter: SubscriptionFilter,
}

impl Subscription {
    pub(crate) fn new(filter: SubscriptionFilter) -> Subscription {
        Subscription { filter }
    }

    pub fn filter(&self) -> &SubscriptionFilter {
        &self.filter
    }

    /// Drop values outside the subscription. Returns None if nothing is
    /// left.
    pub fn filter_delta(&self, mut delta: Delta) -> Option<Delta> {
        for update in &mut delta.updates {
            update.values.retain(|v| self.filter.matches(&v.path));
        }
        delta.updates.retain(|u| !u.values.is_empty());
        if delta.updates.is_empty() {
            None
        } else {
            Some(delta)
        }
    }
}

#[cfg(test)]
use super::delta::{PathValue, Update};

#[test]
fn test_path_matches() {
    assert!(path_matches("notifications.*", "notifications.mob"));
    assert!(path_matches(
        "notifications.*",
        "notifications.engine.overTemperature"
    ));
    assert!(!path_matches("notifications.*", "notifications"));
    assert!(!path_matches("notifications.*", "navigation.speedOverGround"));
    assert!(path_matches("*", "navigation.speedOverGround"));
    assert!(path_matches(
        "propulsion.*.oilTemperature",
        "propulsion.port.oilTemperature"
    ));
    assert!(!path_matches(
        "propulsion.*.oilTemperature",
        "propulsion.port.coolantTemperature"
    ));
    assert!(path_matches("notifications.mob", "notifications.mob"));
    assert!(!path_matches("notifications.mob", "notifications.mob.extra"));
    assert!(!path_matches("notifications.mob.extra", "notifications.mob"));
}

#[test]
fn test_filter_delta() {
    let subscription = Subscription::new(SubscriptionFilter::default());
    let value = |path: &str| PathValue {
        path: path.to_string(),
        value: serde_json::Value::Null,
    };
    let delta = Delta {
        context: None,
        updates: vec![
            Update {
                source: None,
                timestamp: None,
                values: vec![value("navigation.position"), value("notifications.mob")],
            },
            Update {
                source: None,
                timestamp: None,
                values: vec![value("environment.depth.belowKeel")],
            },
        ],
    };
    let filtered = subscription.filter_delta(delta).unwrap();
    assert_eq!(filtered.updates.len(), 1);
    assert_eq!(filtered.updates[0].values, vec![value("notifications.mob")]);

    let delta = Delta {
        context: None,
        updates: vec![Update {
            source: None,
            timestamp: None,
            values: vec![value("navigation.position")],
        }],
    };
    assert_eq!(subscription.filter_delta(delta), None);
}
