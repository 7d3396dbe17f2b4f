use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathValue {
    pub path: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Update {
    #[serde(rename = "$source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub values: Vec<PathValue>,
}

impl Update {
    /// Time stamp of the update, or now if missing or unparsable
    pub fn time(&self) -> DateTime<Utc> {
        self.timestamp
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub updates: Vec<Update>,
}

/// First message sent by the server on a new connection
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Hello {
    #[serde(default)]
    pub name: Option<String>,
    pub version: String,
    #[serde(rename = "self", default)]
    pub self_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Delta(Delta),
    Hello(Hello),
    Other(Value),
}

/// True for a message carrying updates that could not be read as a delta
pub fn is_malformed_delta(msg: &Value) -> bool {
    msg.get("updates").is_some()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PathSubscription {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    pub context: String,
    pub subscribe: Vec<PathSubscription>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UnsubscribeRequest {
    pub context: String,
    pub unsubscribe: Vec<PathSubscription>,
}

#[cfg(test)]
use chrono::TimeZone;

#[test]
fn test_parse_delta() {
    let line = r#"{"context":"vessels.urn:mrn:imo:mmsi:230099999","updates":[{"source":{"label":"derived"},"$source":"derived-data","timestamp":"2024-06-01T12:00:00.000Z","values":[{"path":"notifications.mob","value":{"state":"emergency","method":["visual","sound"],"message":"MOB"}},{"path":"notifications.anchor","value":null}]}]}"#;
    let msg: ServerMessage = serde_json::from_str(line).unwrap();
    let delta = match msg {
        ServerMessage::Delta(delta) => delta,
        m => panic!("Unexpected message {:?}", m),
    };
    assert_eq!(delta.updates.len(), 1);
    let update = &delta.updates[0];
    assert_eq!(update.source.as_deref(), Some("derived-data"));
    assert_eq!(update.values[0].path, "notifications.mob");
    assert_eq!(update.values[0].value["state"], "emergency");
    assert_eq!(update.values[1].value, Value::Null);
    assert_eq!(
        update.time(),
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    );
}

#[test]
fn test_parse_hello() {
    let line = r#"{"name":"signalk-server","version":"2.8.0","self":"vessels.urn:mrn:signalk:uuid:1","roles":["master","main"],"timestamp":"2024-06-01T12:00:00.000Z"}"#;
    let msg: ServerMessage = serde_json::from_str(line).unwrap();
    assert!(matches!(msg, ServerMessage::Hello(Hello { ref version, .. }) if version == "2.8.0"));
    let msg: ServerMessage = serde_json::from_str(r#"{"requestId":"1","state":"COMPLETED"}"#).unwrap();
    assert!(matches!(msg, ServerMessage::Other(_)));
}

#[test]
fn test_bad_path_drops_delta() {
    let line = r#"{"updates":[{"values":[{"path":"notifications.mob","value":{"state":"emergency","method":["sound"]}},{"path":7,"value":null}]}]}"#;
    let msg: ServerMessage = serde_json::from_str(line).unwrap();
    match msg {
        ServerMessage::Other(ref value) => assert!(is_malformed_delta(value)),
        m => panic!("Unexpected message {:?}", m),
    }
    assert!(!is_malformed_delta(
        &serde_json::json!({"requestId":"1","state":"COMPLETED"})
    ));
}

#[test]
fn test_update_without_values() {
    let delta: Delta =
        serde_json::from_str(r#"{"updates":[{"timestamp":"garbage","meta":[]}]}"#).unwrap();
    assert!(delta.updates[0].values.is_empty());
    let before = Utc::now();
    assert!(delta.updates[0].time() >= before);
}

#[test]
fn test_subscribe_request() {
    let req = SubscribeRequest {
        context: "vessels.self".to_string(),
        subscribe: vec![PathSubscription {
            path: "notifications.*".to_string(),
            policy: Some("instant".to_string()),
        }],
    };
    assert_eq!(
        serde_json::to_string(&req).unwrap(),
        r#"{"context":"vessels.self","subscribe":[{"path":"notifications.*","policy":"instant"}]}"#
    );
    let req = UnsubscribeRequest {
        context: "*".to_string(),
        unsubscribe: vec![PathSubscription {
            path: "*".to_string(),
            policy: None,
        }],
    };
    assert_eq!(
        serde_json::to_string(&req).unwrap(),
        r#"{"context":"*","unsubscribe":[{"path":"*"}]}"#
    );
}
