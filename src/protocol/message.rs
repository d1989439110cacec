//! The AppMessage envelope and the AppState snapshot it carries
//!
//! Every line on the wire is one envelope: a channel tag plus whatever the
//! channel needs. Inbound UI events carry a `state`; outbound commands and
//! request/response pairs mostly carry a `value`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::channel::Channel;
use super::types::{FocusedChoice, Ui};

/// Reference to an action in the actions menu
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRef {
    pub name: String,
}

/// Snapshot of host-side prompt state sent alongside an event
///
/// Transient: handlers receive it by value and nothing retains it past the
/// invocation that received it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<FocusedChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selected: Vec<Value>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paste: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Ui>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged_value: Option<Value>,
    /// Fields this build doesn't model (kept so handlers can still read them)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppState {
    pub fn with_input(input: impl Into<String>) -> Self {
        AppState {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Id of the focused choice, if the host reported one
    pub fn focused_id(&self) -> Option<&str> {
        self.focused.as_ref().and_then(|f| f.id.as_deref())
    }

    /// Value of the focused choice, if any
    pub fn focused_value(&self) -> Option<&Value> {
        self.focused.as_ref().and_then(|f| f.value.as_ref())
    }
}

/// The hosts sometimes send `"input": null`; treat it as empty input
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One unit of exchange on the process channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMessage {
    pub channel: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AppState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Correlates a `send_wait` request with its reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
}

impl AppMessage {
    pub fn new(channel: Channel) -> Self {
        AppMessage {
            channel,
            state: None,
            value: None,
            request_id: None,
            prompt_id: None,
        }
    }

    /// An outbound command carrying a value
    pub fn with_value(channel: Channel, value: Value) -> Self {
        AppMessage {
            value: Some(value),
            ..AppMessage::new(channel)
        }
    }

    /// An event carrying a state snapshot
    pub fn with_state(channel: Channel, state: AppState) -> Self {
        AppMessage {
            state: Some(state),
            ..AppMessage::new(channel)
        }
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn prompt_id(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = Some(prompt_id.into());
        self
    }

    /// The state snapshot, or an empty one when the host sent none
    pub fn state_or_default(&self) -> AppState {
        self.state.clone().unwrap_or_default()
    }

    /// What a `send_wait` caller receives: `value` when present, otherwise the
    /// whole envelope as JSON
    pub fn reply_value(&self) -> Value {
        match &self.value {
            Some(value) => value.clone(),
            None => serde_json::to_value(self).unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_inbound_event_with_state() {
        let raw = json!({
            "channel": "CHOICE_FOCUSED",
            "state": {
                "input": "ab",
                "focused": {"id": "choice:1:y", "name": "y", "value": "y"},
                "index": 1,
                "someHostField": "kept"
            }
        });
        let msg: AppMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.channel, Channel::ChoiceFocused);
        let state = msg.state.unwrap();
        assert_eq!(state.input, "ab");
        assert_eq!(state.focused_id(), Some("choice:1:y"));
        assert_eq!(state.index, Some(1));
        assert_eq!(state.extra["someHostField"], "kept");
    }

    #[test]
    fn test_null_input_becomes_empty() {
        let msg: AppMessage =
            serde_json::from_str(r#"{"channel":"INPUT","state":{"input":null}}"#).unwrap();
        assert_eq!(msg.state.unwrap().input, "");
    }

    #[test]
    fn test_outbound_message_omits_empty_fields() {
        let msg = AppMessage::with_value(Channel::SetHint, json!("type something"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"channel": "SET_HINT", "value": "type something"}));
    }

    #[test]
    fn test_reply_value_prefers_value_field() {
        let with_value = AppMessage::with_value(Channel::GetInput, json!("hello"));
        assert_eq!(with_value.reply_value(), json!("hello"));

        let without_value =
            AppMessage::with_state(Channel::GetAppState, AppState::with_input("typed"));
        let reply = without_value.reply_value();
        assert_eq!(reply["channel"], "GET_APP_STATE");
        assert_eq!(reply["state"]["input"], "typed");
    }
}
