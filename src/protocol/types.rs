//! Protocol payload types
//!
//! Contains the serializable shapes carried inside envelopes:
//! - ChoiceData, FocusedChoice for list prompts
//! - PromptData pushed on SET_PROMPT_DATA
//! - ShortcutData, FlagData for keybindings and the actions menu
//! - ScriptErrorData for SET_ERROR

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// UI kind a prompt asks the host to render
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ui {
    #[default]
    Arg,
    Div,
    Editor,
    Form,
    Fields,
    Drop,
    Hotkey,
    Chat,
    Mic,
    Webcam,
    Textarea,
    Term,
    Emoji,
}

impl Ui {
    /// UIs that show a choice list and therefore get initial choices
    pub fn shows_choices(&self) -> bool {
        matches!(self, Ui::Arg | Ui::Hotkey | Ui::Div)
    }
}

/// Whether the host filters choices itself or the script regenerates them
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Filter,
    Generate,
}

/// Shape of the choice source, reported to the host as a rendering hint
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChoicesType {
    #[default]
    Null,
    Async,
    Function,
    Array,
    String,
}

/// A choice as the host sees it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Static preview HTML; generated previews are only announced via `has_preview`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default)]
    pub has_preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// The focused choice reference the host sends back in [`AppState`](super::AppState)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FocusedChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A keybinding shown in the prompt footer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutData {
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar: Option<String>,
}

/// An entry in the actions menu ("flags" on the wire)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default)]
    pub has_action: bool,
}

/// Everything the host needs to render a prompt, sent on SET_PROMPT_DATA
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptData {
    pub id: String,
    pub script_path: String,
    pub ui: Ui,
    pub mode: Mode,
    pub choices_type: ChoicesType,
    pub placeholder: String,
    pub input: String,
    pub hint: String,
    pub footer: String,
    pub panel: String,
    pub preview: String,
    pub has_preview: bool,
    pub preview_width_percent: u8,
    pub secret: bool,
    pub strict: bool,
    pub multiple: bool,
    pub ignore_blur: bool,
    pub hide_on_escape: bool,
    pub has_on_no_choices: bool,
    pub tabs: Vec<String>,
    pub tab_index: usize,
    pub input_regex: String,
    pub class_name: String,
    #[serde(default)]
    pub header_class_name: String,
    #[serde(default)]
    pub footer_class_name: String,
    /// Label of the submit button
    #[serde(default)]
    pub enter: String,
    pub search_keys: Vec<String>,
    #[serde(default)]
    pub shortcuts: Vec<ShortcutData>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

/// What SET_CHOICES carries
///
/// `choices: None` clears the list and tells the host there is nothing to filter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoicesPayload {
    pub choices: Option<Vec<ChoiceData>>,
    #[serde(default)]
    pub class_name: String,
    /// Choices came from an input-driven generator; the host should not re-filter them
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub input_regex: String,
}

/// Default fields the host searches when filtering choices
pub fn default_search_keys() -> Vec<String> {
    ["slicedName", "friendlyShortcut", "tag", "group", "command"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

/// Script error information sent on SET_ERROR
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptErrorData {
    /// User-friendly error message
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Path to the script that failed
    pub script_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// When the error occurred (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Last bridge log lines before the failure, newest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_logs: Vec<String>,
}

impl ScriptErrorData {
    pub fn new(error_message: String, script_path: String) -> Self {
        ScriptErrorData {
            error_message,
            stack_trace: None,
            script_path,
            suggestions: Vec::new(),
            timestamp: None,
            recent_logs: Vec::new(),
        }
    }

    pub fn with_stack_trace(mut self, trace: String) -> Self {
        self.stack_trace = Some(trace);
        self
    }

    pub fn add_suggestion(mut self, suggestion: String) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn with_timestamp(mut self, timestamp: String) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_recent_logs(mut self, logs: Vec<String>) -> Self {
        self.recent_logs = logs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Ui::Textarea).unwrap(), "\"textarea\"");
        let ui: Ui = serde_json::from_str("\"webcam\"").unwrap();
        assert_eq!(ui, Ui::Webcam);
    }

    #[test]
    fn test_only_list_uis_show_choices() {
        assert!(Ui::Arg.shows_choices());
        assert!(Ui::Hotkey.shows_choices());
        assert!(Ui::Div.shows_choices());
        assert!(!Ui::Editor.shows_choices());
        assert!(!Ui::Drop.shows_choices());
    }

    #[test]
    fn test_choice_data_skips_empty_optionals() {
        let choice = ChoiceData {
            id: "choice:0:x".to_string(),
            name: "x".to_string(),
            value: Value::String("x".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&choice).unwrap();
        assert_eq!(json["hasPreview"], false);
        assert!(json.get("description").is_none());
        assert!(json.get("className").is_none());
    }

    #[test]
    fn test_focused_choice_tolerates_missing_fields() {
        let focused: FocusedChoice = serde_json::from_str("{}").unwrap();
        assert_eq!(focused, FocusedChoice::default());

        let focused: FocusedChoice =
            serde_json::from_str(r#"{"id":"a","value":42,"extra":true}"#).unwrap();
        assert_eq!(focused.id.as_deref(), Some("a"));
        assert_eq!(focused.value, Some(Value::from(42)));
    }

    #[test]
    fn test_script_error_data_builder() {
        let data = ScriptErrorData::new("boom".to_string(), "/tmp/a.ts".to_string())
            .with_stack_trace("at main".to_string())
            .add_suggestion("check input".to_string());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["errorMessage"], "boom");
        assert_eq!(json["stackTrace"], "at main");
        assert_eq!(json["suggestions"][0], "check input");
        assert!(json.get("timestamp").is_none());
    }
}
