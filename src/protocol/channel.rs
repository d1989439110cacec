//! Channel tags for the script <-> app protocol
//!
//! Every envelope on the wire names its semantic kind with a SCREAMING_SNAKE_CASE
//! string. The set is closed on our side, but the host may add channels faster
//! than scripts are updated, so anything we don't recognize is carried through
//! as [`Channel::Other`] rather than failing the whole line.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! channels {
    ( $( $(#[$doc:meta])* $variant:ident => $wire:literal, )+ ) => {
        /// Semantic tag of an [`AppMessage`](super::AppMessage)
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub enum Channel {
            $( $(#[$doc])* $variant, )+
            /// A channel this build does not know about
            Other(String),
        }

        impl Channel {
            /// The exact string used on the wire
            pub fn as_str(&self) -> &str {
                match self {
                    $( Channel::$variant => $wire, )+
                    Channel::Other(name) => name.as_str(),
                }
            }

            /// Parse a wire tag; unknown tags become [`Channel::Other`]
            pub fn from_wire(tag: &str) -> Self {
                match tag {
                    $( $wire => Channel::$variant, )+
                    other => Channel::Other(other.to_string()),
                }
            }
        }
    };
}

channels! {
    // ------------------------------------------------------------
    // Inbound UI events (app -> script)
    // ------------------------------------------------------------
    Ping => "PING",
    OnSubmit => "ON_SUBMIT",
    Input => "INPUT",
    Action => "ACTION",
    FlagInput => "FLAG_INPUT",
    Selected => "SELECTED",
    Change => "CHANGE",
    NoChoices => "NO_CHOICES",
    Escape => "ESCAPE",
    Back => "BACK",
    Forward => "FORWARD",
    Up => "UP",
    Down => "DOWN",
    Left => "LEFT",
    Right => "RIGHT",
    Tab => "TAB",
    KeywordTriggered => "KEYWORD_TRIGGERED",
    ChoiceFocused => "CHOICE_FOCUSED",
    MessageFocused => "MESSAGE_FOCUSED",
    Blur => "BLUR",
    Abandon => "ABANDON",
    Shortcut => "SHORTCUT",
    OnPaste => "ON_PASTE",
    OnDrop => "ON_DROP",
    OnDragEnter => "ON_DRAG_ENTER",
    OnDragLeave => "ON_DRAG_LEAVE",
    OnDragOver => "ON_DRAG_OVER",
    OnMenuToggle => "ON_MENU_TOGGLE",
    OnInit => "ON_INIT",
    OnValidationFailed => "ON_VALIDATION_FAILED",
    OnAudioData => "ON_AUDIO_DATA",
    ScriptsChanged => "SCRIPTS_CHANGED",
    /// Handled on its own branch, never by generic dispatch
    TabChanged => "TAB_CHANGED",
    /// Terminal event; also re-injected locally by `submit()`
    ValueSubmitted => "VALUE_SUBMITTED",

    // ------------------------------------------------------------
    // Outbound commands (script -> app)
    // ------------------------------------------------------------
    Pong => "PONG",
    SetPromptData => "SET_PROMPT_DATA",
    SetChoices => "SET_CHOICES",
    SetPanel => "SET_PANEL",
    SetPreview => "SET_PREVIEW",
    SetHint => "SET_HINT",
    SetInput => "SET_INPUT",
    SetFooter => "SET_FOOTER",
    SetShortcuts => "SET_SHORTCUTS",
    SetFlags => "SET_FLAGS",
    SetIgnoreBlur => "SET_IGNORE_BLUR",
    PreventSubmit => "PREVENT_SUBMIT",
    ValueInvalid => "VALUE_INVALID",
    BeforeExit => "BEFORE_EXIT",
    SetError => "SET_ERROR",
    Focus => "FOCUS",
    ClipboardSyncHistory => "CLIPBOARD_SYNC_HISTORY",
    ToggleAllSelectedChoices => "TOGGLE_ALL_SELECTED_CHOICES",

    // ------------------------------------------------------------
    // Request / response (script asks, app echoes the channel)
    // ------------------------------------------------------------
    GetAppState => "GET_APP_STATE",
    GetInput => "GET_INPUT",
    GetBounds => "GET_BOUNDS",
    ChatGetMessages => "CHAT_GET_MESSAGES",
    ChatAddMessage => "CHAT_ADD_MESSAGE",
    ChatPushToken => "CHAT_PUSH_TOKEN",
}

impl Channel {
    /// Channels whose default handling ends the hosting script
    pub fn is_exit_event(&self) -> bool {
        matches!(self, Channel::Escape | Channel::Blur | Channel::Abandon)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Channel::from_wire(&tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_channel_round_trips_through_wire_tag() {
        assert_eq!(Channel::ValueSubmitted.as_str(), "VALUE_SUBMITTED");
        assert_eq!(Channel::from_wire("TAB_CHANGED"), Channel::TabChanged);
        assert_eq!(Channel::from_wire("ON_DRAG_OVER"), Channel::OnDragOver);
    }

    #[test]
    fn test_unknown_channel_is_preserved() {
        let channel = Channel::from_wire("SOMETHING_NEW");
        assert_eq!(channel, Channel::Other("SOMETHING_NEW".to_string()));
        assert_eq!(channel.as_str(), "SOMETHING_NEW");
    }

    #[test]
    fn test_channel_serde_uses_plain_string() {
        let json = serde_json::to_string(&Channel::SetChoices).unwrap();
        assert_eq!(json, "\"SET_CHOICES\"");

        let parsed: Channel = serde_json::from_str("\"PING\"").unwrap();
        assert_eq!(parsed, Channel::Ping);

        let unknown: Channel = serde_json::from_str("\"WHATEVER\"").unwrap();
        assert!(matches!(unknown, Channel::Other(ref s) if s == "WHATEVER"));
    }

    #[test]
    fn test_exit_events() {
        assert!(Channel::Escape.is_exit_event());
        assert!(Channel::Blur.is_exit_event());
        assert!(Channel::Abandon.is_exit_event());
        assert!(!Channel::Input.is_exit_event());
    }
}
