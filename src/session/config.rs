//! Declarative prompt configuration
//!
//! A `PromptConfig` is built once per prompt and owned by its session. Hooks
//! are registered per channel; anything not registered falls back to the
//! defaults in `handlers`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::choices::{Choice, ChoiceSource};
use crate::hooks::{
    self, ActionsFn, Condition, EventHook, SubmitHook, TabFn, Validator,
};
use crate::protocol::{
    default_search_keys, AppState, Channel, FlagData, FocusedChoice, PromptData, ShortcutData, Ui,
};
use crate::session::{PromptContext, SubmitOutcome, Validation};
use crate::kit::Kit;

/// A keybinding; pressing it either runs `on_press` or submits its value
#[derive(Clone)]
pub struct Shortcut {
    pub key: String,
    pub name: String,
    pub value: Option<Value>,
    pub bar: Option<String>,
    /// Shown only while this holds for the focused choice
    pub condition: Option<Condition>,
    pub on_press: Option<EventHook>,
}

impl fmt::Debug for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shortcut")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("value", &self.value)
            .field("bar", &self.bar)
            .finish_non_exhaustive()
    }
}

impl Shortcut {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Shortcut {
            key: key.into(),
            name: name.into(),
            value: None,
            bar: None,
            condition: None,
            on_press: None,
        }
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn bar(mut self, bar: impl Into<String>) -> Self {
        self.bar = Some(bar.into());
        self
    }

    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&FocusedChoice>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(hooks::condition(f));
        self
    }

    pub fn on_press<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_press = Some(hooks::event_hook(f));
        self
    }

    pub fn is_visible_for(&self, focused: Option<&FocusedChoice>) -> bool {
        self.condition.as_ref().map_or(true, |c| c(focused))
    }

    pub fn to_data(&self) -> ShortcutData {
        ShortcutData {
            key: self.key.clone(),
            name: self.name.clone(),
            value: self.value.clone(),
            bar: self.bar.clone(),
        }
    }
}

/// An entry in the actions menu
#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub shortcut: Option<String>,
    pub description: Option<String>,
    pub value: Option<Value>,
    pub condition: Option<Condition>,
    pub on_action: Option<EventHook>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("shortcut", &self.shortcut)
            .field("has_action", &self.on_action.is_some())
            .finish_non_exhaustive()
    }
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Action {
            name: name.into(),
            shortcut: None,
            description: None,
            value: None,
            condition: None,
            on_action: None,
        }
    }

    pub fn shortcut(mut self, key: impl Into<String>) -> Self {
        self.shortcut = Some(key.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&FocusedChoice>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(hooks::condition(f));
        self
    }

    pub fn on_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_action = Some(hooks::event_hook(f));
        self
    }

    /// The action as the host lists it while the menu is open
    pub fn to_choice(&self) -> Choice {
        Choice {
            id: Some(self.name.clone()),
            name: self.name.clone(),
            value: self
                .value
                .clone()
                .unwrap_or_else(|| Value::String(self.name.clone())),
            description: self.description.clone(),
            on_action: self.on_action.clone(),
            ..Default::default()
        }
    }

    pub fn is_visible_for(&self, focused: Option<&FocusedChoice>) -> bool {
        self.condition.as_ref().map_or(true, |c| c(focused))
    }

    pub fn to_flag(&self) -> FlagData {
        FlagData {
            name: self.name.clone(),
            shortcut: self.shortcut.clone(),
            description: self.description.clone(),
            value: self.value.clone(),
            has_action: self.on_action.is_some(),
        }
    }
}

/// The flags map SET_FLAGS / SET_PROMPT_DATA carry for a set of actions
pub fn flags_from_actions(actions: &[Action]) -> BTreeMap<String, FlagData> {
    actions
        .iter()
        .map(|a| (a.name.clone(), a.to_flag()))
        .collect()
}

/// A named tab; switching to it runs the body, which usually opens a new prompt
#[derive(Clone)]
pub struct Tab {
    pub name: String,
    pub body: TabFn,
}

impl fmt::Debug for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tab").field("name", &self.name).finish()
    }
}

impl Tab {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Kit, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Tab {
            name: name.into(),
            body: hooks::tab_fn(body),
        }
    }
}

/// Everything one prompt invocation needs
#[derive(Clone, Default)]
pub struct PromptConfig {
    pub ui: Ui,
    pub placeholder: String,
    pub input: String,
    pub hint: String,
    pub footer: String,
    pub panel: String,
    pub preview: Option<String>,
    /// Submit button label
    pub enter: String,
    pub choices: ChoiceSource,
    /// Shown while a function source computes its first list
    pub initial_choices: Option<Vec<Choice>>,
    pub validate: Option<Validator>,
    pub shortcuts: Vec<Shortcut>,
    pub actions: Vec<Action>,
    /// Re-run on FLAG_INPUT to rebuild the actions menu
    pub dynamic_actions: Option<ActionsFn>,
    pub flags: BTreeMap<String, FlagData>,
    /// Replaces the kit's tab registry when set
    pub tabs: Option<Vec<Tab>>,
    pub ignore_blur: bool,
    pub hide_on_escape: Option<bool>,
    pub secret: bool,
    pub strict: Option<bool>,
    pub multiple: bool,
    pub class_name: String,
    pub header_class_name: String,
    pub footer_class_name: String,
    pub input_regex: Option<String>,
    pub keyword: Option<String>,
    pub search_keys: Option<Vec<String>>,
    pub preview_width_percent: Option<u8>,
    pub debounce_input: Option<Duration>,
    pub debounce_choice_focus: Option<Duration>,
    pub on_submit: Option<SubmitHook>,
    pub hooks: HashMap<Channel, EventHook>,
}

impl fmt::Debug for PromptConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptConfig")
            .field("ui", &self.ui)
            .field("placeholder", &self.placeholder)
            .field("choices", &self.choices)
            .field("shortcuts", &self.shortcuts)
            .field("actions", &self.actions)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PromptConfig {
    pub fn new() -> Self {
        PromptConfig::default()
    }

    pub fn ui(mut self, ui: Ui) -> Self {
        self.ui = ui;
        self
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = text.into();
        self
    }

    pub fn input(mut self, text: impl Into<String>) -> Self {
        self.input = text.into();
        self
    }

    pub fn hint(mut self, text: impl Into<String>) -> Self {
        self.hint = text.into();
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = text.into();
        self
    }

    pub fn panel(mut self, html: impl Into<String>) -> Self {
        self.panel = html.into();
        self
    }

    pub fn preview(mut self, html: impl Into<String>) -> Self {
        self.preview = Some(html.into());
        self
    }

    pub fn enter(mut self, label: impl Into<String>) -> Self {
        self.enter = label.into();
        self
    }

    pub fn choices(mut self, source: impl Into<ChoiceSource>) -> Self {
        self.choices = source.into();
        self
    }

    pub fn initial_choices<C: Into<Choice>>(mut self, choices: Vec<C>) -> Self {
        self.initial_choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate<F, Fut, V>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
        V: Into<Validation>,
    {
        self.validate = Some(hooks::validator(f));
        self
    }

    pub fn shortcut(mut self, shortcut: Shortcut) -> Self {
        self.shortcuts.push(shortcut);
        self
    }

    pub fn shortcuts(mut self, shortcuts: Vec<Shortcut>) -> Self {
        self.shortcuts = shortcuts;
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn dynamic_actions<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<Action>>> + Send + 'static,
    {
        self.dynamic_actions = Some(hooks::actions_fn(f));
        self
    }

    pub fn flag(mut self, flag: FlagData) -> Self {
        self.flags.insert(flag.name.clone(), flag);
        self
    }

    pub fn tabs(mut self, tabs: Vec<Tab>) -> Self {
        self.tabs = Some(tabs);
        self
    }

    pub fn ignore_blur(mut self, ignore: bool) -> Self {
        self.ignore_blur = ignore;
        self
    }

    pub fn hide_on_escape(mut self, hide: bool) -> Self {
        self.hide_on_escape = Some(hide);
        self
    }

    pub fn secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn class_name(mut self, class: impl Into<String>) -> Self {
        self.class_name = class.into();
        self
    }

    pub fn header_class_name(mut self, class: impl Into<String>) -> Self {
        self.header_class_name = class.into();
        self
    }

    pub fn footer_class_name(mut self, class: impl Into<String>) -> Self {
        self.footer_class_name = class.into();
        self
    }

    pub fn input_regex(mut self, pattern: impl Into<String>) -> Self {
        self.input_regex = Some(pattern.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn search_keys(mut self, keys: Vec<String>) -> Self {
        self.search_keys = Some(keys);
        self
    }

    pub fn preview_width_percent(mut self, percent: u8) -> Self {
        self.preview_width_percent = Some(percent.min(100));
        self
    }

    pub fn debounce_input(mut self, interval: Duration) -> Self {
        self.debounce_input = Some(interval);
        self
    }

    pub fn debounce_choice_focus(mut self, interval: Duration) -> Self {
        self.debounce_choice_focus = Some(interval);
        self
    }

    pub fn on_submit<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<SubmitOutcome>> + Send + 'static,
    {
        self.on_submit = Some(hooks::submit_hook(f));
        self
    }

    /// Register a handler for any inbound channel
    pub fn on<F, Fut>(mut self, channel: Channel, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hooks.insert(channel, hooks::event_hook(f));
        self
    }

    pub fn has_hook(&self, channel: &Channel) -> bool {
        self.hooks.contains_key(channel)
    }

    /// Settle flags that depend on each other.
    ///
    /// An explicit blur handler implies `ignore_blur`; actions become flags.
    pub(crate) fn normalize(&mut self) {
        if self.has_hook(&Channel::Blur) {
            self.ignore_blur = true;
        }
        let action_flags = flags_from_actions(&self.actions);
        self.flags.extend(action_flags);
    }

    /// Pattern the host uses to cut the keyword off the input
    pub fn effective_input_regex(&self) -> String {
        match (&self.input_regex, &self.keyword) {
            (Some(pattern), _) => pattern.clone(),
            (None, Some(keyword)) if !keyword.is_empty() => format!("(?<={}\\s)(.*)", keyword),
            _ => String::new(),
        }
    }

    /// SET_PROMPT_DATA payload for this config
    pub fn to_prompt_data(
        &self,
        id: String,
        script_path: String,
        tabs: Vec<String>,
        tab_index: usize,
        default_preview_width: u8,
    ) -> PromptData {
        let escape_default = !self.has_hook(&Channel::Escape);
        let has_escape_shortcut = self.shortcuts.iter().any(|s| s.key == "escape");

        PromptData {
            id,
            script_path,
            ui: self.ui,
            mode: self.choices.mode(),
            choices_type: self.choices.choices_type(),
            placeholder: self.placeholder.clone(),
            input: self.input.clone(),
            hint: self.hint.clone(),
            footer: self.footer.clone(),
            panel: self.panel.clone(),
            preview: self.preview.clone().unwrap_or_default(),
            has_preview: self.preview.is_some(),
            preview_width_percent: self.preview_width_percent.unwrap_or(default_preview_width),
            secret: self.secret,
            strict: self.strict.unwrap_or(!self.choices.is_none()),
            multiple: self.multiple,
            ignore_blur: self.ignore_blur,
            hide_on_escape: self
                .hide_on_escape
                .unwrap_or(escape_default && !has_escape_shortcut),
            has_on_no_choices: self.has_hook(&Channel::NoChoices),
            tabs,
            tab_index,
            input_regex: self.effective_input_regex(),
            class_name: self.class_name.clone(),
            header_class_name: self.header_class_name.clone(),
            footer_class_name: self.footer_class_name.clone(),
            enter: self.enter.clone(),
            search_keys: self.search_keys.clone().unwrap_or_else(default_search_keys),
            shortcuts: self.shortcuts.iter().map(Shortcut::to_data).collect(),
            flags: self.flags.clone(),
            keyword: self
                .keyword
                .clone()
                .or_else(|| (self.ui != Ui::Arg).then(String::new)),
        }
    }
}

macro_rules! hook_builders {
    ( $( $(#[$doc:meta])* $method:ident => $channel:ident ),+ $(,)? ) => {
        impl PromptConfig {
            $(
                $(#[$doc])*
                pub fn $method<F, Fut>(self, f: F) -> Self
                where
                    F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
                    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
                {
                    self.on(Channel::$channel, f)
                }
            )+
        }
    };
}

hook_builders! {
    on_init => OnInit,
    /// Replaces the debounced generator re-run
    on_input => Input,
    /// Runs after the default focus work (preview, shortcuts)
    on_choice_focus => ChoiceFocused,
    on_flag_input => FlagInput,
    on_no_choices => NoChoices,
    /// Replaces BEFORE_EXIT + termination
    on_escape => Escape,
    /// Also turns on `ignore_blur`
    on_blur => Blur,
    on_abandon => Abandon,
    on_selected => Selected,
    on_change => Change,
    on_back => Back,
    on_forward => Forward,
    on_up => Up,
    on_down => Down,
    on_left => Left,
    on_right => Right,
    on_tab => Tab,
    on_keyword => KeywordTriggered,
    on_message_focus => MessageFocused,
    on_paste => OnPaste,
    on_drop => OnDrop,
    on_drag_enter => OnDragEnter,
    on_drag_leave => OnDragLeave,
    on_drag_over => OnDragOver,
    on_menu_toggle => OnMenuToggle,
    on_validation_failed => OnValidationFailed,
    on_audio_data => OnAudioData,
}
