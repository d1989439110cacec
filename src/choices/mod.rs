//! Choices and where they come from
//!
//! A prompt's list is described by a [`ChoiceSource`], decided once when the
//! prompt is configured:
//! - `Static` lists and `Html` strings are shown as-is and never regenerated
//! - `Constant` functions run once when the prompt starts
//! - `Generator` functions re-run on every (debounced) input change
//!
//! Any function source may return a [`ChoiceResult`] carrying side-channel
//! directives (preview, panel, hint) next to the choices.
//!
//! # Module Structure
//!
//! - `resolver`: runs sources, drops stale results, pushes SET_CHOICES
//! - `debounce`: trailing-edge debounce used for INPUT and CHOICE_FOCUSED

mod debounce;
mod resolver;

pub use debounce::Debouncer;
pub use resolver::{ChoiceResolver, Resolution};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, FutureExt};
use serde_json::Value;

use crate::hooks::{self, ConstantFn, EventHook, GeneratorFn, PreviewFn, SubmitHook};
use crate::protocol::{AppState, ChoiceData, ChoicesType, Mode};
use crate::session::{Action, PromptContext, SubmitOutcome};

/// Preview content for a choice
#[derive(Clone)]
pub enum Preview {
    /// Sent to the host with the choice
    Html(String),
    /// Computed when the choice gains focus
    Generator(PreviewFn),
}

impl fmt::Debug for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preview::Html(html) => f.debug_tuple("Html").field(html).finish(),
            Preview::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// One selectable item
#[derive(Clone, Default)]
pub struct Choice {
    /// Assigned by the resolver when missing
    pub id: Option<String>,
    pub name: String,
    pub value: Value,
    pub description: Option<String>,
    pub group: Option<String>,
    pub tag: Option<String>,
    pub class_name: Option<String>,
    pub preview: Option<Preview>,
    /// Shown in the actions menu when the choice is flagged
    pub actions: Vec<Action>,
    pub on_focus: Option<EventHook>,
    pub on_submit: Option<SubmitHook>,
    pub on_action: Option<EventHook>,
}

impl fmt::Debug for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Choice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("value", &self.value)
            .field("group", &self.group)
            .field("preview", &self.preview)
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

impl Choice {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Choice {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn preview_html(mut self, html: impl Into<String>) -> Self {
        self.preview = Some(Preview::Html(html.into()));
        self
    }

    pub fn preview<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.preview = Some(Preview::Generator(hooks::preview_fn(f)));
        self
    }

    pub fn actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn on_focus<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_focus = Some(hooks::event_hook(f));
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

    pub fn on_action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_action = Some(hooks::event_hook(f));
        self
    }

    /// Label used to derive an id: the name, else the value's text
    fn label(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Wire form, using `id` (already made unique by the resolver)
    pub fn to_data(&self, id: String) -> ChoiceData {
        let (preview, has_preview) = match &self.preview {
            Some(Preview::Html(html)) => (Some(html.clone()), true),
            Some(Preview::Generator(_)) => (None, true),
            None => (None, false),
        };
        ChoiceData {
            id,
            name: self.name.clone(),
            value: self.value.clone(),
            description: self.description.clone(),
            group: self.group.clone(),
            preview,
            has_preview,
            class_name: self.class_name.clone(),
            tag: self.tag.clone(),
        }
    }
}

/// A bare string is both the name and the value
impl From<&str> for Choice {
    fn from(s: &str) -> Self {
        Choice::new(s, s)
    }
}

impl From<String> for Choice {
    fn from(s: String) -> Self {
        Choice::new(s.clone(), s)
    }
}

/// What a choice function hands back
#[derive(Clone, Debug)]
pub enum ChoiceResult {
    Choices(Vec<Choice>),
    /// Displayed as panel content instead of a list
    Html(String),
    /// Directives are applied first; `choices: None` leaves the list as it is
    Directed {
        choices: Option<Vec<Choice>>,
        preview: Option<String>,
        panel: Option<String>,
        hint: Option<String>,
    },
    /// Clears the list
    Null,
}

impl ChoiceResult {
    pub fn directed(choices: Vec<Choice>) -> Self {
        ChoiceResult::Directed {
            choices: Some(choices),
            preview: None,
            panel: None,
            hint: None,
        }
    }

    pub fn with_hint(self, text: impl Into<String>) -> Self {
        self.map_directives(|_, _, hint| *hint = Some(text.into()))
    }

    pub fn with_panel(self, html: impl Into<String>) -> Self {
        self.map_directives(|_, panel, _| *panel = Some(html.into()))
    }

    pub fn with_preview(self, html: impl Into<String>) -> Self {
        self.map_directives(|preview, _, _| *preview = Some(html.into()))
    }

    fn map_directives(
        self,
        f: impl FnOnce(&mut Option<String>, &mut Option<String>, &mut Option<String>),
    ) -> Self {
        let (choices, mut preview, mut panel, mut hint) = match self {
            ChoiceResult::Directed {
                choices,
                preview,
                panel,
                hint,
            } => (choices, preview, panel, hint),
            ChoiceResult::Choices(choices) => (Some(choices), None, None, None),
            ChoiceResult::Html(_) | ChoiceResult::Null => (None, None, None, None),
        };
        f(&mut preview, &mut panel, &mut hint);
        ChoiceResult::Directed {
            choices,
            preview,
            panel,
            hint,
        }
    }
}

impl<T: Into<Choice>> From<Vec<T>> for ChoiceResult {
    fn from(items: Vec<T>) -> Self {
        ChoiceResult::Choices(items.into_iter().map(Into::into).collect())
    }
}

impl From<String> for ChoiceResult {
    fn from(html: String) -> Self {
        ChoiceResult::Html(html)
    }
}

impl From<&str> for ChoiceResult {
    fn from(html: &str) -> Self {
        ChoiceResult::Html(html.to_string())
    }
}

/// Where a prompt's choices come from
#[derive(Clone, Default)]
pub enum ChoiceSource {
    #[default]
    None,
    Static(Vec<Choice>),
    Html(String),
    Constant { f: ConstantFn, is_async: bool },
    Generator { f: GeneratorFn, is_async: bool },
}

impl fmt::Debug for ChoiceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChoiceSource::None => f.write_str("None"),
            ChoiceSource::Static(list) => write!(f, "Static({} choices)", list.len()),
            ChoiceSource::Html(_) => f.write_str("Html(..)"),
            ChoiceSource::Constant { is_async, .. } => write!(f, "Constant(async={})", is_async),
            ChoiceSource::Generator { is_async, .. } => write!(f, "Generator(async={})", is_async),
        }
    }
}

impl ChoiceSource {
    /// Run once when the prompt starts
    pub fn constant<F, Fut, R>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<ChoiceResult>,
    {
        let f: ConstantFn = Arc::new(move || f().map(|r| r.map(Into::into)).boxed());
        ChoiceSource::Constant { f, is_async: true }
    }

    pub fn constant_sync<F, R>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<ChoiceResult>,
    {
        let f: ConstantFn = Arc::new(move || future::ready(f().map(Into::into)).boxed());
        ChoiceSource::Constant { f, is_async: false }
    }

    /// Re-run with the current input on every debounced INPUT
    pub fn generator<F, Fut, R>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<ChoiceResult>,
    {
        let f: GeneratorFn = Arc::new(move |input| f(input).map(|r| r.map(Into::into)).boxed());
        ChoiceSource::Generator { f, is_async: true }
    }

    pub fn generator_sync<F, R>(f: F) -> Self
    where
        F: Fn(String) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<ChoiceResult>,
    {
        let f: GeneratorFn =
            Arc::new(move |input| future::ready(f(input).map(Into::into)).boxed());
        ChoiceSource::Generator { f, is_async: false }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ChoiceSource::None)
    }

    pub fn is_generator(&self) -> bool {
        matches!(self, ChoiceSource::Generator { .. })
    }

    /// Rendering hint reported in SET_PROMPT_DATA
    pub fn choices_type(&self) -> ChoicesType {
        match self {
            ChoiceSource::None => ChoicesType::Null,
            ChoiceSource::Static(_) => ChoicesType::Array,
            ChoiceSource::Html(_) => ChoicesType::String,
            ChoiceSource::Constant { is_async, .. } | ChoiceSource::Generator { is_async, .. } => {
                if *is_async {
                    ChoicesType::Async
                } else {
                    ChoicesType::Function
                }
            }
        }
    }

    /// Generators own filtering; everything else lets the host filter
    pub fn mode(&self) -> Mode {
        if self.is_generator() {
            Mode::Generate
        } else {
            Mode::Filter
        }
    }
}

impl<T: Into<Choice>> From<Vec<T>> for ChoiceSource {
    fn from(items: Vec<T>) -> Self {
        ChoiceSource::Static(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Choice>, const N: usize> From<[T; N]> for ChoiceSource {
    fn from(items: [T; N]) -> Self {
        ChoiceSource::Static(items.into_iter().map(Into::into).collect())
    }
}

impl From<String> for ChoiceSource {
    fn from(html: String) -> Self {
        ChoiceSource::Html(html)
    }
}

impl From<&str> for ChoiceSource {
    fn from(html: &str) -> Self {
        ChoiceSource::Html(html.to_string())
    }
}

/// Wrap `html` in a container div when a class is given
pub fn wrap_html(html: &str, class_name: &str) -> String {
    if class_name.is_empty() {
        html.to_string()
    } else {
        format!("<div class=\"{}\">{}</div>", class_name, html)
    }
}
