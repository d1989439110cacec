//! The script-facing API
//!
//! A [`Kit`] ties one bus, one supervisor and the script's process-wide
//! state (flags, tabs, pre-supplied args) together. Every prompt helper
//! (`arg`, `div`, `editor`, ...) is a thin preset over [`Kit::prompt`].

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::bus::MessageBus;
use crate::collab::{CommandRunner, ProcessRunner};
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::protocol::{AppMessage, AppState, Channel, Ui};
use crate::session::{PromptConfig, PromptSession, PromptValue, Shortcut, Tab, Validation};
use crate::supervisor::PromptSupervisor;
use crate::transport::{start_stdin_reader, StdioTransport, Transport};

/// Ends the hosting script
pub trait Terminator: Send + Sync {
    fn terminate(&self, reason: &str);
}

/// Exits the process with status 0
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, reason: &str) {
        info!(reason, "Finishing script");
        std::process::exit(0);
    }
}

/// Records termination requests instead of exiting; for tests and embedding
#[derive(Clone, Debug, Default)]
pub struct RecordingTerminator {
    reasons: Arc<Mutex<Vec<String>>>,
}

impl RecordingTerminator {
    pub fn new() -> Self {
        RecordingTerminator::default()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&self, reason: &str) {
        debug!(reason, "Termination recorded");
        self.reasons.lock().push(reason.to_string());
    }
}

/// Modifier used in shortcut keys on this platform
pub fn cmd() -> &'static str {
    if cfg!(target_os = "macos") {
        "cmd"
    } else {
        "ctrl"
    }
}

/// A field for [`Kit::fields`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Field {
    pub label: String,
    pub placeholder: Option<String>,
    /// `input` unless set
    pub element: Option<String>,
    pub input_type: Option<String>,
    pub value: Option<String>,
}

impl From<&str> for Field {
    fn from(label: &str) -> Self {
        Field {
            label: label.to_string(),
            placeholder: Some(label.to_string()),
            ..Default::default()
        }
    }
}

fn escape_attr(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Form markup for a list of fields; the first one gets focus
pub fn fields_html(fields: &[Field]) -> String {
    let inputs: String = fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let element = field.element.as_deref().unwrap_or("input");
            let mut attrs = format!(
                "id=\"{i}\" name=\"{i}\" data-name=\"{}\"",
                escape_attr(&field.label)
            );
            if i == 0 {
                attrs.push_str(" autofocus");
            }
            if let Some(placeholder) = &field.placeholder {
                attrs.push_str(&format!(" placeholder=\"{}\"", escape_attr(placeholder)));
            }
            if let Some(input_type) = &field.input_type {
                attrs.push_str(&format!(" type=\"{}\"", escape_attr(input_type)));
            }
            if let Some(value) = &field.value {
                attrs.push_str(&format!(" value=\"{}\"", escape_attr(value)));
            }
            format!(
                "<div class=\"w-full pt-4 flex flex-col-reverse\"><{element} {attrs} class=\"peer text-xl h-10 px-4 outline-none w-full\"/><label for=\"{i}\" class=\"text-sm px-4 block\">{}</label></div>",
                escape_attr(&field.label)
            )
        })
        .collect();
    format!(
        "<div class=\"flex flex-col items-center min-h-full flex-1 w-full\">{inputs}<div class=\"w-full px-4 invisible h-0\"><input type=\"reset\" name=\"reset-form\" value=\"Reset\" accesskey=\"r\"/><input type=\"submit\" name=\"submit-form\" value=\"Submit\"/></div></div>"
    )
}

struct KitInner {
    bus: MessageBus,
    supervisor: PromptSupervisor,
    settings: BridgeConfig,
    terminator: Arc<dyn Terminator>,
    runner: Option<Arc<dyn ProcessRunner>>,
    script_path: String,
    flags: Mutex<BTreeMap<String, Value>>,
    action_flag: Mutex<String>,
    prompt_state: Mutex<AppState>,
    tabs: Mutex<Vec<Tab>>,
    args: Mutex<VecDeque<String>>,
    abandoned: AtomicBool,
    scripts_from_cache: AtomicBool,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the prompt engine; cheap to clone
#[derive(Clone)]
pub struct Kit {
    inner: Arc<KitInner>,
}

#[derive(Default)]
pub struct KitBuilder {
    transport: Option<Arc<dyn Transport>>,
    settings: BridgeConfig,
    terminator: Option<Arc<dyn Terminator>>,
    runner: Option<Arc<dyn ProcessRunner>>,
    script_path: String,
    args: Vec<String>,
}

impl KitBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn settings(mut self, settings: BridgeConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn script_path(mut self, path: impl Into<String>) -> Self {
        self.script_path = path.into();
        self
    }

    /// Values consumed by the next `arg`-style prompts instead of asking
    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn build(self) -> Kit {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(StdioTransport::new()));
        let bus = MessageBus::with_options(
            transport,
            self.settings.bus_capacity,
            self.settings.send_wait_timeout(),
        );
        Kit {
            inner: Arc::new(KitInner {
                bus,
                supervisor: PromptSupervisor::new(),
                terminator: self
                    .terminator
                    .unwrap_or_else(|| Arc::new(ProcessTerminator)),
                runner: self.runner,
                script_path: self.script_path,
                settings: self.settings,
                flags: Mutex::new(BTreeMap::new()),
                action_flag: Mutex::new(String::new()),
                prompt_state: Mutex::new(AppState::default()),
                tabs: Mutex::new(Vec::new()),
                args: Mutex::new(self.args.into()),
                abandoned: AtomicBool::new(false),
                scripts_from_cache: AtomicBool::new(true),
                background: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Kit {
    pub fn builder() -> KitBuilder {
        KitBuilder::default()
    }

    /// A kit speaking JSONL on stdin/stdout. Must be called inside a tokio runtime.
    pub fn stdio(settings: BridgeConfig, script_path: impl Into<String>, args: Vec<String>) -> Kit {
        let inbound = start_stdin_reader(settings.bus_capacity);
        let kit = Kit::builder()
            .settings(settings)
            .script_path(script_path)
            .args(args)
            .runner(Arc::new(CommandRunner::default()))
            .build();
        kit.bus().spawn_pump(inbound);
        kit
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn supervisor(&self) -> &PromptSupervisor {
        &self.inner.supervisor
    }

    pub fn settings(&self) -> &BridgeConfig {
        &self.inner.settings
    }

    pub fn script_path(&self) -> &str {
        &self.inner.script_path
    }

    // ---------------------------------------------------------------
    // Prompts
    // ---------------------------------------------------------------

    /// Show a prompt without waiting for it
    pub async fn start_prompt(&self, config: PromptConfig) -> Result<PromptSession> {
        PromptSession::start(self.clone(), config).await
    }

    /// Show a prompt and wait for its value
    pub async fn prompt(&self, config: PromptConfig) -> Result<PromptValue> {
        self.start_prompt(config).await?.resolve().await
    }

    /// `arg`-family prompts take a pre-supplied arg instead of asking when one
    /// is left and it validates; a failing one becomes the prompt's hint
    async fn base_prompt(&self, mut config: PromptConfig) -> Result<PromptValue> {
        if let Some(first) = self.take_arg() {
            let Some(validate) = config.validate.clone() else {
                return Ok(PromptValue::Value(Value::String(first)));
            };
            match validate(Value::String(first.clone())).await? {
                Validation::Valid => return Ok(PromptValue::Value(Value::String(first))),
                Validation::Invalid => config.hint = format!("{} is not valid", first),
                Validation::Message(message) => config.hint = message,
            }
        }
        self.prompt(config).await
    }

    pub async fn arg(&self, config: PromptConfig) -> Result<PromptValue> {
        self.base_prompt(config.ui(Ui::Arg)).await
    }

    /// Multi-select; resolves with the selected values
    pub async fn select(&self, config: PromptConfig) -> Result<Vec<Value>> {
        let mut preset = PromptConfig::new()
            .multiple(true)
            .enter("Select")
            .shortcut(
                Shortcut::new(format!("{}+a", cmd()), "Toggle All")
                    .bar("right")
                    .on_press(|ctx, _, _| async move {
                        ctx.kit().bus().signal(Channel::ToggleAllSelectedChoices)?;
                        Ok(())
                    }),
            )
            .shortcut(
                Shortcut::new(format!("{}+enter", cmd()), "Submit")
                    .bar("right")
                    .on_press(|ctx, _, state| async move {
                        ctx.submit(Value::Array(state.selected))?;
                        Ok(())
                    }),
            );
        preset = merge(preset, config);
        preset.multiple = true;
        match self.arg(preset).await?.into_value() {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }

    /// Arg prompt without header and footer
    pub async fn mini(&self, config: PromptConfig) -> Result<PromptValue> {
        self.arg(config.header_class_name("hidden").footer_class_name("hidden"))
            .await
    }

    /// Like `mini`, at the smallest input height
    pub async fn micro(&self, config: PromptConfig) -> Result<PromptValue> {
        self.arg(
            config
                .header_class_name("hidden")
                .footer_class_name("hidden")
                .class_name("micro"),
        )
        .await
    }

    /// Show HTML, optionally wrapped in a container with `container_class`
    pub async fn div(&self, html: &str, container_class: &str) -> Result<PromptValue> {
        let config = PromptConfig::new()
            .enter("Continue")
            .ui(Ui::Div)
            .choices(crate::choices::wrap_html(html, container_class));
        self.prompt(config).await
    }

    pub async fn editor(&self, value: &str) -> Result<String> {
        let config = PromptConfig::new()
            .ui(Ui::Editor)
            .ignore_blur(true)
            .input(value);
        Ok(self.prompt(config).await?.into_string())
    }

    pub async fn textarea(&self, value: &str) -> Result<String> {
        let config = PromptConfig::new()
            .ui(Ui::Textarea)
            .ignore_blur(true)
            .input(value);
        Ok(self.prompt(config).await?.into_string())
    }

    pub async fn drop(&self, placeholder: &str) -> Result<PromptValue> {
        let config = PromptConfig::new()
            .ui(Ui::Drop)
            .ignore_blur(true)
            .placeholder(placeholder);
        self.prompt(config).await
    }

    /// Resolves with the key combination the host captured
    pub async fn hotkey(&self, placeholder: &str) -> Result<Value> {
        let config = PromptConfig::new().ui(Ui::Hotkey).placeholder(placeholder);
        Ok(self.prompt(config).await?.into_value())
    }

    /// Resolves with the conversation once the user presses `cmd+enter`
    pub async fn chat(&self, config: PromptConfig) -> Result<Value> {
        let preset = PromptConfig::new()
            .ui(Ui::Chat)
            .ignore_blur(true)
            .shortcut(
                Shortcut::new(format!("{}+enter", cmd()), "Done")
                    .bar("right")
                    .on_press(|ctx, _, _| async move {
                        let messages = ctx
                            .send_wait(Channel::ChatGetMessages, None)
                            .await
                            .unwrap_or(Value::Array(Vec::new()));
                        ctx.submit(messages)?;
                        Ok(())
                    }),
            );
        let mut merged = merge(preset, config);
        merged.ui = Ui::Chat;
        merged.ignore_blur = true;
        Ok(self.prompt(merged).await?.into_value())
    }

    pub async fn chat_add_message(&self, text: &str) -> Option<Value> {
        let message = serde_json::json!({ "type": "text", "position": "left", "text": text });
        self.bus().send_wait(Channel::ChatAddMessage, Some(message)).await
    }

    pub async fn chat_push_token(&self, token: &str) -> Option<Value> {
        self.bus()
            .send_wait(Channel::ChatPushToken, Some(Value::String(token.to_string())))
            .await
    }

    /// Recorded audio, usually as bytes from a data URI
    pub async fn mic(&self) -> Result<PromptValue> {
        self.prompt(PromptConfig::new().ui(Ui::Mic).ignore_blur(true))
            .await
    }

    pub async fn webcam(&self) -> Result<PromptValue> {
        self.prompt(PromptConfig::new().ui(Ui::Webcam).ignore_blur(true))
            .await
    }

    /// Render `html` as a form; resolves with the form values
    pub async fn form(&self, html: &str) -> Result<Value> {
        let config = PromptConfig::new()
            .ui(Ui::Form)
            .enter("Submit")
            .panel(html);
        Ok(self.prompt(config).await?.into_value())
    }

    /// Generated form; resolves with values in field order
    pub async fn fields(&self, fields: Vec<Field>) -> Result<Vec<Value>> {
        let response = self.form(&fields_html(&fields)).await?;
        match response.get("orderedValues") {
            Some(Value::Array(values)) => Ok(values.clone()),
            _ => Ok(Vec::new()),
        }
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    /// Submit on the user's behalf: tell the host and resolve the current
    /// prompt through the normal submit path
    pub fn submit(&self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.bus().send(Channel::ValueSubmitted, value.clone())?;
        let mut state = self.prompt_state();
        state.value = Some(value);
        self.bus()
            .inject(AppMessage::with_state(Channel::ValueSubmitted, state));
        Ok(())
    }

    pub fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.bus().send(Channel::SetInput, Value::String(text.into()))
    }

    pub fn set_panel(&self, html: impl Into<String>) -> Result<()> {
        self.bus().send(Channel::SetPanel, Value::String(html.into()))
    }

    pub fn set_preview(&self, html: impl Into<String>) -> Result<()> {
        self.bus().send(Channel::SetPreview, Value::String(html.into()))
    }

    pub fn set_hint(&self, text: impl Into<String>) -> Result<()> {
        self.bus().send(Channel::SetHint, Value::String(text.into()))
    }

    pub fn set_footer(&self, text: impl Into<String>) -> Result<()> {
        self.bus().send(Channel::SetFooter, Value::String(text.into()))
    }

    pub fn set_ignore_blur(&self, ignore: bool) -> Result<()> {
        self.bus().send(Channel::SetIgnoreBlur, Value::Bool(ignore))
    }

    /// Host-side state; falls back to the last state seen when the host is silent
    pub async fn get_app_state(&self) -> AppState {
        match self.bus().send_wait(Channel::GetAppState, None).await {
            Some(reply) => parse_state_reply(reply).unwrap_or_else(|| self.prompt_state()),
            None => {
                warn!("GET_APP_STATE timed out");
                self.prompt_state()
            }
        }
    }

    pub async fn get_input(&self) -> String {
        match self.bus().send_wait(Channel::GetInput, None).await {
            Some(Value::String(input)) => input,
            Some(reply) => parse_state_reply(reply)
                .map(|s| s.input)
                .unwrap_or_else(|| self.prompt_state().input),
            None => self.prompt_state().input,
        }
    }

    pub async fn get_bounds(&self) -> Option<Value> {
        self.bus().send_wait(Channel::GetBounds, None).await
    }

    /// Go back to the main menu with `input` typed in
    #[instrument(skip(self))]
    pub async fn main_script(&self, input: &str) -> Result<()> {
        self.inner.args.lock().clear();
        self.inner.flags.lock().clear();
        self.set_input(input)?;

        let Some(runner) = self.inner.runner.clone() else {
            debug!("No process runner; main script not launched");
            return Ok(());
        };
        let main: PathBuf = self.settings().kit_path().join("main").join("index.js");
        runner
            .run(&main, &["--input".to_string(), input.to_string()])
            .await
    }

    pub fn terminate(&self, reason: &str) {
        self.inner.terminator.terminate(reason);
    }

    // ---------------------------------------------------------------
    // Script-wide state
    // ---------------------------------------------------------------

    /// Flags set by submits and shortcuts so far
    pub fn flags(&self) -> BTreeMap<String, Value> {
        self.inner.flags.lock().clone()
    }

    /// The flag the last submit or shortcut carried
    pub fn action_flag(&self) -> String {
        self.inner.action_flag.lock().clone()
    }

    pub fn abandoned(&self) -> bool {
        self.inner.abandoned.load(Ordering::SeqCst)
    }

    /// False once the host reported that scripts changed on disk
    pub fn scripts_from_cache(&self) -> bool {
        self.inner.scripts_from_cache.load(Ordering::SeqCst)
    }

    /// Wait for tab bodies started by tab switches
    pub async fn join_background(&self) {
        loop {
            let handles: Vec<_> = std::mem::take(&mut *self.inner.background.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task failed");
                }
            }
        }
    }

    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut background = self.inner.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(tokio::spawn(task));
    }

    pub(crate) fn take_arg(&self) -> Option<String> {
        self.inner.args.lock().pop_front()
    }

    pub(crate) fn record_flag(&self, flag: &str) {
        self.inner
            .flags
            .lock()
            .insert(flag.to_string(), Value::Bool(true));
        *self.inner.action_flag.lock() = flag.to_string();
    }

    pub(crate) fn reset_prompt_state(&self, input: &str) {
        self.inner.action_flag.lock().clear();
        *self.inner.prompt_state.lock() = AppState::with_input(input);
    }

    pub(crate) fn set_prompt_state(&self, state: AppState) {
        *self.inner.prompt_state.lock() = state;
    }

    pub(crate) fn prompt_state(&self) -> AppState {
        self.inner.prompt_state.lock().clone()
    }

    pub(crate) fn mark_abandoned(&self) {
        self.inner.abandoned.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_scripts_changed(&self) {
        self.inner.scripts_from_cache.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_tabs(&self, tabs: Vec<Tab>) {
        *self.inner.tabs.lock() = tabs;
    }

    pub(crate) fn tab_names(&self) -> Vec<String> {
        self.inner.tabs.lock().iter().map(|t| t.name.clone()).collect()
    }

    pub(crate) fn find_tab(&self, name: &str) -> Option<(usize, Tab)> {
        self.inner
            .tabs
            .lock()
            .iter()
            .enumerate()
            .find(|(_, t)| t.name == name)
            .map(|(i, t)| (i, t.clone()))
    }
}

/// Replies carry the state either as the value or inside the echoed envelope
fn parse_state_reply(reply: Value) -> Option<AppState> {
    let state = match reply {
        Value::Object(mut map) if map.contains_key("state") => map.remove("state")?,
        other => other,
    };
    match serde_json::from_value(state) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(error = %e, "Unreadable app state reply");
            None
        }
    }
}

/// Overlay a caller's config on a preset: caller fields win where set,
/// shortcuts and hooks are combined
fn merge(preset: PromptConfig, config: PromptConfig) -> PromptConfig {
    let mut merged = config;
    let mut shortcuts = preset.shortcuts;
    shortcuts.retain(|s| !merged.shortcuts.iter().any(|m| m.key == s.key));
    shortcuts.append(&mut merged.shortcuts);
    merged.shortcuts = shortcuts;
    for (channel, hook) in preset.hooks {
        merged.hooks.entry(channel).or_insert(hook);
    }
    if merged.enter.is_empty() {
        merged.enter = preset.enter;
    }
    merged.multiple |= preset.multiple;
    merged.ignore_blur |= preset.ignore_blur;
    merged
}
