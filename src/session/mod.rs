//! Prompt sessions
//!
//! One `PromptSession` per prompt invocation. It owns the prompt's config,
//! its choice resolver and a bus subscription, dispatches inbound events to
//! handlers, and resolves with the submitted value (or an error when the
//! transport fails, a handler fails, the script is terminated, or a newer
//! prompt takes over).
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Initializing -> AwaitingInput <-> Resolving -> Settled
//! ```
//!
//! - `Initializing`: previous prompt ended, subscription attached,
//!   SET_PROMPT_DATA and initial choices sent
//! - `AwaitingInput`: events are dispatched; handlers run as spawned tasks
//! - `Resolving`: a submitted value passed the submit hook and validation
//! - `Settled`: subscription dropped, pending debounced work cancelled
//!
//! After a TAB_CHANGED the session only watches for further tab changes
//! until the tab's prompt supersedes it.

mod config;
mod context;
mod handlers;
mod submit;

pub use config::{flags_from_actions, Action, PromptConfig, Shortcut, Tab};
pub use context::PromptContext;
pub use handlers::FAILED_PREVIEW_HTML;
pub use submit::{decode_data_uri, PromptValue, SubmitOutcome, Validation};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use crate::bus::{BusEvent, Subscription};
use crate::choices::{ChoiceResolver, ChoiceSource, Debouncer, Resolution};
use crate::error::{KitError, Result};
use crate::hooks::{EventHook, HookFuture};
use crate::kit::Kit;
use crate::logging;
use crate::protocol::{AppMessage, AppState, Channel};
use crate::supervisor::SessionTicket;
use handlers::Handlers;

/// Where a session is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    AwaitingInput,
    Resolving,
    Settled,
}

/// State shared between the session and the handler tasks it spawns
pub(crate) struct SessionShared {
    pub(crate) ticket: SessionTicket,
    pub(crate) resolver: ChoiceResolver,
    pub(crate) config: PromptConfig,
    pub(crate) handlers: Handlers,
    /// Actions currently in the menu
    pub(crate) actions: Mutex<Vec<Action>>,
    pub(crate) input_debouncer: Debouncer,
    /// Separate from input so a FLAG_INPUT never cancels a pending list refresh
    pub(crate) flag_input_debouncer: Debouncer,
    pub(crate) focus_debouncer: Debouncer,
    faults: mpsc::UnboundedSender<anyhow::Error>,
    settled: AtomicBool,
}

impl SessionShared {
    pub(crate) fn is_live(&self) -> bool {
        !self.settled.load(Ordering::SeqCst) && self.ticket.is_current()
    }

    pub(crate) fn report(&self, error: anyhow::Error) {
        if let Err(mpsc::error::SendError(error)) = self.faults.send(error) {
            debug!(
                prompt_id = self.ticket.prompt_id(),
                error = %error,
                "Handler failed after its prompt settled"
            );
        }
    }

    pub(crate) fn spawn_hook(
        &self,
        ctx: &PromptContext,
        hook: EventHook,
        input: String,
        state: AppState,
    ) {
        self.spawn_task(hook(ctx.clone(), input, state));
    }

    /// Run a handler future; its error (or panic) fails the prompt
    pub(crate) fn spawn_task(&self, task: HookFuture<()>) {
        let faults = self.faults.clone();
        tokio::spawn(async move {
            let error = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(_) => anyhow::anyhow!("prompt handler panicked"),
            };
            if let Err(mpsc::error::SendError(error)) = faults.send(error) {
                debug!(error = %error, "Handler failed after its prompt settled");
            }
        });
    }

    fn settle(&self) {
        self.settled.store(true, Ordering::SeqCst);
        self.input_debouncer.cancel();
        self.flag_input_debouncer.cancel();
        self.focus_debouncer.cancel();
    }
}

/// Recover the typed error a handler raised, if it raised one
fn into_kit_error(error: anyhow::Error) -> KitError {
    match error.downcast::<KitError>() {
        Ok(kit_error) => kit_error,
        Err(other) => KitError::Handler(other),
    }
}

/// A single prompt invocation
pub struct PromptSession {
    kit: Kit,
    shared: Arc<SessionShared>,
    subscription: Subscription,
    faults: mpsc::UnboundedReceiver<anyhow::Error>,
    state: SessionState,
    tabbed: bool,
}

impl PromptSession {
    /// End whatever prompt is active, then show this one.
    ///
    /// The subscription is attached right after the previous prompt is told
    /// to end, before anything is sent to the host, so no reply to this
    /// prompt can be missed.
    #[instrument(name = "prompt_start", skip_all)]
    pub(crate) async fn start(kit: Kit, mut config: PromptConfig) -> Result<Self> {
        let mut state = SessionState::Idle;
        config.normalize();
        if let Some(tabs) = config.tabs.take() {
            kit.set_tabs(tabs);
        }

        let ticket = kit.supervisor().begin();
        let subscription = kit.bus().subscribe();
        state = advance(ticket.prompt_id(), state, SessionState::Initializing);

        kit.reset_prompt_state(&config.input);

        let settings = kit.settings();
        let input_interval = config.debounce_input.unwrap_or_else(|| settings.debounce_input());
        let focus_interval = config
            .debounce_choice_focus
            .unwrap_or_else(|| settings.debounce_choice_focus());

        let source = if config.ui.shows_choices() {
            config.choices.clone()
        } else {
            ChoiceSource::None
        };
        let resolver = ChoiceResolver::new(
            kit.bus().clone(),
            kit.supervisor().clone(),
            source,
            config.class_name.clone(),
            config.effective_input_regex(),
        )
        .with_initial_choices(config.initial_choices.clone());

        let prompt_data = config.to_prompt_data(
            format!("{}-{}", kit.script_path(), ticket.prompt_id()),
            kit.script_path().to_string(),
            kit.tab_names(),
            kit.supervisor().tab_index(),
            settings.preview_width_percent(),
        );

        let (faults_tx, faults_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared {
            handlers: Handlers::new(&config),
            actions: Mutex::new(config.actions.clone()),
            input_debouncer: Debouncer::new(input_interval),
            flag_input_debouncer: Debouncer::new(input_interval),
            focus_debouncer: Debouncer::new(focus_interval),
            ticket,
            resolver,
            config,
            faults: faults_tx,
            settled: AtomicBool::new(false),
        });

        kit.bus()
            .send(Channel::SetPromptData, serde_json::to_value(&prompt_data)?)?;

        let session = PromptSession {
            kit,
            shared,
            subscription,
            faults: faults_rx,
            state,
            tabbed: false,
        };
        session.show_initial_choices().await?;

        let mut session = session;
        session.state = advance(
            session.prompt_id(),
            session.state,
            SessionState::AwaitingInput,
        );
        Ok(session)
    }

    pub fn prompt_id(&self) -> u64 {
        self.shared.ticket.prompt_id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn context(&self) -> PromptContext {
        PromptContext::new(self.kit.clone(), self.shared.clone())
    }

    /// Static lists go out right away; functions run in the background
    async fn show_initial_choices(&self) -> Result<()> {
        let ctx = self.context();
        let input = self.shared.config.input.clone();

        let is_function = matches!(
            self.shared.resolver.source(),
            ChoiceSource::Constant { .. } | ChoiceSource::Generator { .. }
        );
        if !is_function {
            if let Resolution::NoChoices = self.shared.resolver.initial(&input).await? {
                ctx.dispatch(Channel::NoChoices, input.clone(), AppState::with_input(input));
            }
            return Ok(());
        }

        self.shared.spawn_task(
            async move {
                if let Resolution::NoChoices = ctx.resolver().initial(&input).await? {
                    ctx.dispatch(Channel::NoChoices, input.clone(), AppState::with_input(input));
                }
                Ok(())
            }
            .boxed(),
        );
        Ok(())
    }

    /// Wait for the prompt to settle
    pub async fn resolve(mut self) -> Result<PromptValue> {
        let prompt_id = self.prompt_id();
        let result = self.await_value().await;

        self.shared.settle();
        self.state = advance(prompt_id, self.state, SessionState::Settled);
        match &result {
            Ok(_) => {
                logging::log_prompt_event(prompt_id, "resolved", None);
                crate::error_prompt::install_error_listeners(&self.kit);
            }
            Err(e) if e.is_control_flow() => {
                logging::log_prompt_event(prompt_id, "ended", Some(&e.to_string()));
            }
            Err(e) => {
                let context = format!("prompt {}", prompt_id);
                logging::log_error("prompt", &e.to_string(), Some(&context));
            }
        }
        result
    }

    async fn await_value(&mut self) -> Result<PromptValue> {
        let prompt_id = self.prompt_id();
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shared.ticket.ended() => {
                    return Err(KitError::Superseded { prompt_id });
                }
                Some(fault) = self.faults.recv() => return Err(into_kit_error(fault)),
                event = self.subscription.recv() => event,
            };

            let msg = match event {
                None | Some(BusEvent::Closed) => {
                    return Err(KitError::Transport("process channel closed".to_string()))
                }
                Some(BusEvent::Failed(error)) => return Err(KitError::Transport(error)),
                Some(BusEvent::Message(msg)) => msg,
            };

            if !self.shared.ticket.is_current() {
                return Err(KitError::Superseded { prompt_id });
            }

            if msg.channel == Channel::TabChanged {
                self.change_tab(msg.state_or_default());
                continue;
            }
            if self.tabbed {
                trace!(channel = %msg.channel, "Tab switched; ignoring event");
                continue;
            }

            if let Some(value) = self.dispatch(msg).await? {
                return Ok(value);
            }
        }
    }

    async fn dispatch(&mut self, msg: AppMessage) -> Result<Option<PromptValue>> {
        let mut state = msg.state.clone().unwrap_or_default();
        if state.value.is_none() {
            state.value = msg.value.clone();
        }
        if msg.state.is_some() {
            self.kit.set_prompt_state(state.clone());
        }

        let ctx = self.context();
        let input = state.input.clone();

        match &msg.channel {
            Channel::ValueSubmitted => return self.submit_value(&ctx, state).await,
            Channel::Ping => self.kit.bus().signal(Channel::Pong)?,
            Channel::OnSubmit => {
                if let Some(hook) = self.shared.config.on_submit.clone() {
                    let fut = hook(ctx.clone(), input, state);
                    self.shared.spawn_task(async move { fut.await.map(|_| ()) }.boxed());
                }
            }
            Channel::Action => self.run_action(&ctx, state),
            Channel::Shortcut => self.run_shortcut(&ctx, state)?,
            Channel::ScriptsChanged => self.kit.mark_scripts_changed(),
            Channel::Other(name) => debug!(channel = %name, "Ignoring unknown channel"),
            channel => {
                if *channel == Channel::Abandon {
                    self.kit.mark_abandoned();
                }
                match self.shared.handlers.get(channel) {
                    Some(hook) => self.shared.spawn_hook(&ctx, hook, input, state),
                    None => trace!(channel = %channel, "No handler"),
                }
            }
        }
        Ok(None)
    }

    async fn submit_value(
        &mut self,
        ctx: &PromptContext,
        state: AppState,
    ) -> Result<Option<PromptValue>> {
        if let Some(flag) = &state.flag {
            self.kit.record_flag(flag);
        }

        match submit::evaluate(ctx, state).await? {
            SubmitOutcome::Accept(value) => {
                self.state = advance(self.prompt_id(), self.state, SessionState::Resolving);
                Ok(Some(PromptValue::from_submitted(value)))
            }
            SubmitOutcome::Reject(message) => {
                debug!(prompt_id = self.prompt_id(), %message, "Submit rejected");
                self.kit.bus().send(Channel::ValueInvalid, Value::String(message))?;
                Ok(None)
            }
            SubmitOutcome::Prevent => {
                self.kit.bus().signal(Channel::PreventSubmit)?;
                Ok(None)
            }
        }
    }

    fn run_action(&self, ctx: &PromptContext, state: AppState) {
        let Some(name) = state.action.as_ref().map(|a| a.name.clone()) else {
            warn!(prompt_id = self.prompt_id(), "ACTION without an action name");
            return;
        };
        let found = handlers::find_action(ctx, &name);
        let hook = match &found {
            Some(Action {
                on_action: Some(hook),
                ..
            }) => Some(hook.clone()),
            // the focused choice's own handler covers actions the menu doesn't claim
            _ => state
                .focused_id()
                .and_then(|id| ctx.find_choice(id))
                .and_then(|choice| choice.on_action),
        };
        match (hook, found) {
            (Some(hook), _) => self.shared.spawn_hook(ctx, hook, state.input.clone(), state),
            (None, Some(_)) => debug!(action = %name, "Action has no handler"),
            (None, None) => warn!(action = %name, "Unknown action"),
        }
    }

    fn run_shortcut(&self, ctx: &PromptContext, state: AppState) -> Result<()> {
        if let Some(flag) = &state.flag {
            self.kit.record_flag(flag);
        }
        let key = state.shortcut.clone().unwrap_or_default();

        let shortcut = self.shared.config.shortcuts.iter().find(|s| s.key == key);
        if let Some(shortcut) = shortcut {
            match &shortcut.on_press {
                Some(hook) => {
                    self.shared
                        .spawn_hook(ctx, hook.clone(), state.input.clone(), state.clone())
                }
                None => ctx.submit(
                    shortcut
                        .value
                        .clone()
                        .unwrap_or_else(|| Value::String(shortcut.name.clone())),
                )?,
            }
        } else {
            let bound = self
                .shared
                .actions
                .lock()
                .iter()
                .find(|a| a.shortcut.as_deref() == Some(key.as_str()))
                .and_then(|a| a.on_action.clone());
            if let Some(hook) = bound {
                self.shared
                    .spawn_hook(ctx, hook, state.input.clone(), state.clone());
            }
        }

        if key == "enter" {
            let value = if state.multiple {
                Value::Array(state.selected.clone())
            } else {
                match state.focused_value() {
                    Some(value) if !value.is_null() => value.clone(),
                    _ => Value::String(state.input.clone()),
                }
            };
            ctx.submit(value)?;
        }
        Ok(())
    }

    fn change_tab(&mut self, state: AppState) {
        self.tabbed = true;
        let name = state.tab.clone().unwrap_or_default();
        let Some((index, tab)) = self.kit.find_tab(&name) else {
            warn!(prompt_id = self.prompt_id(), tab = %name, "TAB_CHANGED to unknown tab");
            return;
        };

        self.kit.supervisor().set_tab_index(index);
        logging::log_prompt_event(self.prompt_id(), "tab_changed", Some(&name));

        let shared = self.shared.clone();
        let body = (tab.body)(self.kit.clone(), state.input);
        self.kit.spawn_background(async move {
            match body.await {
                Ok(()) => {}
                Err(e) => match e.downcast_ref::<KitError>() {
                    Some(kit_error) if kit_error.is_control_flow() => {
                        debug!(tab = %name, error = %kit_error, "Tab prompt ended");
                    }
                    _ => shared.report(e),
                },
            }
        });
    }
}

impl Drop for PromptSession {
    fn drop(&mut self) {
        self.shared.settle();
    }
}

fn advance(prompt_id: u64, from: SessionState, to: SessionState) -> SessionState {
    if from != to {
        info!(prompt_id, from = ?from, to = ?to, "Prompt state");
    }
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::{Kit, RecordingTerminator};
    use crate::transport::{memory_pair, MemoryHost};
    use crate::choices::Choice;
    use serde_json::json;
    use std::time::Duration;

    fn kit() -> (Kit, MemoryHost, RecordingTerminator) {
        let (transport, host, inbound) = memory_pair(64);
        let terminator = RecordingTerminator::new();
        let kit = Kit::builder()
            .transport(Arc::new(transport))
            .terminator(Arc::new(terminator.clone()))
            .script_path("/scripts/test.ts")
            .build();
        kit.bus().spawn_pump(inbound);
        (kit, host, terminator)
    }

    fn submitted(value: Value) -> AppMessage {
        AppMessage::with_state(
            Channel::ValueSubmitted,
            AppState {
                value: Some(value),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_prompt_data_precedes_choices() {
        let (kit, host, _) = kit();
        let session = kit
            .start_prompt(PromptConfig::new().placeholder("Pick").choices(vec!["a", "b"]))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::AwaitingInput);

        let channels: Vec<Channel> = host.sent().into_iter().map(|m| m.channel).collect();
        assert_eq!(channels, vec![Channel::SetPromptData, Channel::SetChoices]);

        let data = host.sent_on(&Channel::SetPromptData).pop().unwrap();
        let value = data.value.unwrap();
        assert_eq!(value["id"], format!("/scripts/test.ts-{}", session.prompt_id()));
        assert_eq!(value["placeholder"], "Pick");
    }

    #[tokio::test]
    async fn test_submitted_value_resolves() {
        let (kit, host, _) = kit();
        let session = kit.start_prompt(PromptConfig::new()).await.unwrap();
        host.emit(submitted(json!("hello"))).await;
        assert_eq!(session.resolve().await.unwrap().as_str(), Some("hello"));
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let (kit, host, _) = kit();
        let session = kit.start_prompt(PromptConfig::new()).await.unwrap();
        host.emit(AppMessage::new(Channel::Ping)).await;
        assert!(host.wait_for(Channel::Pong).await.is_some());
        drop(session);
    }

    #[tokio::test]
    async fn test_failed_validation_keeps_prompt_open() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new()
            .validate(|value: Value| async move { Ok(value.as_str().map_or(0, str::len) >= 3) });
        let session = kit.start_prompt(config).await.unwrap();

        host.emit(submitted(json!("ab"))).await;
        let invalid = host.wait_for(Channel::ValueInvalid).await.unwrap();
        assert_eq!(invalid.value, Some(json!("ab is not valid")));

        host.emit(submitted(json!("abc"))).await;
        assert_eq!(session.resolve().await.unwrap().as_str(), Some("abc"));
    }

    #[tokio::test]
    async fn test_submit_hook_can_prevent() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new().on_submit(|_, input, state| async move {
            Ok(if input == "go" {
                SubmitOutcome::proceed(&state)
            } else {
                SubmitOutcome::Prevent
            })
        });
        let session = kit.start_prompt(config).await.unwrap();

        host.emit(AppMessage::with_state(
            Channel::ValueSubmitted,
            AppState {
                input: "wait".into(),
                value: Some(json!(1)),
                ..Default::default()
            },
        ))
        .await;
        assert!(host.wait_for(Channel::PreventSubmit).await.is_some());

        host.emit(AppMessage::with_state(
            Channel::ValueSubmitted,
            AppState {
                input: "go".into(),
                value: Some(json!(2)),
                ..Default::default()
            },
        ))
        .await;
        assert_eq!(
            session.resolve().await.unwrap().as_value(),
            Some(&json!(2))
        );
    }

    #[tokio::test]
    async fn test_escape_default_terminates() {
        let (kit, host, terminator) = kit();
        let session = kit.start_prompt(PromptConfig::new()).await.unwrap();
        host.emit_state(Channel::Escape, AppState::default()).await;

        let err = session.resolve().await.unwrap_err();
        assert!(matches!(err, KitError::Terminated { ref reason } if reason == "escape"));
        assert_eq!(terminator.reasons(), vec!["escape"]);
        assert_eq!(host.sent_on(&Channel::BeforeExit).len(), 1);
    }

    #[tokio::test]
    async fn test_blur_ignored_when_requested() {
        let (kit, host, terminator) = kit();
        let session = kit
            .start_prompt(PromptConfig::new().ignore_blur(true))
            .await
            .unwrap();
        host.emit_state(Channel::Blur, AppState::default()).await;
        host.emit(submitted(json!("still here"))).await;

        assert_eq!(session.resolve().await.unwrap().as_str(), Some("still here"));
        assert!(terminator.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_fails_prompt() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new()
            .on_init(|_, _, _| async { Err(anyhow::anyhow!("init exploded")) });
        let session = kit.start_prompt(config).await.unwrap();
        host.emit_state(Channel::OnInit, AppState::default()).await;

        let err = session.resolve().await.unwrap_err();
        assert!(matches!(err, KitError::Handler(_)));
        assert!(err.to_string().contains("init exploded"));
    }

    #[tokio::test]
    async fn test_transport_failure_fails_prompt() {
        let (kit, host, _) = kit();
        let session = kit.start_prompt(PromptConfig::new()).await.unwrap();
        host.fail("pipe broke").await;
        let err = session.resolve().await.unwrap_err();
        assert!(matches!(err, KitError::Transport(ref msg) if msg == "pipe broke"));
    }

    #[tokio::test]
    async fn test_shortcut_without_handler_submits_its_value() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new()
            .shortcut(Shortcut::new("cmd+o", "Open").value("opened"));
        let session = kit.start_prompt(config).await.unwrap();

        host.emit_state(
            Channel::Shortcut,
            AppState {
                shortcut: Some("cmd+o".into()),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(session.resolve().await.unwrap().as_str(), Some("opened"));
        assert_eq!(host.sent_on(&Channel::ValueSubmitted).len(), 1);
    }

    #[tokio::test]
    async fn test_enter_shortcut_submits_selection_for_multiple() {
        let (kit, host, _) = kit();
        let session = kit
            .start_prompt(PromptConfig::new().multiple(true).choices(vec!["a", "b", "c"]))
            .await
            .unwrap();

        host.emit_state(
            Channel::Shortcut,
            AppState {
                shortcut: Some("enter".into()),
                multiple: true,
                selected: vec![json!("a"), json!("c")],
                ..Default::default()
            },
        )
        .await;
        assert_eq!(
            session.resolve().await.unwrap().as_value(),
            Some(&json!(["a", "c"]))
        );
    }

    #[tokio::test]
    async fn test_action_runs_its_handler() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new().action(Action::new("Copy").on_action(
            |ctx, _, _| async move {
                ctx.submit("copied")?;
                Ok(())
            },
        ));
        let session = kit.start_prompt(config).await.unwrap();

        host.emit_state(
            Channel::Action,
            AppState {
                action: Some(crate::protocol::ActionRef {
                    name: "Copy".into(),
                }),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(session.resolve().await.unwrap().as_str(), Some("copied"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_reruns_after_input_debounce() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new()
            .choices(ChoiceSource::generator_sync(|input: String| {
                Ok(vec![format!("{input}!")])
            }))
            .debounce_input(Duration::from_millis(200));
        let session = kit.start_prompt(config).await.unwrap();
        host.wait_for(Channel::SetChoices).await;

        let pending = tokio::spawn(session.resolve());
        for input in ["h", "he", "hey"] {
            host.emit_state(Channel::Input, AppState::with_input(input)).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let lists: Vec<String> = host
            .sent_on(&Channel::SetChoices)
            .into_iter()
            .filter_map(|m| {
                let payload: crate::protocol::ChoicesPayload =
                    serde_json::from_value(m.value?).ok()?;
                payload.choices?.first().map(|c| c.name.clone())
            })
            .collect();
        assert_eq!(lists.last().map(String::as_str), Some("hey!"));
        assert!(!lists.iter().any(|n| n == "h!" || n == "he!"));

        host.emit(submitted(json!("hey!"))).await;
        assert_eq!(pending.await.unwrap().unwrap().as_str(), Some("hey!"));
    }

    #[tokio::test]
    async fn test_newer_prompt_supersedes() {
        let (kit, host, _) = kit();
        let first = kit.start_prompt(PromptConfig::new()).await.unwrap();
        let first_id = first.prompt_id();
        let first = tokio::spawn(first.resolve());

        let second = kit.start_prompt(PromptConfig::new()).await.unwrap();
        let err = first.await.unwrap().unwrap_err();
        assert!(matches!(err, KitError::Superseded { prompt_id } if prompt_id == first_id));

        host.emit(submitted(json!("second"))).await;
        assert_eq!(second.resolve().await.unwrap().as_str(), Some("second"));
    }

    #[tokio::test]
    async fn test_settled_session_detaches_from_bus() {
        let (kit, host, _) = kit();
        let session = kit.start_prompt(PromptConfig::new()).await.unwrap();
        assert_eq!(kit.bus().subscriber_count(), 1);
        host.emit(submitted(json!(1))).await;
        session.resolve().await.unwrap();
        assert_eq!(kit.bus().subscriber_count(), 0);
    }

    fn focused_on(id: &str) -> AppState {
        AppState {
            focused: Some(crate::protocol::FocusedChoice {
                id: Some(id.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flag_input_keeps_pending_choice_refresh() {
        let (kit, host, _) = kit();
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let config = PromptConfig::new()
            .choices(ChoiceSource::generator_sync({
                let calls = calls.clone();
                move |input: String| {
                    calls.lock().push(input.clone());
                    Ok(vec![input])
                }
            }))
            .dynamic_actions(|input: String, _| async move {
                Ok(vec![Action::new(format!("Act on {input}"))])
            })
            .debounce_input(Duration::from_millis(200));
        let session = kit.start_prompt(config).await.unwrap();
        let pending = tokio::spawn(session.resolve());

        host.emit_state(Channel::Input, AppState::with_input("abc")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        host.emit_state(Channel::FlagInput, AppState::with_input("x")).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let typed: Vec<String> = calls.lock().iter().filter(|c| !c.is_empty()).cloned().collect();
        assert_eq!(typed, vec!["abc".to_string()]);
        let flags = host.sent_on(&Channel::SetFlags).pop().unwrap().value.unwrap();
        assert!(flags.get("Act on x").is_some());

        host.emit(submitted(json!("abc"))).await;
        pending.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_hook_cannot_submit_for_newer_prompt() {
        let (kit, host, _) = kit();
        let stale_current: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
        let first = kit
            .start_prompt(PromptConfig::new().on_init({
                let stale_current = stale_current.clone();
                move |ctx, _, _| {
                    let stale_current = stale_current.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        *stale_current.lock() = Some(ctx.is_current());
                        ctx.submit("from first")?;
                        ctx.set_hint("from first")?;
                        Ok(())
                    }
                }
            }))
            .await
            .unwrap();
        let first = tokio::spawn(first.resolve());
        host.emit_state(Channel::OnInit, AppState::default()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = kit.start_prompt(PromptConfig::new()).await.unwrap();
        let second = tokio::spawn(second.resolve());
        assert!(matches!(
            first.await.unwrap().unwrap_err(),
            KitError::Superseded { .. }
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*stale_current.lock(), Some(false));
        assert!(host.sent_on(&Channel::ValueSubmitted).is_empty());
        assert!(host.sent_on(&Channel::SetHint).is_empty());
        assert!(!second.is_finished());

        host.emit(submitted(json!("second"))).await;
        assert_eq!(second.await.unwrap().unwrap().as_str(), Some("second"));
    }

    #[tokio::test]
    async fn test_action_falls_back_to_focused_choice_handler() {
        let (kit, host, _) = kit();
        let choices = vec![
            Choice::new("a", 1).on_action(|ctx, _, _| async move {
                ctx.submit("acted on a")?;
                Ok(())
            }),
            Choice::new("b", 2),
        ];
        let session = kit
            .start_prompt(PromptConfig::new().choices(choices))
            .await
            .unwrap();

        let mut state = focused_on("choice:0:a");
        state.action = Some(crate::protocol::ActionRef {
            name: "Open".into(),
        });
        host.emit_state(Channel::Action, state).await;
        assert_eq!(session.resolve().await.unwrap().as_str(), Some("acted on a"));
    }

    #[tokio::test]
    async fn test_menu_actions_are_found_as_choices() {
        let (kit, host, _) = kit();
        let config = PromptConfig::new()
            .action(Action::new("Copy").value("copied"))
            .on_init(|ctx, _, _| async move {
                let value = ctx.find_choice("Copy").map(|c| c.value);
                ctx.submit(value.unwrap_or(Value::Null))?;
                Ok(())
            });
        let session = kit.start_prompt(config).await.unwrap();
        host.emit_state(Channel::OnInit, AppState::default()).await;
        assert_eq!(session.resolve().await.unwrap().as_str(), Some("copied"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_choice_focus_runs_preview_hook_and_filters() {
        let (kit, host, _) = kit();
        let focused: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let choices = vec![
            Choice::new("good", 1)
                .preview(|_, _, _| async { Ok("<p>good</p>".to_string()) })
                .on_focus({
                    let focused = focused.clone();
                    move |_, _, _| {
                        let focused = focused.clone();
                        async move {
                            focused.lock().push("good".into());
                            Ok(())
                        }
                    }
                }),
            Choice::new("bad", 2).preview(|_, _, _| async { Err(anyhow::anyhow!("no preview")) }),
        ];
        fn editable(focused: Option<&crate::protocol::FocusedChoice>) -> bool {
            focused.and_then(|f| f.id.as_deref()) == Some("choice:1:bad")
        }
        let config = PromptConfig::new()
            .choices(choices)
            .shortcut(Shortcut::new("cmd+e", "Edit").condition(editable))
            .shortcut(Shortcut::new("cmd+o", "Open"))
            .action(Action::new("Fix").condition(editable))
            .action(Action::new("Share"))
            .on_choice_focus({
                let focused = focused.clone();
                move |_, _, _| {
                    let focused = focused.clone();
                    async move {
                        focused.lock().push("user".into());
                        Ok(())
                    }
                }
            })
            .debounce_choice_focus(Duration::from_millis(20));
        let session = kit.start_prompt(config).await.unwrap();
        let pending = tokio::spawn(session.resolve());

        host.emit_state(Channel::ChoiceFocused, focused_on("choice:0:good"))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*focused.lock(), vec!["good".to_string(), "user".to_string()]);
        let preview = host.sent_on(&Channel::SetPreview).pop().unwrap();
        assert_eq!(preview.value, Some(json!("<p>good</p>")));
        let shortcuts = host.sent_on(&Channel::SetShortcuts).pop().unwrap().value.unwrap();
        let keys: Vec<&str> = shortcuts
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["key"].as_str())
            .collect();
        assert_eq!(keys, vec!["cmd+o"]);
        let flags = host.sent_on(&Channel::SetFlags).pop().unwrap().value.unwrap();
        assert!(flags.get("Fix").is_none());
        assert!(flags.get("Share").is_some());

        host.emit_state(Channel::ChoiceFocused, focused_on("choice:1:bad"))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let preview = host.sent_on(&Channel::SetPreview).pop().unwrap();
        assert_eq!(preview.value, Some(json!(FAILED_PREVIEW_HTML)));
        let flags = host.sent_on(&Channel::SetFlags).pop().unwrap().value.unwrap();
        assert!(flags.get("Fix").is_some());
        assert!(!pending.is_finished());

        host.emit(submitted(json!(1))).await;
        pending.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_generator_result_dispatches_no_choices() {
        let (kit, host, _) = kit();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let config = PromptConfig::new()
            .input("zz")
            .choices(ChoiceSource::generator_sync(|_input: String| {
                Ok(Vec::<Choice>::new())
            }))
            .on_no_choices({
                let seen = seen.clone();
                move |_, input, _| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().push(input);
                        Ok(())
                    }
                }
            });
        let session = kit.start_prompt(config).await.unwrap();
        let pending = tokio::spawn(session.resolve());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*seen.lock(), vec!["zz".to_string()]);
        host.emit(submitted(json!("zz"))).await;
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_abandon_marks_kit_abandoned() {
        let (kit, host, terminator) = kit();
        let session = kit.start_prompt(PromptConfig::new()).await.unwrap();
        assert!(!kit.abandoned());

        host.emit_state(Channel::Abandon, AppState::default()).await;
        let err = session.resolve().await.unwrap_err();
        assert!(matches!(err, KitError::Terminated { ref reason } if reason == "abandon"));
        assert!(kit.abandoned());
        assert_eq!(terminator.reasons(), vec!["abandon"]);
    }
}
