use serde_json::Value;
use tracing::debug;

use super::{Action, PromptConfig, SessionShared};
use crate::choices::{Choice, ChoiceResolver, ChoiceResult, Resolution};
use crate::error::{KitError, Result};
use crate::kit::Kit;
use crate::protocol::{AppState, Channel};

/// Handle given to every hook of a prompt.
///
/// Cheap to clone. Everything it sends is addressed to the prompt that
/// created it; once that prompt has settled or been superseded,
/// [`is_current`](Self::is_current) turns false and the prompt-scoped
/// setters (`submit`, `set_preview`, `set_panel`, `set_hint`,
/// `set_choices`, `set_flags`) do nothing.
#[derive(Clone)]
pub struct PromptContext {
    kit: Kit,
    shared: std::sync::Arc<SessionShared>,
}

impl PromptContext {
    pub(crate) fn new(kit: Kit, shared: std::sync::Arc<SessionShared>) -> Self {
        PromptContext { kit, shared }
    }

    pub fn kit(&self) -> &Kit {
        &self.kit
    }

    pub fn prompt_id(&self) -> u64 {
        self.shared.ticket.prompt_id()
    }

    pub fn is_current(&self) -> bool {
        self.shared.is_live()
    }

    pub fn config(&self) -> &PromptConfig {
        &self.shared.config
    }

    pub fn resolver(&self) -> &ChoiceResolver {
        &self.shared.resolver
    }

    /// False, with a debug line, once this context's prompt is gone
    fn still_current(&self, what: &str) -> bool {
        let current = self.is_current();
        if !current {
            debug!(prompt_id = self.prompt_id(), what, "Prompt no longer current; dropping");
        }
        current
    }

    /// Submit on the user's behalf
    pub fn submit(&self, value: impl Into<Value>) -> Result<()> {
        if !self.still_current("submit") {
            return Ok(());
        }
        self.kit.submit(value)
    }

    pub fn set_input(&self, text: impl Into<String>) -> Result<()> {
        self.kit.set_input(text)
    }

    pub fn set_preview(&self, html: impl Into<String>) -> Result<()> {
        if !self.still_current("set_preview") {
            return Ok(());
        }
        self.kit.bus().send(Channel::SetPreview, Value::String(html.into()))
    }

    pub fn set_panel(&self, html: impl Into<String>) -> Result<()> {
        if !self.still_current("set_panel") {
            return Ok(());
        }
        let html = crate::choices::wrap_html(&html.into(), &self.shared.config.class_name);
        self.kit.bus().send(Channel::SetPanel, Value::String(html))
    }

    pub fn set_hint(&self, text: impl Into<String>) -> Result<()> {
        if !self.still_current("set_hint") {
            return Ok(());
        }
        self.kit.bus().send(Channel::SetHint, Value::String(text.into()))
    }

    pub fn set_footer(&self, text: impl Into<String>) -> Result<()> {
        self.kit.bus().send(Channel::SetFooter, Value::String(text.into()))
    }

    /// Replace the visible list outside the resolver's own schedule
    pub fn set_choices(&self, result: impl Into<ChoiceResult>) -> Result<Resolution> {
        if !self.still_current("set_choices") {
            return Ok(Resolution::Stale);
        }
        self.shared.resolver.display(result.into(), false)
    }

    /// Replace the actions menu
    pub fn set_flags(&self, actions: Vec<Action>) -> Result<()> {
        if !self.still_current("set_flags") {
            return Ok(());
        }
        let flags = super::flags_from_actions(&actions);
        *self.shared.actions.lock() = actions;
        self.kit.bus().send(Channel::SetFlags, serde_json::to_value(flags)?)
    }

    pub fn send(&self, channel: Channel, value: Value) -> Result<()> {
        self.kit.bus().send(channel, value)
    }

    pub async fn send_wait(&self, channel: Channel, data: Option<Value>) -> Option<Value> {
        self.kit.bus().send_wait(channel, data).await
    }

    /// Look a choice up in the list currently on screen, then among the
    /// actions (which the host lists as choices while the menu is open)
    pub fn find_choice(&self, id: &str) -> Option<Choice> {
        self.shared.resolver.find(id).or_else(|| {
            self.shared
                .actions
                .lock()
                .iter()
                .find(|a| a.name == id)
                .map(Action::to_choice)
        })
    }

    /// Ask the hosting script to finish; return the error so a handler can
    /// end with `return Err(ctx.terminate("escape").into())`
    pub fn terminate(&self, reason: &str) -> KitError {
        self.kit.terminate(reason);
        KitError::Terminated {
            reason: reason.to_string(),
        }
    }

    /// Run another channel's handler (user hook or default) for this prompt
    pub fn dispatch(&self, channel: Channel, input: String, state: AppState) {
        if let Some(hook) = self.shared.handlers.get(&channel) {
            self.shared.spawn_hook(self, hook, input, state);
        }
    }

    pub(crate) fn shared(&self) -> &SessionShared {
        &self.shared
    }

    /// Fail the prompt with an error raised outside the awaiting task
    pub(crate) fn report(&self, error: anyhow::Error) {
        self.shared.report(error);
    }
}
