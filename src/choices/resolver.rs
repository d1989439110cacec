use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{wrap_html, Choice, ChoiceResult, ChoiceSource};
use crate::bus::MessageBus;
use crate::error::Result;
use crate::logging;
use crate::protocol::{disambiguate, generate_choice_id, Channel, ChoicesPayload};
use crate::supervisor::PromptSupervisor;

/// What a resolver pass ended up doing
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// A non-empty list was sent
    Choices(usize),
    /// The result was an empty list; the no-choices hook should run
    NoChoices,
    /// HTML was sent as panel content
    Panel,
    /// The list was cleared
    Cleared,
    /// Nothing to (re)compute for this source
    Unchanged,
    /// A newer invocation, prompt or tab took over while we were waiting
    Stale,
}

/// Computes the active list for a prompt and keeps the last one around so
/// focus/submit events can map an id back to its [`Choice`]
pub struct ChoiceResolver {
    bus: MessageBus,
    supervisor: PromptSupervisor,
    source: ChoiceSource,
    class_name: String,
    input_regex: String,
    /// Shown before a function source first resolves
    initial_choices: Option<Vec<Choice>>,
    invocation: AtomicU64,
    previous: Mutex<Vec<Choice>>,
}

impl ChoiceResolver {
    pub fn new(
        bus: MessageBus,
        supervisor: PromptSupervisor,
        source: ChoiceSource,
        class_name: impl Into<String>,
        input_regex: impl Into<String>,
    ) -> Self {
        ChoiceResolver {
            bus,
            supervisor,
            source,
            class_name: class_name.into(),
            input_regex: input_regex.into(),
            initial_choices: None,
            invocation: AtomicU64::new(0),
            previous: Mutex::new(Vec::new()),
        }
    }

    pub fn with_initial_choices(mut self, choices: Option<Vec<Choice>>) -> Self {
        self.initial_choices = choices;
        self
    }

    pub fn source(&self) -> &ChoiceSource {
        &self.source
    }

    /// First display when the prompt opens
    pub async fn initial(&self, input: &str) -> Result<Resolution> {
        match &self.source {
            ChoiceSource::None => {
                self.send_choices(Some(Vec::new()), false)?;
                Ok(Resolution::Unchanged)
            }
            ChoiceSource::Static(choices) => {
                self.display(ChoiceResult::Choices(choices.clone()), false)
            }
            ChoiceSource::Html(html) => self.display(ChoiceResult::Html(html.clone()), false),
            ChoiceSource::Constant { f, .. } => {
                self.show_placeholder_list()?;
                let f = f.clone();
                self.invoke(move || f(), false).await
            }
            ChoiceSource::Generator { f, .. } => {
                self.show_placeholder_list()?;
                let f = f.clone();
                let input = input.to_string();
                self.invoke(move || f(input), true).await
            }
        }
    }

    /// Initial choices if configured, else an empty list
    fn show_placeholder_list(&self) -> Result<()> {
        match &self.initial_choices {
            Some(choices) => self.show_list(choices.clone(), false).map(|_| ()),
            None => self.send_choices(Some(Vec::new()), false),
        }
    }

    /// Re-run for new input; only generators react
    pub async fn on_input(&self, input: &str) -> Result<Resolution> {
        match &self.source {
            ChoiceSource::Generator { f, .. } => {
                let f = f.clone();
                let input = input.to_string();
                self.invoke(move || f(input), true).await
            }
            _ => Ok(Resolution::Unchanged),
        }
    }

    #[instrument(name = "resolve_choices", skip(self, call))]
    async fn invoke<F>(&self, call: F, generated: bool) -> Result<Resolution>
    where
        F: FnOnce() -> crate::hooks::HookFuture<ChoiceResult>,
    {
        let local = self.invocation.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.supervisor.epoch();
        let start = Instant::now();

        let result = call().await?;

        logging::log_perf("resolve_choices", start.elapsed().as_millis() as u64, 100);

        if self.invocation.load(Ordering::SeqCst) != local {
            debug!(invocation = local, "Dropping superseded choice result");
            return Ok(Resolution::Stale);
        }
        if !self.supervisor.is_epoch_current(epoch) {
            debug!(invocation = local, "Dropping choice result from an older prompt or tab");
            return Ok(Resolution::Stale);
        }

        self.display(result, generated)
    }

    /// Apply directives, then push the list (or panel) to the host
    pub fn display(&self, result: ChoiceResult, generated: bool) -> Result<Resolution> {
        match result {
            ChoiceResult::Choices(choices) => self.show_list(choices, generated),
            ChoiceResult::Html(html) => {
                self.bus
                    .send(Channel::SetPanel, Value::String(wrap_html(&html, &self.class_name)))?;
                Ok(Resolution::Panel)
            }
            ChoiceResult::Directed {
                choices,
                preview,
                panel,
                hint,
            } => {
                if let Some(preview) = preview {
                    self.bus.send(Channel::SetPreview, Value::String(preview))?;
                }
                if let Some(panel) = panel {
                    let html = wrap_html(&panel, &self.class_name);
                    self.bus.send(Channel::SetPanel, Value::String(html))?;
                }
                if let Some(hint) = hint {
                    self.bus.send(Channel::SetHint, Value::String(hint))?;
                }
                match choices {
                    Some(choices) => self.show_list(choices, generated),
                    None => Ok(Resolution::Unchanged),
                }
            }
            ChoiceResult::Null => {
                self.previous.lock().clear();
                self.send_choices(None, generated)?;
                Ok(Resolution::Cleared)
            }
        }
    }

    fn show_list(&self, mut choices: Vec<Choice>, generated: bool) -> Result<Resolution> {
        let mut seen = HashSet::with_capacity(choices.len());
        for (index, choice) in choices.iter_mut().enumerate() {
            let id = choice
                .id
                .take()
                .unwrap_or_else(|| generate_choice_id(index, &choice.label()));
            choice.id = Some(disambiguate(id, &mut seen));
        }

        let data = choices
            .iter()
            .map(|c| c.to_data(c.id.clone().unwrap_or_default()))
            .collect();
        let count = choices.len();
        *self.previous.lock() = choices;
        self.send_choices(Some(data), generated)?;

        if count == 0 {
            Ok(Resolution::NoChoices)
        } else {
            Ok(Resolution::Choices(count))
        }
    }

    fn send_choices(
        &self,
        choices: Option<Vec<crate::protocol::ChoiceData>>,
        generated: bool,
    ) -> Result<()> {
        let payload = ChoicesPayload {
            choices,
            class_name: self.class_name.clone(),
            generated,
            input_regex: self.input_regex.clone(),
        };
        self.bus.send(Channel::SetChoices, serde_json::to_value(payload)?)
    }

    /// Look up a choice from the last displayed list
    pub fn find(&self, id: &str) -> Option<Choice> {
        self.previous
            .lock()
            .iter()
            .find(|c| c.id.as_deref() == Some(id))
            .cloned()
    }

    pub fn previous(&self) -> Vec<Choice> {
        self.previous.lock().clone()
    }
}
