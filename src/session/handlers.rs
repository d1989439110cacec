//! Default channel handlers and the per-prompt handler table
//!
//! User hooks replace the default for their channel, except CHOICE_FOCUSED
//! where the default focus work always runs first and the user hook after it.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::{flags_from_actions, Action, PromptConfig, PromptContext};
use crate::choices::{Preview, Resolution};
use crate::hooks::{self, EventHook};
use crate::protocol::{AppState, Channel, Ui};

/// Shown when a preview generator fails
pub const FAILED_PREVIEW_HTML: &str =
    "<div class=\"p-5 prose dark:prose-dark\"><h1>Failed to render preview... 🤔</h1></div>";

/// Resolved handlers for one prompt
pub(crate) struct Handlers {
    table: HashMap<Channel, EventHook>,
    user_choice_focus: Option<EventHook>,
}

impl Handlers {
    pub(crate) fn new(config: &PromptConfig) -> Self {
        let mut table: HashMap<Channel, EventHook> = HashMap::new();
        table.insert(Channel::Escape, hooks::event_hook(escape));
        table.insert(Channel::Blur, hooks::event_hook(blur));
        table.insert(Channel::Abandon, hooks::event_hook(abandon));
        table.insert(Channel::Input, hooks::event_hook(input));
        table.insert(Channel::FlagInput, hooks::event_hook(flag_input));
        table.insert(Channel::KeywordTriggered, hooks::event_hook(keyword));
        table.insert(Channel::OnMenuToggle, hooks::event_hook(menu_toggle));
        table.insert(Channel::OnPaste, hooks::event_hook(paste));
        table.insert(Channel::OnDrop, hooks::event_hook(drop_files));
        table.insert(Channel::NoChoices, hooks::event_hook(no_choices));

        let mut user_choice_focus = None;
        for (channel, hook) in &config.hooks {
            if *channel == Channel::ChoiceFocused {
                user_choice_focus = Some(hook.clone());
            } else {
                table.insert(channel.clone(), hook.clone());
            }
        }
        table.insert(Channel::ChoiceFocused, hooks::event_hook(choice_focus));

        Handlers {
            table,
            user_choice_focus,
        }
    }

    pub(crate) fn get(&self, channel: &Channel) -> Option<EventHook> {
        self.table.get(channel).cloned()
    }

    pub(crate) fn user_choice_focus(&self) -> Option<EventHook> {
        self.user_choice_focus.clone()
    }
}

async fn escape(ctx: PromptContext, _input: String, _state: AppState) -> anyhow::Result<()> {
    ctx.kit().bus().signal(Channel::BeforeExit)?;
    Err(ctx.terminate("escape").into())
}

async fn blur(ctx: PromptContext, _input: String, _state: AppState) -> anyhow::Result<()> {
    if ctx.config().ignore_blur {
        debug!(prompt_id = ctx.prompt_id(), "Blur ignored");
        return Ok(());
    }
    Err(ctx.terminate("blur").into())
}

async fn abandon(ctx: PromptContext, _input: String, _state: AppState) -> anyhow::Result<()> {
    Err(ctx.terminate("abandon").into())
}

/// Debounced generator re-run
async fn input(ctx: PromptContext, input: String, state: AppState) -> anyhow::Result<()> {
    if !ctx.resolver().source().is_generator() {
        return Ok(());
    }
    let job = ctx.clone();
    ctx.shared().input_debouncer.call(async move {
        if !job.is_current() {
            return;
        }
        match job.resolver().on_input(&input).await {
            Ok(Resolution::NoChoices) => job.dispatch(Channel::NoChoices, input, state),
            Ok(_) => {}
            Err(e) => job.report(e.into()),
        }
    });
    Ok(())
}

/// Rebuild the actions menu from `dynamic_actions`, debounced like input
async fn flag_input(ctx: PromptContext, input: String, state: AppState) -> anyhow::Result<()> {
    let Some(actions_fn) = ctx.config().dynamic_actions.clone() else {
        return Ok(());
    };
    let job = ctx.clone();
    ctx.shared().flag_input_debouncer.call(async move {
        if !job.is_current() {
            return;
        }
        let result = match actions_fn(input, state).await {
            Ok(actions) if job.is_current() => job.set_flags(actions).map_err(Into::into),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            job.report(e);
        }
    });
    Ok(())
}

async fn keyword(ctx: PromptContext, input: String, state: AppState) -> anyhow::Result<()> {
    if state.keyword.as_deref().is_some_and(|k| !k.is_empty()) {
        return Ok(());
    }
    ctx.kit().main_script(&input).await?;
    Ok(())
}

/// Show the focused choice's own actions when the menu opens on it
async fn menu_toggle(ctx: PromptContext, _input: String, state: AppState) -> anyhow::Result<()> {
    if state.flagged_value.is_none() {
        return Ok(());
    }
    let Some(choice) = state.focused_id().and_then(|id| ctx.find_choice(id)) else {
        return Ok(());
    };
    if !choice.actions.is_empty() {
        ctx.set_flags(choice.actions)?;
    }
    Ok(())
}

async fn paste(ctx: PromptContext, _input: String, state: AppState) -> anyhow::Result<()> {
    debug!(
        prompt_id = ctx.prompt_id(),
        len = state.paste.as_deref().map_or(0, str::len),
        "Paste"
    );
    Ok(())
}

async fn drop_files(ctx: PromptContext, _input: String, state: AppState) -> anyhow::Result<()> {
    if let (Some(dropped), Some(Ui::Arg)) = (&state.drop, state.ui) {
        let text = match dropped {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        ctx.set_input(text)?;
    }
    ctx.kit().bus().signal(Channel::Focus)?;
    Ok(())
}

async fn no_choices(ctx: PromptContext, _input: String, _state: AppState) -> anyhow::Result<()> {
    ctx.set_preview("")?;
    Ok(())
}

/// Debounced per the prompt's focus interval
async fn choice_focus(ctx: PromptContext, input: String, state: AppState) -> anyhow::Result<()> {
    let job = ctx.clone();
    ctx.shared().focus_debouncer.call(async move {
        if let Err(e) = focus_work(&job, input, state).await {
            job.report(e);
        }
    });
    Ok(())
}

async fn focus_work(ctx: &PromptContext, input: String, state: AppState) -> anyhow::Result<()> {
    if !ctx.is_current() {
        return Ok(());
    }

    let choice = state.focused_id().and_then(|id| ctx.find_choice(id));
    if let Some(choice) = choice {
        if let Some(on_focus) = &choice.on_focus {
            on_focus(ctx.clone(), input.clone(), state.clone()).await?;
        }
        if let Some(Preview::Generator(preview)) = &choice.preview {
            let html = match preview(ctx.clone(), input.clone(), state.clone()).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(error = %e, choice = %choice.name, "Preview failed");
                    FAILED_PREVIEW_HTML.to_string()
                }
            };
            if ctx.is_current() {
                ctx.set_preview(html)?;
            }
        }
    }

    let shortcuts = &ctx.config().shortcuts;
    if !shortcuts.is_empty() && shortcuts.iter().any(|s| s.condition.is_some()) {
        let visible: Vec<_> = shortcuts
            .iter()
            .filter(|s| s.is_visible_for(state.focused.as_ref()))
            .map(|s| s.to_data())
            .collect();
        ctx.send(Channel::SetShortcuts, serde_json::to_value(visible)?)?;
    }

    let visible_actions: Option<Vec<Action>> = {
        let actions = ctx.shared().actions.lock();
        actions.iter().any(|a| a.condition.is_some()).then(|| {
            actions
                .iter()
                .filter(|a| a.is_visible_for(state.focused.as_ref()))
                .cloned()
                .collect()
        })
    };
    if let Some(visible) = visible_actions {
        ctx.send(Channel::SetFlags, serde_json::to_value(flags_from_actions(&visible))?)?;
    }

    if let Some(user) = ctx.shared().handlers.user_choice_focus() {
        user(ctx.clone(), input, state).await?;
    }
    Ok(())
}

/// Look up an action in the menu currently shown
pub(crate) fn find_action(ctx: &PromptContext, name: &str) -> Option<Action> {
    ctx.shared()
        .actions
        .lock()
        .iter()
        .find(|a| a.name == name)
        .cloned()
}
