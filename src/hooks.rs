//! Callback types for prompt, choice and tab hooks
//!
//! Hooks are stored as `Arc<dyn Fn>` returning boxed futures so a config can
//! be cloned into spawned tasks. The constructor functions take ordinary
//! async closures and do the boxing.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::choices::ChoiceResult;
use crate::kit::Kit;
use crate::protocol::{AppState, FocusedChoice};
use crate::session::{PromptContext, SubmitOutcome, Validation};

pub type HookFuture<T> = BoxFuture<'static, anyhow::Result<T>>;

/// Channel handler: `(ctx, input, state)`
pub type EventHook = Arc<dyn Fn(PromptContext, String, AppState) -> HookFuture<()> + Send + Sync>;

/// Runs before validation on VALUE_SUBMITTED
pub type SubmitHook =
    Arc<dyn Fn(PromptContext, String, AppState) -> HookFuture<SubmitOutcome> + Send + Sync>;

pub type Validator = Arc<dyn Fn(Value) -> HookFuture<Validation> + Send + Sync>;

/// Produces preview HTML for the focused choice
pub type PreviewFn =
    Arc<dyn Fn(PromptContext, String, AppState) -> HookFuture<String> + Send + Sync>;

/// Zero-argument choice source, invoked once per prompt
pub type ConstantFn = Arc<dyn Fn() -> HookFuture<ChoiceResult> + Send + Sync>;

/// Input-driven choice source
pub type GeneratorFn = Arc<dyn Fn(String) -> HookFuture<ChoiceResult> + Send + Sync>;

/// Input-driven actions for the actions menu (FLAG_INPUT)
pub type ActionsFn =
    Arc<dyn Fn(String, AppState) -> HookFuture<Vec<crate::session::Action>> + Send + Sync>;

/// Shortcut/action visibility predicate over the focused choice
pub type Condition = Arc<dyn Fn(Option<&FocusedChoice>) -> bool + Send + Sync>;

/// Tab body; usually starts a new prompt on the given kit
pub type TabFn = Arc<dyn Fn(Kit, String) -> HookFuture<()> + Send + Sync>;

pub fn event_hook<F, Fut>(f: F) -> EventHook
where
    F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, input, state| f(ctx, input, state).boxed())
}

pub fn submit_hook<F, Fut>(f: F) -> SubmitHook
where
    F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<SubmitOutcome>> + Send + 'static,
{
    Arc::new(move |ctx, input, state| f(ctx, input, state).boxed())
}

/// Anything convertible into [`Validation`] works: `bool`, `String`, `&str`
pub fn validator<F, Fut, V>(f: F) -> Validator
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    V: Into<Validation>,
{
    Arc::new(move |value| {
        let fut = f(value);
        async move { fut.await.map(Into::into) }.boxed()
    })
}

pub fn preview_fn<F, Fut>(f: F) -> PreviewFn
where
    F: Fn(PromptContext, String, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    Arc::new(move |ctx, input, state| f(ctx, input, state).boxed())
}

pub fn actions_fn<F, Fut>(f: F) -> ActionsFn
where
    F: Fn(String, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<crate::session::Action>>> + Send + 'static,
{
    Arc::new(move |input, state| f(input, state).boxed())
}

pub fn tab_fn<F, Fut>(f: F) -> TabFn
where
    F: Fn(Kit, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |kit, input| f(kit, input).boxed())
}

pub fn condition<F>(f: F) -> Condition
where
    F: Fn(Option<&FocusedChoice>) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}
