//! VALUE_SUBMITTED evaluation: submit hook, validation, value unwrapping

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

use super::PromptContext;
use crate::error::{KitError, Result};
use crate::protocol::{AppState, Ui};

/// What a submit hook decided
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Continue with this value (possibly rewritten by the hook)
    Accept(Value),
    /// Keep the prompt open and show this message
    Reject(String),
    /// Keep the prompt open without a message
    Prevent,
}

impl SubmitOutcome {
    /// Accept whatever the host submitted
    pub fn proceed(state: &AppState) -> Self {
        SubmitOutcome::Accept(state.value.clone().unwrap_or(Value::Null))
    }
}

/// A validator's verdict
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Valid,
    /// Rejected with the generic "`value` is not valid" message
    Invalid,
    /// Rejected with this message
    Message(String),
}

impl From<bool> for Validation {
    fn from(ok: bool) -> Self {
        if ok {
            Validation::Valid
        } else {
            Validation::Invalid
        }
    }
}

impl From<String> for Validation {
    fn from(message: String) -> Self {
        Validation::Message(message)
    }
}

impl From<&str> for Validation {
    fn from(message: &str) -> Self {
        Validation::Message(message.to_string())
    }
}

impl From<Option<String>> for Validation {
    fn from(message: Option<String>) -> Self {
        message.map_or(Validation::Valid, Validation::Message)
    }
}

/// The value a prompt resolves with
#[derive(Clone, Debug, PartialEq)]
pub enum PromptValue {
    Value(Value),
    /// A `data:...;base64,` URI, decoded
    Bytes(Vec<u8>),
}

impl PromptValue {
    /// Unwrap `{ data }` wrappers and decode base64 data URIs
    pub fn from_submitted(value: Value) -> Self {
        let value = match value {
            Value::Object(mut map) if map.get("data").is_some_and(is_truthy) => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };

        if let Value::String(text) = &value {
            if let Some(bytes) = decode_data_uri(text) {
                return PromptValue::Bytes(bytes);
            }
        }
        PromptValue::Value(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PromptValue::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PromptValue::Value(v) => Some(v),
            PromptValue::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PromptValue::Bytes(b) => Some(b),
            PromptValue::Value(_) => None,
        }
    }

    /// String form for text prompts; non-string JSON is rendered compactly
    pub fn into_string(self) -> String {
        match self {
            PromptValue::Value(Value::String(s)) => s,
            PromptValue::Value(Value::Null) => String::new(),
            PromptValue::Value(other) => other.to_string(),
            PromptValue::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    /// JSON form; bytes are re-encoded as base64
    pub fn into_value(self) -> Value {
        match self {
            PromptValue::Value(v) => v,
            PromptValue::Bytes(bytes) => Value::String(STANDARD.encode(bytes)),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Decode `data:<mime>;base64,<payload>`; anything else is `None`
pub fn decode_data_uri(text: &str) -> Option<Vec<u8>> {
    let rest = text.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    match STANDARD.decode(payload.trim()) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            debug!(error = %e, "Data URI payload is not valid base64");
            None
        }
    }
}

/// Human form of a value for the generic rejection message
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run the submit hook then the validator.
///
/// Multi-select prompts submit the selection as-is. Chat prompts and flagged
/// submits skip the submit hook.
pub(crate) async fn evaluate(ctx: &PromptContext, state: AppState) -> Result<SubmitOutcome> {
    if state.multiple {
        return Ok(SubmitOutcome::Accept(Value::Array(state.selected.clone())));
    }

    let mut value = state.value.clone().unwrap_or(Value::Null);

    if state.ui != Some(Ui::Chat) && state.flag.is_none() {
        let focused_hook = state
            .focused_id()
            .and_then(|id| ctx.find_choice(id))
            .and_then(|choice| choice.on_submit);
        if let Some(hook) = focused_hook.or_else(|| ctx.config().on_submit.clone()) {
            match hook(ctx.clone(), state.input.clone(), state.clone())
                .await
                .map_err(KitError::from)?
            {
                SubmitOutcome::Accept(next) => value = next,
                other => return Ok(other),
            }
        }
    }

    if let Some(validate) = &ctx.config().validate {
        match validate(value.clone()).await.map_err(KitError::from)? {
            Validation::Valid => {}
            Validation::Invalid => {
                return Ok(SubmitOutcome::Reject(format!(
                    "{} is not valid",
                    display_value(&value)
                )))
            }
            Validation::Message(message) => return Ok(SubmitOutcome::Reject(message)),
        }
    }

    Ok(SubmitOutcome::Accept(value))
}
