//! Reporting script failures to the host as SET_ERROR

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use crate::bus::MessageBus;
use crate::error::{KitError, ResultExt};
use crate::kit::Kit;
use crate::logging;
use crate::protocol::{Channel, ScriptErrorData};

const RECENT_LOG_LINES: usize = 10;

static LISTENERS_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Build the SET_ERROR payload for a failure
pub fn script_error_data(
    message: &str,
    location: Option<String>,
    script_path: &str,
) -> ScriptErrorData {
    let mut data = ScriptErrorData::new(message.to_string(), script_path.to_string())
        .with_timestamp(chrono::Utc::now().to_rfc3339());
    if let Some(location) = location {
        data = data.with_stack_trace(format!("at {}", location));
    }
    data
}

/// Tell the host a prompt or script failed. Control-flow endings are not reported.
pub fn report_error(bus: &MessageBus, script_path: &str, err: &KitError) {
    if err.is_control_flow() {
        return;
    }
    let mut data = script_error_data(&err.user_message(), None, script_path)
        .with_recent_logs(logging::get_last_logs(RECENT_LOG_LINES));
    if matches!(err, KitError::Handler(_)) {
        data = data.add_suggestion("Check the prompt's handlers for the failing call".to_string());
    }
    send_error(bus, &data);
}

fn send_error(bus: &MessageBus, data: &ScriptErrorData) {
    match serde_json::to_value(data) {
        Ok(value) => {
            bus.send(Channel::SetError, value).log_err();
        }
        Err(e) => error!(error = %e, "Could not serialize script error"),
    }
}

/// Install the panic listener that reports the first panic to the host.
///
/// Only the first call installs anything. The listener fires once, then
/// defers to the hook that was installed before it.
pub fn install_error_listeners(kit: &Kit) {
    if LISTENERS_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }

    let bus = kit.bus().clone();
    let script_path = kit.script_path().to_string();
    let fired = Arc::new(AtomicBool::new(false));
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        if !fired.swap(true, Ordering::SeqCst) {
            let payload = panic_info.payload();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "script panicked".to_string());
            let location = panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            send_error(&bus, &script_error_data(&message, location, &script_path));
        }
        previous(panic_info);
    }));
    info!("Installed script error listener");
}
