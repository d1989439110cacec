//! End-to-end prompt sessions over the in-memory transport

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use script_kit_bridge::choices::{Choice, ChoiceSource};
use script_kit_bridge::protocol::{AppMessage, AppState, Channel, ChoicesPayload, FocusedChoice};
use script_kit_bridge::transport::{memory_pair, MemoryHost};
use script_kit_bridge::{Kit, KitError, PromptConfig, RecordingTerminator};

fn kit() -> (Kit, MemoryHost) {
    let (transport, host, inbound) = memory_pair(64);
    let kit = Kit::builder()
        .transport(Arc::new(transport))
        .terminator(Arc::new(RecordingTerminator::new()))
        .script_path("/scripts/e2e.ts")
        .build();
    kit.bus().spawn_pump(inbound);
    (kit, host)
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

fn choice_lists(host: &MemoryHost) -> Vec<Vec<(String, Value)>> {
    host.sent_on(&Channel::SetChoices)
        .into_iter()
        .filter_map(|m| serde_json::from_value::<ChoicesPayload>(m.value?).ok())
        .filter_map(|p| p.choices)
        .map(|list| list.into_iter().map(|c| (c.name, c.value)).collect())
        .collect()
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test]
async fn settles_once_and_stops_dispatching() {
    let (kit, host) = kit();
    let inits = counter();
    let config = PromptConfig::new().on_init({
        let inits = inits.clone();
        move |_, _, _| {
            let inits = inits.clone();
            async move {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    });
    let session = kit.start_prompt(config).await.unwrap();

    host.emit(submitted(json!("first"))).await;
    host.emit(submitted(json!("second"))).await;
    host.emit_state(Channel::OnInit, AppState::default()).await;

    assert_eq!(session.resolve().await.unwrap().as_str(), Some("first"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(inits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn superseded_session_sees_no_further_events() {
    let (kit, host) = kit();
    let first_inits = counter();
    let second_inits = counter();

    let first = kit
        .start_prompt(PromptConfig::new().on_init({
            let count = first_inits.clone();
            move |_, _, _| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        }))
        .await
        .unwrap();
    let first_id = first.prompt_id();
    let first_pending = tokio::spawn(first.resolve());

    let second = kit
        .start_prompt(PromptConfig::new().on_init({
            let count = second_inits.clone();
            move |ctx, _, _| {
                let count = count.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    ctx.submit("second")?;
                    Ok(())
                }
            }
        }))
        .await
        .unwrap();
    let second_pending = tokio::spawn(second.resolve());

    host.emit_state(Channel::OnInit, AppState::default()).await;

    assert_eq!(
        second_pending.await.unwrap().unwrap().as_str(),
        Some("second")
    );
    let err = first_pending.await.unwrap().unwrap_err();
    assert!(matches!(err, KitError::Superseded { prompt_id } if prompt_id == first_id));
    assert_eq!(first_inits.load(Ordering::SeqCst), 0);
    assert_eq!(second_inits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_generator_result_never_overwrites_newer_one() {
    let (kit, host) = kit();
    let config = PromptConfig::new()
        .choices(ChoiceSource::generator(|input: String| async move {
            let delay = if input == "a" { 200 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(vec![format!("for {input}")])
        }))
        .debounce_input(Duration::from_millis(50));
    let session = kit.start_prompt(config).await.unwrap();
    let pending = tokio::spawn(session.resolve());

    host.emit_state(Channel::Input, AppState::with_input("a")).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    host.emit_state(Channel::Input, AppState::with_input("ab")).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let names: Vec<String> = choice_lists(&host)
        .into_iter()
        .filter_map(|list| list.first().map(|(name, _)| name.clone()))
        .collect();
    assert_eq!(names.last().map(String::as_str), Some("for ab"));
    assert!(!names.iter().any(|n| n == "for a"));

    host.emit(submitted(json!("done"))).await;
    assert_eq!(pending.await.unwrap().unwrap().as_str(), Some("done"));
}

#[tokio::test]
async fn rejected_value_keeps_session_open_until_valid() {
    let (kit, host) = kit();
    let config = PromptConfig::new().validate(|value: Value| async move {
        Ok(if value == json!("good") {
            None
        } else {
            Some("Only good will do".to_string())
        })
    });
    let session = kit.start_prompt(config).await.unwrap();
    let pending = tokio::spawn(session.resolve());

    host.emit(submitted(json!("bad"))).await;
    let invalid = host.wait_for(Channel::ValueInvalid).await.unwrap();
    assert_eq!(invalid.value, Some(json!("Only good will do")));
    assert!(!pending.is_finished());

    host.emit(submitted(json!("good"))).await;
    assert_eq!(pending.await.unwrap().unwrap().as_str(), Some("good"));
}

#[tokio::test(start_paused = true)]
async fn input_burst_runs_generator_once_with_last_input() {
    let (kit, host) = kit();
    let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let config = PromptConfig::new()
        .choices(ChoiceSource::generator_sync({
            let calls = calls.clone();
            move |input: String| {
                calls.lock().push(input.clone());
                Ok(vec![input])
            }
        }))
        .debounce_input(Duration::from_millis(200));
    let session = kit.start_prompt(config).await.unwrap();
    let pending = tokio::spawn(session.resolve());

    for input in ["a", "ab", "abc"] {
        host.emit_state(Channel::Input, AppState::with_input(input)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // the initial pass runs with the empty starting input
    let typed: Vec<String> = calls.lock().iter().filter(|c| !c.is_empty()).cloned().collect();
    assert_eq!(typed, vec!["abc".to_string()]);

    host.emit(submitted(json!("abc"))).await;
    pending.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn send_wait_without_reply_resolves_to_none() {
    let (kit, host) = kit();
    let reply = kit
        .bus()
        .send_wait_timeout(Channel::GetBounds, None, Duration::from_millis(50))
        .await;
    assert_eq!(reply, None);
    assert_eq!(host.sent_on(&Channel::GetBounds).len(), 1);

    // the bus keeps working afterwards
    kit.set_hint("still alive").unwrap();
    assert_eq!(host.sent_on(&Channel::SetHint).len(), 1);
}

#[tokio::test]
async fn static_choices_ignore_input_and_submit_focused_on_enter() {
    let (kit, host) = kit();
    let session = kit
        .start_prompt(PromptConfig::new().choices(vec!["x", "y", "z"]))
        .await
        .unwrap();
    let pending = tokio::spawn(session.resolve());

    for input in ["y", "yy"] {
        host.emit_state(Channel::Input, AppState::with_input(input))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(choice_lists(&host).len(), 1);

    host.emit_state(
        Channel::Shortcut,
        AppState {
            shortcut: Some("enter".into()),
            focused: Some(FocusedChoice {
                name: Some("y".into()),
                value: Some(json!("y")),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(pending.await.unwrap().unwrap().as_str(), Some("y"));
}

#[tokio::test(start_paused = true)]
async fn generated_choice_carries_its_value() {
    let (kit, host) = kit();
    let config = PromptConfig::new().choices(ChoiceSource::generator(|input: String| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(if input == "ab" {
            vec![Choice::new("AB", 42)]
        } else {
            Vec::new()
        })
    }));
    let session = kit.start_prompt(config).await.unwrap();
    let pending = tokio::spawn(session.resolve());

    host.emit_state(Channel::Input, AppState::with_input("ab")).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let lists = choice_lists(&host);
    let last = lists.last().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0], ("AB".to_string(), json!(42)));

    host.emit_state(
        Channel::Shortcut,
        AppState {
            shortcut: Some("enter".into()),
            input: "ab".into(),
            focused: Some(FocusedChoice {
                name: Some("AB".into()),
                value: Some(json!(42)),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(
        pending.await.unwrap().unwrap().as_value(),
        Some(&json!(42))
    );
}

#[tokio::test]
async fn tab_change_hands_over_to_the_tab_prompt() {
    let (kit, host) = kit();
    let picked: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let tabs = vec![
        script_kit_bridge::Tab::new("One", |_, _| async { Ok(()) }),
        script_kit_bridge::Tab::new("Two", {
            let picked = picked.clone();
            move |kit: Kit, input: String| {
                let picked = picked.clone();
                async move {
                    let value = kit.arg(PromptConfig::new().input(input).placeholder("two")).await?;
                    *picked.lock() = Some(value.into_string());
                    Ok(())
                }
            }
        }),
    ];
    let session = kit
        .start_prompt(PromptConfig::new().tabs(tabs))
        .await
        .unwrap();
    let first_id = session.prompt_id();
    let pending = tokio::spawn(session.resolve());
    host.wait_for(Channel::SetPromptData).await.unwrap();

    host.emit_state(
        Channel::TabChanged,
        AppState {
            tab: Some("Two".into()),
            input: "carried".into(),
            ..Default::default()
        },
    )
    .await;

    let tab_prompt = host.wait_for(Channel::SetPromptData).await.unwrap().value.unwrap();
    assert_eq!(tab_prompt["placeholder"], "two");
    assert_eq!(tab_prompt["input"], "carried");
    assert_eq!(tab_prompt["tabIndex"], 1);

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, KitError::Superseded { prompt_id } if prompt_id == first_id));

    host.emit(submitted(json!("from two"))).await;
    kit.join_background().await;
    assert_eq!(picked.lock().as_deref(), Some("from two"));
    assert_eq!(kit.supervisor().tab_index(), 1);
}
