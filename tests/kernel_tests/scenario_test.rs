use std::time::Duration;

use llmkernel::{
    engine::scripted::ScriptedEngine,
    event::event_bus::Event,
    extension::PLUGIN_ID,
    kernel::protocol::{ExecuteReply, ExecuteRequest, MessageHeader, ReplyStatus},
    settings::DEFAULT_MODEL_KEY,
};
use pretty_assertions::assert_eq;

use crate::{config_with_catalog, load_kernel, LoadedKernel};

async fn execute(loaded: &mut LoadedKernel, code: &str) -> (ExecuteReply, String) {
    loaded
        .context
        .begin_request(MessageHeader::new("execute_request", "scenario"));
    let reply = loaded.kernel.execute_request(ExecuteRequest::new(code)).await;
    (reply, loaded.drain_stream().concat())
}

#[tokio::test]
async fn test_status_before_and_after_first_prompt() {
    let engine = ScriptedEngine::new(vec!["fine"]);
    let mut loaded = load_kernel(engine.clone(), config_with_catalog(&["A", "B"], "A"), None).await;

    let (reply, text) = execute(&mut loaded, "%ai model").await;
    assert_eq!(reply.status(), ReplyStatus::Ok);
    assert!(text.contains("not yet initialized"), "{}", text);
    assert!(text.contains("default: A"));
    assert!(engine.created_models().is_empty());

    let (reply, text) = execute(&mut loaded, "how are you?").await;
    assert_eq!(reply.status(), ReplyStatus::Ok);
    assert_eq!(text, "fine");

    let (_, text) = execute(&mut loaded, "%ai models").await;
    assert!(text.starts_with("Current model: A"), "{}", text);
    assert!(!text.contains("not yet initialized"));
}

#[tokio::test]
async fn test_switch_then_send_uses_new_model() {
    let engine = ScriptedEngine::echo();
    let mut loaded = load_kernel(engine.clone(), config_with_catalog(&["A", "B"], "A"), None).await;

    let (reply, text) = execute(&mut loaded, "%ai model B").await;
    assert_eq!(reply.status(), ReplyStatus::Ok);
    assert!(text.contains("changed"), "{}", text);

    let (_, text) = execute(&mut loaded, "say hi").await;
    assert_eq!(text, "say hi");
    let conversations = engine.conversations();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].0, "B");
    assert_eq!(engine.created_models(), vec!["B"]);
}

#[tokio::test]
async fn test_invalid_model_leaves_session_unchanged() {
    let engine = ScriptedEngine::echo();
    let mut loaded = load_kernel(engine.clone(), config_with_catalog(&["A", "B"], "A"), None).await;
    execute(&mut loaded, "%ai model B").await;

    let (reply, _) = execute(&mut loaded, "%ai model C").await;
    match reply {
        ExecuteReply::Error {
            ename,
            evalue,
            traceback,
            ..
        } => {
            assert_eq!(ename, "Error");
            assert!(evalue.contains("Invalid model: C"));
            assert!(evalue.contains("%ai model"));
            assert!(traceback.is_empty());
        }
        other => panic!("expected an error reply, got {:?}", other),
    }

    let (_, text) = execute(&mut loaded, "%ai model").await;
    assert!(text.starts_with("Current model: B"), "{}", text);
    assert_eq!(engine.created_models(), vec!["B"]);
}

#[tokio::test]
async fn test_settings_default_is_used_for_lazy_init() {
    let engine = ScriptedEngine::new(vec!["ok"]);
    let mut loaded = load_kernel(
        engine.clone(),
        config_with_catalog(&["A", "B"], "A"),
        Some("B"),
    )
    .await;

    let (_, text) = execute(&mut loaded, "%ai model").await;
    assert!(text.contains("default: B"), "{}", text);

    execute(&mut loaded, "hello").await;
    assert_eq!(engine.created_models(), vec!["B"]);
}

#[tokio::test]
async fn test_settings_change_reaches_new_sessions() {
    let engine = ScriptedEngine::new(vec!["ok"]);
    let mut loaded = load_kernel(engine.clone(), config_with_catalog(&["A", "B"], "A"), None).await;
    let (mut events, _) = loaded.shared.event_bus().subscribe();

    loaded
        .settings
        .plugin(PLUGIN_ID)
        .await
        .set(DEFAULT_MODEL_KEY, serde_json::json!("B"));

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        Event::DefaultModelChanged {
            model: Some("B".to_string())
        }
    );

    execute(&mut loaded, "hello").await;
    assert_eq!(engine.created_models(), vec!["B"]);
}

#[tokio::test]
async fn test_execution_count_is_reported() {
    let mut loaded = load_kernel(
        ScriptedEngine::echo(),
        config_with_catalog(&["A"], "A"),
        None,
    )
    .await;
    let (first, _) = execute(&mut loaded, "%ai").await;
    let (second, _) = execute(&mut loaded, "one").await;
    assert_eq!(first.execution_count(), 1);
    assert_eq!(second.execution_count(), 2);
}
