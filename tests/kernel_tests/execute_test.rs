use std::sync::Arc;

use llmkernel::{
    engine::{scripted::ScriptedEngine, MockModelEngine},
    event::event_bus::EventBus,
    kernel::{
        dispatch,
        protocol::{ExecuteReply, ExecuteRequest, ReplyStatus},
        ChannelContext, ChatKernel, KernelHandlers, KernelOutput, ProtocolError,
    },
    model::{ModelCatalog, ModelSession},
    settings::DefaultModelSetting,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

use crate::{config_with_catalog, load_kernel};

fn session_with(engine: ScriptedEngine) -> ModelSession {
    ModelSession::new(
        Arc::new(engine),
        Arc::new(ModelCatalog::new(vec!["A", "B"], "A")),
        DefaultModelSetting::default(),
        Arc::new(EventBus::default()),
    )
}

#[tokio::test]
async fn test_help_never_initializes_model() {
    let mut engine = MockModelEngine::new();
    engine.expect_create().never();
    let session = ModelSession::new(
        Arc::new(engine),
        Arc::new(ModelCatalog::new(vec!["A"], "A")),
        DefaultModelSetting::default(),
        Arc::new(EventBus::default()),
    );
    let (context, mut outputs) = ChannelContext::new();
    let kernel = ChatKernel::new(session, Arc::new(context), Arc::new(EventBus::default()), 20);

    for code in ["%ai help", "%ai", "  %ai model  "] {
        let reply = kernel.execute_request(ExecuteRequest::new(code)).await;
        assert_eq!(reply.status(), ReplyStatus::Ok, "{}", code);
    }
    let mut streams = 0;
    while let Ok(output) = outputs.try_recv() {
        assert!(matches!(output, KernelOutput::Stream { .. }));
        streams += 1;
    }
    // one stream event per magic command
    assert_eq!(streams, 3);
}

#[tokio::test]
async fn test_init_failure_is_reported_verbatim() {
    let mut loaded = load_kernel(
        ScriptedEngine::echo().with_create_failure("WebGPU is not supported in this browser"),
        config_with_catalog(&["A"], "A"),
        None,
    )
    .await;

    let reply = loaded
        .kernel
        .execute_request(ExecuteRequest::new("hello"))
        .await;
    let expected = "Model runtime unavailable: WebGPU is not supported in this browser";
    assert_eq!(
        reply,
        ExecuteReply::Error {
            execution_count: 0,
            ename: "Error".to_string(),
            evalue: expected.to_string(),
            traceback: vec![],
        }
    );

    let mut errors = Vec::new();
    while let Ok(output) = loaded.outputs.try_recv() {
        if let KernelOutput::ExecuteError { content, .. } = output {
            errors.push(content);
        }
    }
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].evalue, expected);
}

#[tokio::test]
async fn test_stream_failure_keeps_delivered_fragments() {
    let mut loaded = load_kernel(
        ScriptedEngine::new(vec!["par", "tial", "never"]).with_stream_failure(2, "connection reset"),
        config_with_catalog(&["A"], "A"),
        None,
    )
    .await;

    let reply = loaded.kernel.execute_request(ExecuteRequest::new("q")).await;
    assert_eq!(reply.status(), ReplyStatus::Error);
    assert_eq!(loaded.drain_stream(), vec!["par", "tial"]);

    // the session survives
    let reply = loaded.kernel.execute_request(ExecuteRequest::new("%ai model")).await;
    assert_eq!(reply.status(), ReplyStatus::Ok);
}

#[tokio::test]
async fn test_concurrent_executes_share_one_model() {
    let engine = ScriptedEngine::new(vec!["x"]);
    let (context, _outputs) = ChannelContext::new();
    let kernel = Arc::new(ChatKernel::new(
        session_with(engine.clone()),
        Arc::new(context),
        Arc::new(EventBus::default()),
        20,
    ));

    let first = tokio::spawn({
        let kernel = kernel.clone();
        async move { kernel.execute_request(ExecuteRequest::new("one")).await }
    });
    let second = tokio::spawn({
        let kernel = kernel.clone();
        async move { kernel.execute_request(ExecuteRequest::new("two")).await }
    });
    assert_eq!(first.await.unwrap().status(), ReplyStatus::Ok);
    assert_eq!(second.await.unwrap().status(), ReplyStatus::Ok);

    assert_eq!(engine.created_models(), vec!["A"]);
    assert_eq!(engine.conversations().len(), 2);
}

#[tokio::test]
async fn test_dispatch_wire_replies() {
    let loaded = load_kernel(ScriptedEngine::echo(), config_with_catalog(&["A"], "A"), None).await;
    let kernel = loaded.kernel.as_ref();

    let info = dispatch(kernel, "kernel_info_request", json!({})).await.unwrap().unwrap();
    assert_eq!(info["protocol_version"], "5.3");
    assert_eq!(info["status"], "ok");
    assert_eq!(info["language_info"]["name"], "markdown");
    assert_eq!(info["language_info"]["mimetype"], "text/markdown");

    let reply = dispatch(kernel, "complete_request", json!({"code": "hel", "cursor_pos": 3}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        reply,
        json!({"matches": [], "cursor_start": 0, "cursor_end": 0, "metadata": {}, "status": "ok"})
    );

    let reply = dispatch(kernel, "inspect_request", json!({"code": "x", "cursor_pos": 1}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, json!({"status": "ok", "found": false, "data": {}, "metadata": {}}));

    let reply = dispatch(kernel, "is_complete_request", json!({"code": "for i in"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, json!({"status": "complete"}));

    let reply = dispatch(kernel, "comm_info_request", json!({})).await.unwrap().unwrap();
    assert_eq!(reply, json!({"status": "ok", "comms": {}}));

    let reply = dispatch(kernel, "history_request", json!({"hist_access_type": "tail", "n": 10}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, json!({"status": "ok", "history": []}));

    for (msg_type, content) in [
        ("input_reply", json!({"value": "42"})),
        ("comm_open", json!({"comm_id": "c1", "target_name": "t"})),
        ("comm_msg", json!({"comm_id": "c1", "data": {"x": 1}})),
        ("comm_close", json!({"comm_id": "c1"})),
    ] {
        assert_eq!(dispatch(kernel, msg_type, content).await.unwrap(), None, "{}", msg_type);
    }

    let reply = dispatch(kernel, "shutdown_request", json!({"restart": false}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, json!({"status": "ok", "restart": false}));
}

#[tokio::test]
async fn test_dispatch_errors() {
    let loaded = load_kernel(ScriptedEngine::echo(), config_with_catalog(&["A"], "A"), None).await;
    let kernel = loaded.kernel.as_ref();

    assert!(matches!(
        dispatch(kernel, "debug_request", json!({})).await,
        Err(ProtocolError::UnsupportedMessageType(ref t)) if t == "debug_request"
    ));
    assert!(matches!(
        dispatch(kernel, "execute_request", json!({"silent": true})).await,
        Err(ProtocolError::InvalidContent { .. })
    ));
}

proptest! {
    #[test]
    fn test_chunks_concatenate_to_reply(fragments in prop::collection::vec("\\PC{0,8}", 0..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut session = session_with(ScriptedEngine::new(fragments.clone()));

        let mut seen = Vec::new();
        let reply = runtime
            .block_on(session.send("prompt", |chunk| seen.push(chunk.to_string())))
            .unwrap();

        prop_assert_eq!(&seen, &fragments);
        prop_assert_eq!(seen.concat(), reply);
    }
}
