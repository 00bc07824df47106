mod common;

use std::sync::Arc;

use common::{LogCapture, RecordingApp, RecordingWriter, WsHarness, with_timeout};
use live_console::terminal::Size;
use live_console::{ConsoleContext, SessionId, TransportKind};
use serde_json::json;

#[tokio::test]
async fn test_create_acknowledges_then_evaluates() {
    let mut ws = WsHarness::new();
    let create = ws.create("abc");

    let first = ws.next_frame().await;
    assert_eq!(
        first,
        json!({"id": create, "type": "result", "success": true, "result": null})
    );

    ws.input("abc", "1+1\n");
    let output = ws.output_until(create, "\n2\n").await;
    assert!(output.contains("1+1"));
}

#[tokio::test]
async fn test_input_for_unknown_session_is_dropped() {
    let logs = LogCapture::default();
    let _subscriber = logs.install();
    let mut ws = WsHarness::new();
    let create = ws.create("abc");
    ws.result_for(create).await;

    ws.input("xyz", "1+1\n");
    ws.resize("xyz", 40, 10);

    let dropped = logs.lines_containing("Input for unknown session dropped");
    assert_eq!(dropped.len(), 1, "{:?}", dropped);
    assert!(dropped[0].contains("DEBUG"));
    assert!(dropped[0].contains("session_id=xyz"));

    for frame in ws.drain().await {
        assert_eq!(frame["type"], "event", "unexpected frame {}", frame);
        assert_eq!(frame["id"], create);
    }
    assert!(ws.ctx.registry().get("xyz").is_none());
}

#[tokio::test]
async fn test_errors_are_shown_and_loop_continues() {
    let mut ws = WsHarness::new();
    let create = ws.create("abc");
    ws.result_for(create).await;

    ws.input("abc", "1/0\n");
    ws.output_until(create, "error: division by zero").await;

    ws.input("abc", "6*7\n");
    ws.output_until(create, "42").await;
}

#[tokio::test]
async fn test_overlong_expression_chain_leaves_session_usable() {
    let mut ws = WsHarness::new();
    let create = ws.create("abc");
    ws.result_for(create).await;

    ws.input("abc", &format!("{}1\n", "1+".repeat(30_000)));
    ws.output_until(create, "error: syntax error").await;

    ws.input("abc", "6*7\n");
    ws.output_until(create, "\n42\n").await;
    assert!(ws.ctx.registry().get("abc").is_some());
}

#[tokio::test]
async fn test_duplicate_session_id_is_rejected() {
    let mut ws = WsHarness::new();
    let first = ws.create("abc");
    ws.result_for(first).await;

    let second = ws.create("abc");
    let result = ws.result_for(second).await;
    assert_eq!(result["success"], false);
    assert_eq!(result["error"]["code"], "session_exists");
}

#[tokio::test]
async fn test_malformed_and_unknown_frames() {
    let mut ws = WsHarness::new();
    ws.connection.handle_text("{not json");
    let frame = ws.next_frame().await;
    assert_eq!(frame["id"], 0);
    assert_eq!(frame["error"]["code"], "invalid_format");

    let id = ws.send("console/teleport", json!({}));
    let frame = ws.result_for(id).await;
    assert_eq!(frame["error"]["code"], "unknown_command");
}

#[tokio::test]
async fn test_disconnect_removes_and_closes_sessions() {
    let mut ws = WsHarness::new();
    let create = ws.create("abc");
    ws.result_for(create).await;
    let session = ws.ctx.registry().get("abc").expect("session registered");

    let ctx = Arc::clone(&ws.ctx);
    drop(ws);

    assert!(session.is_closed());
    assert!(ctx.registry().get("abc").is_none());

    let mut other = WsHarness::with_context(Arc::clone(&ctx));
    other.input("abc", "1+1\n");
    assert!(other.drain().await.is_empty());
}

#[tokio::test]
async fn test_unsubscribe_closes_session() {
    let mut ws = WsHarness::new();
    let create = ws.create("abc");
    ws.result_for(create).await;

    let unsub = ws.send("unsubscribe_events", json!({ "subscription": create }));
    let result = ws.result_for(unsub).await;
    assert_eq!(result["success"], true);
    assert!(ws.ctx.registry().get("abc").is_none());
    assert_eq!(ws.connection.session_count(), 0);

    let again = ws.send("unsubscribe_events", json!({ "subscription": create }));
    let result = ws.result_for(again).await;
    assert_eq!(result["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let mut ws = WsHarness::new();
    let a = ws.create("a");
    ws.result_for(a).await;
    let b = ws.create("b");
    ws.result_for(b).await;

    ws.input("a", "x = 1\n");
    ws.input("b", "x\n");
    let b_output = ws.output_until(b, "is not defined").await;
    assert!(b_output.contains("name 'x' is not defined"));

    ws.input("a", "x + 1\n");
    ws.output_until(a, "\n2\n").await;

    ws.resize("a", 40, 10);
    let a_session = ws.ctx.registry().get("a").unwrap();
    let b_session = ws.ctx.registry().get("b").unwrap();
    assert_eq!(a_session.size(), Size::new(40, 10));
    assert_eq!(b_session.size(), Size::default());
}

#[tokio::test]
async fn test_resize_notifies_attached_application_once() {
    let ctx = ConsoleContext::new("test", 4);
    let prepared = ctx
        .prepare(
            SessionId::from("abc"),
            TransportKind::Websocket,
            Arc::new(RecordingWriter::default()),
            Size::default(),
        )
        .unwrap();
    let app = Arc::new(RecordingApp::default());
    let _binding = prepared.session().app_session().bind(app.clone());

    let mut ws = WsHarness::with_context(Arc::clone(&ctx));
    ws.resize("abc", 40, 10);

    assert_eq!(app.sizes(), vec![Size::new(40, 10)]);
    assert_eq!(prepared.session().size(), Size::new(40, 10));
}

#[tokio::test]
async fn test_quit_ends_session_and_unregisters() {
    let mut ws = WsHarness::new();
    let create = ws.create("abc");
    ws.result_for(create).await;
    let session = ws.ctx.registry().get("abc").unwrap();

    ws.input("abc", "quit\n");
    with_timeout(async {
        while ws.ctx.registry().get("abc").is_some() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(session.is_closed());
}
