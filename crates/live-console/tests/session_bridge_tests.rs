mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingApp, RecordingWriter, with_timeout};
use live_console::session::open_session;
use live_console::terminal::{NewlineMode, Size};
use live_console::{SessionId, SessionRegistry};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn prop_feeds_arrive_concatenated_in_order(chunks in prop::collection::vec(".{0,12}", 0..24)) {
        let (session, mut reader) = open_session(
            SessionId::from("p"),
            Arc::new(RecordingWriter::default()),
            NewlineMode::Verbatim,
            Size::default(),
        );
        for chunk in &chunks {
            session.feed(chunk).unwrap();
        }
        session.close().unwrap();

        let received = runtime().block_on(async {
            let mut all = String::new();
            while let Some(text) = reader.recv().await {
                all.push_str(&text);
            }
            all
        });
        prop_assert_eq!(received, chunks.concat());
    }

    #[test]
    fn prop_size_query_reflects_last_resize(cols in 0u16..=u16::MAX, rows in 0u16..=u16::MAX, attach in any::<bool>()) {
        let (session, _reader) = open_session(
            SessionId::from("p"),
            Arc::new(RecordingWriter::default()),
            NewlineMode::CrLf,
            Size::default(),
        );
        let app = Arc::new(RecordingApp::default());
        let _binding = attach.then(|| session.app_session().bind(app.clone()));

        session.resize(cols, rows);
        prop_assert_eq!(session.size(), Size::new(cols, rows));
        prop_assert_eq!(session.output().get_size(), Size::new(cols, rows));
        prop_assert_eq!(app.sizes().len(), usize::from(attach));
    }
}

#[tokio::test]
async fn test_close_unblocks_waiting_reader() {
    let (session, mut reader) = open_session(
        SessionId::from("c"),
        Arc::new(RecordingWriter::default()),
        NewlineMode::Verbatim,
        Size::default(),
    );
    let waiter = tokio::spawn(async move { reader.recv().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.close().unwrap();
    assert_eq!(with_timeout(waiter).await.unwrap(), None);
    assert!(session.close().is_err());
}

#[tokio::test]
async fn test_sessions_do_not_share_input_or_size() {
    let registry = SessionRegistry::new();
    let (a, mut a_reader) = open_session(
        SessionId::from("a"),
        Arc::new(RecordingWriter::default()),
        NewlineMode::Verbatim,
        Size::default(),
    );
    let (b, mut b_reader) = open_session(
        SessionId::from("b"),
        Arc::new(RecordingWriter::default()),
        NewlineMode::Verbatim,
        Size::default(),
    );
    registry.insert(Arc::clone(&a)).unwrap();
    registry.insert(Arc::clone(&b)).unwrap();

    registry.get("a").unwrap().feed("for a").unwrap();
    registry.get("b").unwrap().resize(100, 30);
    a.close().unwrap();
    b.close().unwrap();

    assert_eq!(with_timeout(a_reader.recv()).await.as_deref(), Some("for a"));
    assert_eq!(with_timeout(a_reader.recv()).await, None);
    assert_eq!(with_timeout(b_reader.recv()).await, None);
    assert_eq!(a.size(), Size::default());
    assert_eq!(b.size(), Size::new(100, 30));
}

#[test]
fn test_ssh_output_is_crlf_normalised() {
    let writer = Arc::new(RecordingWriter::default());
    let (session, _reader) = open_session(
        SessionId::from("s"),
        writer.clone(),
        NewlineMode::CrLf,
        Size::default(),
    );
    session.output().write("a\nb\r\nc").unwrap();
    assert_eq!(writer.text(), "a\r\nb\r\nc");
}
