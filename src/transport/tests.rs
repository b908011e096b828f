use crate::broker::Registry;
use crate::client::Endpoint;
use crate::transport::dispatch::{dispatch, handle_frame};
use crate::transport::message::{ClientMessage, CommandKind};
use crate::transport::session::{CloseReason, Session};
use bytes::Bytes;
use futures::channel::mpsc;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tungstenite::protocol::Message as WsMessage;

type Inbound = mpsc::UnboundedSender<Result<WsMessage, String>>;

fn text(value: serde_json::Value) -> WsMessage {
    WsMessage::text(value.to_string())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Spawns a session wired to in-memory channels.
fn spawn_session(
    registry: &Arc<Registry>,
    capacity: usize,
) -> (
    Endpoint,
    Inbound,
    mpsc::UnboundedReceiver<WsMessage>,
    tokio::task::JoinHandle<CloseReason>,
) {
    let session = Session::new(registry.clone(), capacity);
    let endpoint = session.endpoint().clone();
    let (in_tx, in_rx) = mpsc::unbounded::<Result<WsMessage, String>>();
    let (out_tx, out_rx) = mpsc::unbounded::<WsMessage>();
    let handle = tokio::spawn(session.run(out_tx, in_rx));
    (endpoint, in_tx, out_rx, handle)
}

async fn finished(handle: tokio::task::JoinHandle<CloseReason>) -> CloseReason {
    timeout(Duration::from_secs(2), handle)
        .await
        .expect("session did not finish")
        .expect("session panicked")
}

#[test]
fn test_decode_commands() {
    let cases = [
        (json!({"type": "subscribe", "topic": "a"}), CommandKind::Subscribe),
        (json!({"type": "unsubscribe", "topic": "a"}), CommandKind::Unsubscribe),
        (json!({"type": "publish", "topic": "a", "payload": [1, 2]}), CommandKind::Publish),
        (json!({"type": "shout", "topic": "a"}), CommandKind::Unknown),
        (json!({"type": "Subscribe", "topic": "a"}), CommandKind::Unknown),
    ];

    for (frame, kind) in cases {
        let msg = ClientMessage::decode(frame.to_string().as_bytes()).unwrap();
        assert_eq!(msg.kind, kind, "frame {frame}");
        assert_eq!(msg.topic, "a");
    }
}

#[test]
fn test_decode_missing_fields_default() {
    let msg = ClientMessage::decode(br#"{"topic":"a"}"#).unwrap();
    assert_eq!(msg.kind, CommandKind::Unknown);

    let msg = ClientMessage::decode(br#"{"type":"subscribe"}"#).unwrap();
    assert_eq!(msg.kind, CommandKind::Subscribe);
    assert_eq!(msg.topic, "");
}

#[test]
fn test_decode_rejects_malformed_frames() {
    let frames: [&[u8]; 5] = [
        b"not json",
        b"[1, 2, 3]",
        br#"{"type": 5, "topic": "a"}"#,
        br#"{"type": "publish", "topic": 42}"#,
        b"",
    ];
    for frame in frames {
        assert!(
            ClientMessage::decode(frame).is_err(),
            "{:?} should not decode",
            String::from_utf8_lossy(frame)
        );
    }
}

#[test]
fn test_dispatch_subscribe_and_unsubscribe() {
    let registry = Registry::new();
    let (a, _rx) = Endpoint::channel(4);
    let subscribe = ClientMessage {
        kind: CommandKind::Subscribe,
        topic: "chat".to_string(),
    };
    let unsubscribe = ClientMessage {
        kind: CommandKind::Unsubscribe,
        topic: "chat".to_string(),
    };

    dispatch(&registry, &a, &subscribe, Bytes::new());
    assert!(registry.is_subscribed("chat", &a));

    dispatch(&registry, &a, &unsubscribe, Bytes::new());
    assert!(!registry.is_subscribed("chat", &a));
}

#[test]
fn test_dispatch_unknown_is_ignored() {
    let registry = Registry::new();
    let (a, _rx) = Endpoint::channel(4);
    let unknown = ClientMessage {
        kind: CommandKind::Unknown,
        topic: "chat".to_string(),
    };

    dispatch(&registry, &a, &unknown, Bytes::new());
    assert_eq!(registry.topic_count(), 0);
}

#[test]
fn test_handle_publish_forwards_raw_frame() {
    let registry = Registry::new();
    let (publisher, _p_rx) = Endpoint::channel(4);
    let (subscriber, mut s_rx) = Endpoint::channel(4);
    registry.subscribe("chat", &subscriber);

    let frame = Bytes::from_static(br#"{"type":"publish","topic":"chat","payload":"hello"}"#);
    handle_frame(&registry, &publisher, frame.clone()).unwrap();

    assert_eq!(s_rx.try_recv().unwrap(), frame);
}

#[test]
fn test_handle_frame_reports_decode_error() {
    let registry = Registry::new();
    let (a, _rx) = Endpoint::channel(4);
    assert!(handle_frame(&registry, &a, Bytes::from_static(b"{oops")).is_err());
}

#[tokio::test]
async fn session_forwards_published_frames() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, mut out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "chat"}))))
        .unwrap();
    wait_until(|| registry.is_subscribed("chat", &endpoint)).await;

    let frame = r#"{"type":"publish","topic":"chat","payload":"hi"}"#;
    registry.publish("chat", Bytes::from_static(frame.as_bytes()));
    let received = timeout(Duration::from_secs(2), out_rx.next())
        .await
        .expect("no message forwarded")
        .expect("sink closed");
    assert_eq!(received, WsMessage::text(frame));

    drop(in_tx);
    assert!(matches!(finished(handle).await, CloseReason::PeerClosed));
    assert!(registry.topics_of(&endpoint).is_empty());
}

#[tokio::test]
async fn session_receives_its_own_publish_verbatim() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, mut out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "echo"}))))
        .unwrap();
    wait_until(|| registry.is_subscribed("echo", &endpoint)).await;

    let frame = r#"{"type":"publish","topic":"echo","extra":{"n":1}}"#;
    in_tx.unbounded_send(Ok(WsMessage::text(frame))).unwrap();

    let received = timeout(Duration::from_secs(2), out_rx.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.into_data(), Bytes::from_static(frame.as_bytes()));

    drop(in_tx);
    finished(handle).await;
}

#[tokio::test]
async fn session_accepts_binary_commands() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, _out_rx, handle) = spawn_session(&registry, 8);

    let frame = json!({"type": "subscribe", "topic": "bin"}).to_string();
    in_tx
        .unbounded_send(Ok(WsMessage::Binary(Bytes::from(frame))))
        .unwrap();
    wait_until(|| registry.is_subscribed("bin", &endpoint)).await;

    drop(in_tx);
    finished(handle).await;
}

#[tokio::test]
async fn session_forwards_non_utf8_as_binary() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, mut out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "raw"}))))
        .unwrap();
    wait_until(|| registry.is_subscribed("raw", &endpoint)).await;

    registry.publish("raw", Bytes::from_static(&[0xff, 0xfe]));
    let received = timeout(Duration::from_secs(2), out_rx.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, WsMessage::Binary(Bytes::from_static(&[0xff, 0xfe])));

    drop(in_tx);
    finished(handle).await;
}

#[tokio::test]
async fn session_ignores_unknown_commands_and_pings() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, _out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "shout", "topic": "x"}))))
        .unwrap();
    in_tx
        .unbounded_send(Ok(WsMessage::Ping(Bytes::from_static(b"p"))))
        .unwrap();
    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "after"}))))
        .unwrap();
    wait_until(|| registry.is_subscribed("after", &endpoint)).await;
    assert!(!handle.is_finished());

    drop(in_tx);
    finished(handle).await;
}

#[tokio::test]
async fn session_ends_on_decode_error() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, _out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "t1"}))))
        .unwrap();
    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "t2"}))))
        .unwrap();
    in_tx
        .unbounded_send(Ok(WsMessage::text("definitely not json")))
        .unwrap();

    assert!(matches!(finished(handle).await, CloseReason::Decode(_)));
    assert!(registry.topics_of(&endpoint).is_empty());
    assert_eq!(registry.topic_count(), 0);
    registry.assert_consistent();
}

#[tokio::test]
async fn session_ends_on_close_frame() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, _out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "t"}))))
        .unwrap();
    in_tx.unbounded_send(Ok(WsMessage::Close(None))).unwrap();

    assert!(matches!(finished(handle).await, CloseReason::PeerClosed));
    assert!(!registry.is_subscribed("t", &endpoint));
}

#[tokio::test]
async fn session_ends_on_read_error() {
    let registry = Arc::new(Registry::new());
    let (_endpoint, in_tx, _out_rx, handle) = spawn_session(&registry, 8);

    in_tx.unbounded_send(Err("connection reset".to_string())).unwrap();

    match finished(handle).await {
        CloseReason::Read(e) => assert_eq!(e, "connection reset"),
        other => panic!("unexpected close reason: {other}"),
    }
}

#[tokio::test]
async fn session_ends_on_write_error() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, out_rx, handle) = spawn_session(&registry, 8);

    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "t"}))))
        .unwrap();
    wait_until(|| registry.is_subscribed("t", &endpoint)).await;

    // the network side goes away; the next write fails
    drop(out_rx);
    registry.publish("t", Bytes::from_static(b"{}"));

    assert!(matches!(finished(handle).await, CloseReason::Write(_)));
    assert!(!registry.is_subscribed("t", &endpoint));
    drop(in_tx);
}

#[tokio::test]
async fn write_error_with_queued_subscribe_leaves_no_subscriptions() {
    let registry = Arc::new(Registry::new());

    for round in 0..100 {
        let (endpoint, in_tx, out_rx, handle) = spawn_session(&registry, 8);
        in_tx
            .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "t"}))))
            .unwrap();
        wait_until(|| registry.is_subscribed("t", &endpoint)).await;

        // the write fails while another subscribe is still waiting to be read
        drop(out_rx);
        registry.publish("t", Bytes::from_static(b"{}"));
        in_tx
            .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "late"}))))
            .unwrap();

        assert!(matches!(finished(handle).await, CloseReason::Write(_)));
        assert!(
            registry.topics_of(&endpoint).is_empty(),
            "round {round}: closed session still subscribed"
        );
        drop(in_tx);
    }

    assert_eq!(registry.topic_count(), 0);
    registry.assert_consistent();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_error_during_subscribe_burst_leaves_no_subscriptions() {
    let registry = Arc::new(Registry::new());
    let (endpoint, in_tx, out_rx, handle) = spawn_session(&registry, 8);
    in_tx
        .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": "t"}))))
        .unwrap();
    wait_until(|| registry.is_subscribed("t", &endpoint)).await;

    for i in 0..200 {
        in_tx
            .unbounded_send(Ok(text(json!({"type": "subscribe", "topic": format!("s{i}")}))))
            .unwrap();
    }
    drop(out_rx);
    registry.publish("t", Bytes::from_static(b"{}"));

    assert!(matches!(finished(handle).await, CloseReason::Write(_)));
    assert!(registry.topics_of(&endpoint).is_empty());
    assert_eq!(registry.topic_count(), 0);
    registry.assert_consistent();
}

#[tokio::test]
async fn slow_session_does_not_block_others() {
    let registry = Arc::new(Registry::new());

    // a sink nobody reads from: the write loop stalls after one message and
    // the slow endpoint's queue (capacity 1) fills up behind it
    let slow = Session::new(registry.clone(), 1);
    let slow_endpoint = slow.endpoint().clone();
    let (slow_in, slow_in_rx) = mpsc::unbounded::<Result<WsMessage, String>>();
    let (slow_out, _slow_out_rx) = mpsc::channel::<WsMessage>(0);
    let slow_handle = tokio::spawn(slow.run(slow_out, slow_in_rx));

    let (fast, fast_in, mut fast_out, fast_handle) = spawn_session(&registry, 64);
    registry.subscribe("t", &slow_endpoint);
    registry.subscribe("t", &fast);

    for i in 0..20 {
        registry.publish("t", Bytes::from(format!("m{i}")));
        tokio::task::yield_now().await;
    }

    for i in 0..20 {
        let received = timeout(Duration::from_secs(2), fast_out.next())
            .await
            .expect("fast subscriber starved")
            .unwrap();
        assert_eq!(received, WsMessage::text(format!("m{i}")));
    }

    drop(fast_in);
    finished(fast_handle).await;
    // teardown must not wait on the stalled sink
    drop(slow_in);
    assert!(matches!(finished(slow_handle).await, CloseReason::PeerClosed));
    assert!(!registry.is_subscribed("t", &slow_endpoint));
}
