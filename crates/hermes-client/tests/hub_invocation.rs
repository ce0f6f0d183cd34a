//! End-to-end scenarios for the hub invocation layer.

mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::timeout;

use hermes_client::{ClientConnection, ClientConnectionConfig, HubConnection, HubError};
use hermes_protocol::{HubMessage, HubProtocol, JsonHubProtocol, NullBinder};

use support::{shared_factory, TestTransport};

const WAIT: Duration = Duration::from_secs(5);

fn hub(transport: Arc<TestTransport>) -> HubConnection {
    let connection = ClientConnection::new(
        ClientConnectionConfig::default(),
        shared_factory(transport),
    );
    HubConnection::new(connection, Arc::new(JsonHubProtocol::new()))
}

/// Decode the hub messages inside an outbound frame.
fn decode(frame: &Bytes) -> Vec<HubMessage> {
    let protocol = JsonHubProtocol::new();
    let mut buf = BytesMut::from(frame.as_ref());
    let mut messages = Vec::new();
    protocol
        .try_parse_messages(&mut buf, &NullBinder, &mut messages)
        .expect("outbound frame should parse");
    messages
}

/// Encode a message the way the remote end would.
fn encode(message: &HubMessage) -> BytesMut {
    let protocol = JsonHubProtocol::new();
    let mut out = BytesMut::new();
    protocol
        .write_message(message, &mut out)
        .expect("message should encode");
    out
}

#[tokio::test]
async fn negotiation_record_is_sent_on_start() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));

    hub.start().await.unwrap();

    let frames = transport.wait_for_frames(1).await;
    assert_eq!(frames[0].as_ref(), b"{\"protocol\":\"json\"}\x1e");
}

#[tokio::test]
async fn invoke_resolves_when_completion_arrives() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));
    hub.start().await.unwrap();

    let invoking = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.invoke("Echo", vec![json!("hello")]).await })
    };

    // Frame 0 is the negotiation record, frame 1 the invocation.
    let frames = transport.wait_for_frames(2).await;
    let messages = decode(&frames[1]);
    let HubMessage::Invocation {
        invocation_id: Some(id),
        target,
        arguments,
        non_blocking,
    } = &messages[0]
    else {
        panic!("expected a blocking invocation, got {:?}", messages[0]);
    };
    assert_eq!(id, "1");
    assert_eq!(target, "Echo");
    assert_eq!(arguments, &vec![json!("hello")]);
    assert!(!non_blocking);

    transport
        .push(&encode(&HubMessage::completion_result(id.clone(), json!("hello, echoed"))))
        .await;

    let result = timeout(WAIT, invoking)
        .await
        .expect("invoke never resolved")
        .unwrap()
        .unwrap();
    assert_eq!(result, Some(json!("hello, echoed")));
}

#[tokio::test]
async fn invocation_ids_increase_monotonically() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));
    hub.start().await.unwrap();

    // Frame 0 is the negotiation record.
    transport.wait_for_frames(1).await;

    for (index, expected) in ["1", "2", "3"].into_iter().enumerate() {
        let invoking = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.invoke("Echo", vec![]).await })
        };
        let frames = transport.wait_for_frames(2 + index).await;
        let messages = decode(frames.last().unwrap());
        assert_eq!(messages[0].invocation_id(), Some(expected));

        transport
            .push(&encode(&HubMessage::completion_void(expected)))
            .await;
        timeout(WAIT, invoking).await.unwrap().unwrap().unwrap();
    }
}

#[tokio::test]
async fn invoke_fails_when_completion_carries_error() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));
    hub.start().await.unwrap();

    let invoking = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.invoke("Explode", vec![]).await })
    };

    let frames = transport.wait_for_frames(2).await;
    let id = decode(&frames[1])[0].invocation_id().unwrap().to_owned();
    transport
        .push(&encode(&HubMessage::completion_error(id, "target blew up")))
        .await;

    let err = timeout(WAIT, invoking)
        .await
        .expect("invoke never resolved")
        .unwrap()
        .unwrap_err();
    assert_eq!(err, HubError::InvocationFailed("target blew up".to_owned()));
}

#[tokio::test]
async fn server_invocation_routes_to_registered_handler() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));

    let calls: Arc<Mutex<Vec<Vec<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    hub.on("Notify", move |arguments| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(arguments);
        }
    });

    hub.start().await.unwrap();

    transport
        .push(&encode(&HubMessage::non_blocking_invocation(
            "Notify",
            vec![json!("ping"), json!(2)],
        )))
        .await;

    timeout(WAIT, async {
        loop {
            if !calls.lock().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("handler was never invoked");

    assert_eq!(calls.lock()[0], vec![json!("ping"), json!(2)]);

    // Target names are case-sensitive: "notify" does not match.
    transport
        .push(&encode(&HubMessage::non_blocking_invocation(
            "notify",
            vec![json!("lowercase")],
        )))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn stream_items_flow_until_completion() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));
    hub.start().await.unwrap();

    let mut stream = hub.invoke_stream("Counter", vec![json!(2)]).await.unwrap();
    let id = stream.invocation_id().to_owned();

    transport
        .push(&encode(&HubMessage::stream_item(id.clone(), json!(0))))
        .await;
    transport
        .push(&encode(&HubMessage::stream_item(id.clone(), json!(1))))
        .await;
    transport
        .push(&encode(&HubMessage::completion_void(id)))
        .await;

    assert_eq!(
        timeout(WAIT, stream.next()).await.unwrap(),
        Some(json!(0))
    );
    assert_eq!(
        timeout(WAIT, stream.next()).await.unwrap(),
        Some(json!(1))
    );
    assert_eq!(timeout(WAIT, stream.next()).await.unwrap(), None);
}

#[tokio::test]
async fn pending_invocations_fail_when_connection_closes() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));
    hub.start().await.unwrap();

    let invoking = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.invoke("Echo", vec![]).await })
    };
    transport.wait_for_frames(2).await;

    transport.fail_inbound("network dropped");

    let err = timeout(WAIT, invoking)
        .await
        .expect("invoke never resolved")
        .unwrap()
        .unwrap_err();
    let HubError::ConnectionClosed(reason) = err else {
        panic!("expected a connection-closed failure, got {err:?}");
    };
    assert!(reason.contains("network dropped"));
}

#[tokio::test]
async fn malformed_inbound_record_closes_the_connection() {
    let transport = TestTransport::new();
    let hub = hub(Arc::clone(&transport));
    hub.start().await.unwrap();

    let closed = hermes_transport::Completion::new();
    let signal = closed.clone();
    hub.connection().on_closed(move |error| {
        match error {
            Some(error) => signal.complete_with_error(error.to_string()),
            None => signal.complete(),
        };
    });

    transport.push(b"this is not a hub message\x1e").await;

    let reason = timeout(WAIT, closed.wait())
        .await
        .expect("connection never closed")
        .expect("close should carry the parse error");
    assert!(reason.contains("decode"), "unexpected close reason: {reason}");
}
