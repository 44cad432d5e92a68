//! Producer/consumer flows over the in-memory transport

mod common;

use common::{body_text, fast_consumer, init_tracing};
use futures::StreamExt;
use queue_adapter::{
    AttributeValue, InMemoryTransport, ListenOptions, QueueAdapter, Request, SendOptions, Service,
    TransportAdapter,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn memory_adapter() -> (Arc<InMemoryTransport>, TransportAdapter<InMemoryTransport>) {
    let transport = Arc::new(InMemoryTransport::default());
    let adapter = TransportAdapter::from_shared(Arc::clone(&transport))
        .with_consumer_config(fast_consumer())
        .unwrap();
    (transport, adapter)
}

/// Every sent message is delivered once, in order, and removed afterwards.
#[tokio::test(start_paused = true)]
async fn test_messages_delivered_once_in_order() {
    init_tracing();
    let (transport, adapter) = memory_adapter();
    let service = Service::new("memory://orders").unwrap();

    for n in 0..25 {
        adapter
            .send(&service, Request::new(format!("order-{}", n)))
            .await
            .unwrap();
    }

    let stream = adapter.listen(&service).unwrap();
    let bodies: Vec<String> = stream.take(25).map(|event| body_text(&event)).collect().await;

    let expected: Vec<String> = (0..25).map(|n| format!("order-{}", n)).collect();
    assert_eq!(bodies, expected);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.queue_depth(service.addr()), 0);
}

/// A listener shut down before anything was read leaves the message on the
/// queue, and it is delivered again once its visibility timeout expires.
#[tokio::test(start_paused = true)]
async fn test_unread_message_survives_shutdown() {
    init_tracing();
    let (transport, adapter) = memory_adapter();
    let service = Service::new("memory://payments").unwrap();
    adapter
        .send(&service, Request::new("charge"))
        .await
        .unwrap();

    let stream = adapter.listen(&service).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    stream.shutdown().await;

    assert_eq!(transport.queue_depth(service.addr()), 1);
    assert_eq!(transport.in_flight_count(service.addr()), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let mut stream = adapter.listen(&service).unwrap();
    let event = stream.recv().await.unwrap();
    assert_eq!(body_text(&event), "charge");

    stream.shutdown().await;
    assert_eq!(transport.queue_depth(service.addr()), 0);
}

/// Two listeners on one queue share the work without duplicates.
#[tokio::test(start_paused = true)]
async fn test_competing_listeners() {
    init_tracing();
    let (_transport, adapter) = memory_adapter();
    let service = Service::new("memory://jobs").unwrap();

    let first = adapter.listen(&service).unwrap();
    let second = adapter.listen(&service).unwrap();

    for n in 0..20 {
        adapter
            .send(&service, Request::new(format!("job-{}", n)))
            .await
            .unwrap();
    }

    let merged = futures::stream::select(first, second);
    let seen: HashSet<String> = merged.take(20).map(|event| body_text(&event)).collect().await;

    assert_eq!(seen.len(), 20);
    adapter.shutdown();
}

/// Requested attributes travel with the message; others are left behind.
#[tokio::test(start_paused = true)]
async fn test_attribute_round_trip() {
    init_tracing();
    let (_transport, adapter) = memory_adapter();
    let service = Service::new("memory://events").unwrap();

    let request = Request::new("payload")
        .with_attribute("tenant", AttributeValue::string("acme").unwrap())
        .unwrap()
        .with_attribute("trace.id", AttributeValue::string("abc-123").unwrap())
        .unwrap();
    let options = SendOptions::new()
        .with_attribute("weight", AttributeValue::number(2.5).unwrap())
        .unwrap()
        .with_attribute("digest", AttributeValue::binary(vec![0xde, 0xad]).unwrap())
        .unwrap();
    adapter
        .send_with_options(&service, request, options)
        .await
        .unwrap();

    let listen = ListenOptions::new()
        .with_attribute_name("tenant")
        .with_attribute_name("weight")
        .with_attribute_name("digest");
    let mut stream = adapter.listen_with_options(&service, listen).unwrap();
    let message = stream.recv().await.unwrap().into_result().unwrap();

    assert_eq!(message.attributes.len(), 3);
    assert_eq!(message.attributes["tenant"].as_text(), Some("acme"));
    assert_eq!(message.attributes["weight"].as_text(), Some("2.5"));
    assert_eq!(
        message.attributes["digest"].as_binary().map(|b| b.to_vec()),
        Some(vec![0xde, 0xad])
    );
    assert!(!message.attributes.contains_key("trace.id"));
}

/// Delayed sends show up on the stream only after their delay.
#[tokio::test(start_paused = true)]
async fn test_delayed_send() {
    init_tracing();
    let (_transport, adapter) = memory_adapter();
    let service = Service::new("memory://reminders").unwrap();

    let options = SendOptions::new().with_delay_seconds(30).unwrap();
    adapter
        .send_with_options(&service, Request::new("later"), options)
        .await
        .unwrap();

    let mut stream = adapter.listen(&service).unwrap();
    let early = tokio::time::timeout(Duration::from_secs(10), stream.recv()).await;
    assert!(early.is_err());

    let event = tokio::time::timeout(Duration::from_secs(60), stream.recv())
        .await
        .expect("message after delay")
        .unwrap();
    assert_eq!(body_text(&event), "later");
}
