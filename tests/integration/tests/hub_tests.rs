//! Hub Integration Tests
//!
//! Drive a hub in memory through `ChannelTransport`.
//!
//! Run with: cargo test -p integration-tests --test hub_tests

use integration_tests::{expect_closed, expect_silence, next_message};
use sse_common::DuplicatePolicy;
use sse_hub::{
    ChannelStream, ChannelTransport, Event, EventData, Hub, HubConfig, HubError, Payload,
    Subscription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

fn connect(hub: &Hub<String>, cid: &str) -> (Subscription<String>, ChannelStream) {
    let (transport, stream) = ChannelTransport::new(16);
    let sub = hub.connect(cid.to_string(), transport, None).unwrap();
    (sub, stream)
}

fn cids(list: &[&str]) -> Vec<String> {
    list.iter().map(|cid| (*cid).to_string()).collect()
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_broadcast_is_identical_for_every_consumer() {
    let hub = Hub::new(HubConfig::default());
    let mut streams: Vec<_> = ["a", "b", "c"].iter().map(|cid| connect(&hub, cid)).collect();

    let payload = Payload::new("hello").event("greet").id("1");
    hub.send(Event::Broadcast(payload)).await.unwrap();

    for (_, stream) in &mut streams {
        assert_eq!(
            next_message(stream).await.unwrap(),
            "event:greet\ndata:hello\nid:1\nretry:3000\n\n"
        );
    }
}

#[tokio::test]
async fn test_targeted_and_excluded_addressing() {
    let hub = Hub::new(HubConfig::default());
    let (_a, mut a) = connect(&hub, "a");
    let (_b, mut b) = connect(&hub, "b");
    let (_c, mut c) = connect(&hub, "c");

    hub.send(Event::Targeted {
        cids: cids(&["a", "c", "unknown"]),
        payload: Payload::new("only"),
    })
    .await
    .unwrap();
    hub.send(Event::Excluded {
        cids: cids(&["a"]),
        payload: Payload::new("except"),
    })
    .await
    .unwrap();
    hub.send(Event::Broadcast(Payload::new("end"))).await.unwrap();

    assert_eq!(next_message(&mut a).await.unwrap(), "data:only\nretry:3000\n\n");
    assert_eq!(next_message(&mut a).await.unwrap(), "data:end\n\n");

    assert_eq!(next_message(&mut b).await.unwrap(), "data:except\nretry:3000\n\n");
    assert_eq!(next_message(&mut b).await.unwrap(), "data:end\n\n");

    assert_eq!(next_message(&mut c).await.unwrap(), "data:only\nretry:3000\n\n");
    assert_eq!(next_message(&mut c).await.unwrap(), "data:except\n\n");
    assert_eq!(next_message(&mut c).await.unwrap(), "data:end\n\n");
}

#[tokio::test]
async fn test_retry_only_on_first_message() {
    let hub = Hub::new(HubConfig::default().with_retry(Duration::from_secs(15)));
    let (_sub, mut stream) = connect(&hub, "a");

    hub.send(Event::Broadcast(Payload::new("hello").id("11")))
        .await
        .unwrap();
    hub.send(Event::Broadcast(Payload::new("again").id("12")))
        .await
        .unwrap();

    assert_eq!(
        next_message(&mut stream).await.unwrap(),
        "data:hello\nid:11\nretry:15000\n\n"
    );
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:again\nid:12\n\n");
}

#[tokio::test]
async fn test_multiline_data_formatting() {
    let hub = Hub::new(HubConfig::default());
    let (_sub, mut stream) = connect(&hub, "a");

    // first message carries retry; get it out of the way
    hub.send(Event::Broadcast(Payload::new("warmup"))).await.unwrap();
    next_message(&mut stream).await.unwrap();

    hub.send(Event::Broadcast(Payload::new("a\nb"))).await.unwrap();
    hub.send(Event::Broadcast(Payload::new(EventData::raw("a\nb"))))
        .await
        .unwrap();
    hub.send(Event::Broadcast(Payload::new("x").event("na\nme").id("1\n2")))
        .await
        .unwrap();

    assert_eq!(next_message(&mut stream).await.unwrap(), "data:a\ndata:b\n\n");
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:a\nb\n\n");
    assert_eq!(
        next_message(&mut stream).await.unwrap(),
        "event:name\ndata:x\nid:12\n\n"
    );
}

#[tokio::test]
async fn test_empty_first_message_gets_bare_retry() {
    let hub = Hub::new(HubConfig::default());
    let (_sub, mut stream) = connect(&hub, "a");

    hub.send(Event::Broadcast(Payload::default())).await.unwrap();
    assert_eq!(next_message(&mut stream).await.unwrap(), "retry:3000\n\n");
}

#[tokio::test]
async fn test_retry_update_applies_to_later_consumers() {
    let hub = Hub::new(HubConfig::default());
    let (_a, mut a) = connect(&hub, "a");

    hub.send(Event::Retry(Duration::from_secs(5))).await.unwrap();
    assert_eq!(next_message(&mut a).await.unwrap(), "retry:5000\n\n");
    assert_eq!(hub.retry(), Duration::from_secs(5));

    let (_b, mut b) = connect(&hub, "b");
    hub.send(Event::Broadcast(Payload::new("x"))).await.unwrap();

    assert_eq!(next_message(&mut a).await.unwrap(), "data:x\n\n");
    assert_eq!(next_message(&mut b).await.unwrap(), "data:x\nretry:5000\n\n");
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_recovery_events_precede_live_traffic() {
    let hub: Hub<String> = Hub::new(HubConfig::default());
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

    let replay = hub.clone();
    hub.on_reconnect(move |reconnect| {
        let hub = replay.clone();
        let seen = seen_tx.clone();
        async move {
            let _ = seen.send(reconnect.last_event_id().to_string());
            for n in 1..=2 {
                let event = Event::Recovery {
                    cid: reconnect.cid().clone(),
                    payload: Payload::new(format!("missed-{n}")),
                };
                hub.send(event).await.unwrap();
            }
            reconnect.stop_recovery().await;
        }
    });

    let (transport, mut stream) = ChannelTransport::new(16);
    let _sub = hub
        .connect("a".to_string(), transport, Some("41".to_string()))
        .unwrap();
    hub.send(Event::Broadcast(Payload::new("live"))).await.unwrap();

    assert_eq!(seen_rx.recv().await.as_deref(), Some("41"));
    assert_eq!(
        next_message(&mut stream).await.unwrap(),
        "data:missed-1\nretry:3000\n\n"
    );
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:missed-2\n\n");
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:live\n\n");
}

#[tokio::test]
async fn test_live_traffic_waits_for_stop_recovery() {
    let hub = Hub::new(HubConfig::default());
    let (handle_tx, mut handle_rx) = mpsc::unbounded_channel();

    hub.on_reconnect(move |reconnect| {
        let handles = handle_tx.clone();
        async move {
            let _ = handles.send(reconnect);
        }
    });

    let (transport, mut stream) = ChannelTransport::new(16);
    let _sub = hub
        .connect("a".to_string(), transport, Some("7".to_string()))
        .unwrap();
    let reconnect = handle_rx.recv().await.unwrap();

    hub.send(Event::Broadcast(Payload::new("live"))).await.unwrap();
    expect_silence(&mut stream).await.unwrap();

    reconnect.stop_recovery().await;
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:live\nretry:3000\n\n");
}

#[tokio::test]
async fn test_live_traffic_beyond_consumer_buffer_during_recovery() {
    let hub = Hub::new(HubConfig::default().with_consumer_buffer(2));
    let (handle_tx, mut handle_rx) = mpsc::unbounded_channel();

    hub.on_reconnect(move |reconnect| {
        let handles = handle_tx.clone();
        async move {
            let _ = handles.send(reconnect);
        }
    });

    let (transport, mut stream) = ChannelTransport::new(16);
    let _sub = hub
        .connect("a".to_string(), transport, Some("7".to_string()))
        .unwrap();
    let reconnect = handle_rx.recv().await.unwrap();

    for n in 0..4 {
        hub.send(Event::Broadcast(Payload::new(format!("live-{n}"))))
            .await
            .unwrap();
    }
    hub.send(Event::Recovery {
        cid: "a".to_string(),
        payload: Payload::new("missed"),
    })
    .await
    .unwrap();

    // other consumers keep receiving while "a" is still recovering
    let (_b, mut b) = connect(&hub, "b");
    hub.send(Event::Broadcast(Payload::new("after"))).await.unwrap();
    assert_eq!(next_message(&mut b).await.unwrap(), "data:after\nretry:3000\n\n");

    reconnect.stop_recovery().await;

    assert_eq!(next_message(&mut stream).await.unwrap(), "data:missed\nretry:3000\n\n");
    for n in 0..4 {
        assert_eq!(
            next_message(&mut stream).await.unwrap(),
            format!("data:live-{n}\n\n")
        );
    }
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:after\n\n");
}

#[tokio::test]
async fn test_dropped_reconnect_ends_recovery() {
    let hub = Hub::new(HubConfig::default());
    hub.on_reconnect(|_reconnect| async {});

    let (transport, mut stream) = ChannelTransport::new(16);
    let _sub = hub
        .connect("a".to_string(), transport, Some("7".to_string()))
        .unwrap();

    hub.send(Event::Broadcast(Payload::new("live"))).await.unwrap();
    assert_eq!(next_message(&mut stream).await.unwrap(), "data:live\nretry:3000\n\n");
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_duplicate_cid_rejected() {
    let hub = Hub::new(HubConfig::default());
    let (_first, mut first) = connect(&hub, "a");

    let (transport, _stream) = ChannelTransport::new(16);
    let err = hub.connect("a".to_string(), transport, None).unwrap_err();
    assert!(matches!(err, HubError::DuplicateConsumer(_)));
    assert_eq!(hub.count_consumers(), 1);

    // the live consumer is untouched
    hub.send(Event::Broadcast(Payload::new("x"))).await.unwrap();
    assert_eq!(next_message(&mut first).await.unwrap(), "data:x\nretry:3000\n\n");
}

#[tokio::test]
async fn test_duplicate_cid_evicts_under_evict_policy() {
    let hub = Hub::new(HubConfig::default().with_duplicate_policy(DuplicatePolicy::Evict));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    hub.on_disconnect(move |_cid| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let (first_sub, mut first) = connect(&hub, "a");
    let (_second_sub, mut second) = connect(&hub, "a");

    tokio::time::timeout(Duration::from_secs(5), first_sub.closed())
        .await
        .unwrap();
    expect_closed(&mut first).await.unwrap();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(hub.count_consumers(), 1);

    hub.send(Event::Broadcast(Payload::new("x"))).await.unwrap();
    assert_eq!(next_message(&mut second).await.unwrap(), "data:x\nretry:3000\n\n");
}

#[tokio::test]
async fn test_count_tracks_connects_and_disconnects() {
    let hub = Hub::new(HubConfig::default());
    let mut subs = Vec::new();
    for n in 0..5 {
        subs.push(connect(&hub, &format!("c{n}")));
    }
    assert_eq!(hub.count_consumers(), 5);

    for (sub, stream) in subs {
        drop(stream);
        tokio::time::timeout(Duration::from_secs(5), sub.closed())
            .await
            .unwrap();
    }
    assert_eq!(hub.count_consumers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_count_settles_after_concurrent_connects_and_drops() {
    let hub = Hub::new(HubConfig::default());

    let mut connects = JoinSet::new();
    for n in 0..32 {
        let hub = hub.clone();
        connects.spawn(async move { connect(&hub, &format!("c{n}")) });
    }
    let mut subs = Vec::new();
    while let Some(joined) = connects.join_next().await {
        subs.push(joined.unwrap());
    }
    assert_eq!(hub.count_consumers(), 32);

    let mut drops = JoinSet::new();
    for (sub, stream) in subs {
        drops.spawn(async move {
            drop(stream);
            tokio::time::timeout(Duration::from_secs(5), sub.closed())
                .await
                .unwrap();
        });
    }
    while let Some(joined) = drops.join_next().await {
        joined.unwrap();
    }
    assert_eq!(hub.count_consumers(), 0);
}

#[tokio::test]
async fn test_broken_consumer_does_not_affect_others() {
    let hub = Hub::new(HubConfig::default());
    let (broken_sub, broken) = connect(&hub, "broken");
    let (_sub, mut healthy) = connect(&hub, "healthy");

    drop(broken);
    hub.send(Event::Broadcast(Payload::new("x"))).await.unwrap();

    assert_eq!(next_message(&mut healthy).await.unwrap(), "data:x\nretry:3000\n\n");
    tokio::time::timeout(Duration::from_secs(5), broken_sub.closed())
        .await
        .unwrap();
    assert_eq!(hub.count_consumers(), 1);
}

#[tokio::test]
async fn test_hooks_fire_on_connect_and_disconnect() {
    let hub = Hub::new(HubConfig::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let connected = events_tx.clone();
    hub.on_connect(move |cid: String| {
        let events = connected.clone();
        async move {
            let _ = events.send(format!("connect:{cid}"));
        }
    });
    hub.on_disconnect(move |cid: String| {
        let events = events_tx.clone();
        async move {
            let _ = events.send(format!("disconnect:{cid}"));
        }
    });

    let (sub, _stream) = connect(&hub, "a");
    assert_eq!(events_rx.recv().await.as_deref(), Some("connect:a"));

    sub.disconnect();
    assert_eq!(events_rx.recv().await.as_deref(), Some("disconnect:a"));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_close_terminates_consumers_and_rejects_new_work() {
    let hub = Hub::new(HubConfig::default());
    let disconnects = Arc::new(AtomicUsize::new(0));
    let counter = disconnects.clone();
    hub.on_disconnect(move |_cid| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let (_a, mut a) = connect(&hub, "a");
    let (_b, mut b) = connect(&hub, "b");

    hub.close().await;

    // close waits for every disconnect hook
    assert_eq!(disconnects.load(Ordering::SeqCst), 2);
    assert_eq!(hub.count_consumers(), 0);
    expect_closed(&mut a).await.unwrap();
    expect_closed(&mut b).await.unwrap();

    assert!(matches!(
        hub.send(Event::Broadcast(Payload::new("x"))).await,
        Err(HubError::Closed)
    ));
    let (transport, _stream) = ChannelTransport::new(1);
    assert!(matches!(
        hub.connect("c".to_string(), transport, None),
        Err(HubError::ShuttingDown)
    ));

    // a second close is a no-op
    hub.close().await;
    assert!(hub.is_closed());
}
