//! request → dispatch → encode → cache の一連の流れ

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use conduit_core::app::Exchange;
use conduit_core::cache::{Cache, CacheKey};
use conduit_core::codec;
use conduit_core::domain::{DataType, ElementId, Envelope, MessageType, Resolution, Value};
use conduit_core::ports::{ManualClock, MemoryRecordSink, ScannedFact, StaticScanner};

fn scanner() -> StaticScanner {
    StaticScanner::new(
        "model",
        vec![
            ScannedFact::new("door-42", "Single Flush")
                .with_element_id(987)
                .with_category("OST_Doors")
                .with_value("Mark", "D1"),
            ScannedFact::new("wall-7", "Basic Wall").with_element_id(311),
        ],
    )
}

#[tokio::test]
async fn request_round_trips_through_the_wire() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = Arc::new(Cache::new(clock.clone(), Duration::from_secs(3600)));
    let sink = Arc::new(MemoryRecordSink::new());
    let exchange = Exchange::builder()
        .scanner(scanner())
        .record_sink(sink.clone())
        .cache(Arc::clone(&cache))
        .build()
        .unwrap();

    // クライアント側: request を wire に書いて送る
    let request = Envelope::read(["door-42", "wall-7"]);
    assert_eq!(request.data_type(), DataType::Array);
    let wire = codec::write_envelope(&request).unwrap();

    // サーバ側: 読んで解決して書き戻す
    let received = codec::read_envelope(&wire).unwrap();
    assert_eq!(received, request);
    let resolved = exchange.resolve(&received).await.unwrap();
    let reply = codec::write_envelope(&resolved).unwrap();

    // クライアント側: 結果を読む
    let result = codec::read_envelope(&reply).unwrap();
    assert_eq!(result.id(), request.id());
    assert_eq!(result.message_type(), MessageType::Result);
    assert_eq!(result.result(), Some(Resolution::Accepted));
    let door = &result.payload()[0];
    assert_eq!(door.unique_id, "door-42");
    assert_eq!(door.element_id, ElementId::new(987));
    assert_eq!(door.element_type_id, ElementId::INVALID);
    assert_eq!(
        door.parameter("Mark").and_then(|p| p.value.as_deref()),
        Some("D1")
    );

    // 解決済み Envelope は Identifier でキャッシュにある
    let parked = cache.get(&CacheKey::from(result.id())).unwrap().unwrap();
    assert_eq!(parked.as_envelope(), Some(&resolved));

    // Put した entry は sink にエンコードされて届く
    let put = Envelope::add("echo", "scanned entries", result.payload().to_vec());
    exchange.resolve(&put).await.unwrap();
    let stored: Vec<_> = sink
        .records()
        .into_iter()
        .map(|(uid, bytes)| (uid, codec::read_entry(&bytes).unwrap()))
        .collect();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].1, result.payload()[0]);

    // 触られないまま TTL が過ぎると消える
    let cached = cache.len();
    clock.advance(TimeDelta::hours(2));
    assert_eq!(cache.purge_expired(), cached);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn alias_entries_follow_the_sliding_window() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let cache = Cache::new(clock.clone(), Duration::from_secs(60));
    let key = CacheKey::alias("abc123").unwrap();

    cache
        .create(key.clone(), Value::map([("name", "door-42")]))
        .unwrap();
    assert!(cache.get(&key).unwrap().is_some());

    clock.advance(TimeDelta::seconds(60));
    assert!(cache.get(&key).unwrap().is_none());
}
