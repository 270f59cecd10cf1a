use connector_sdk::config::ConfigMap;
use connector_sdk::context::Context;
use connector_sdk::destination::memory::{CAPACITY_KEY, MemoryDestination, NAME_KEY};
use connector_sdk::destination::{Destination, Record};
use connector_sdk::error::ErrorKind;
use connector_sdk::middleware::{
    BATCH_DELAY_KEY, BATCH_SIZE_KEY, DestinationExt, DestinationWithBatch,
    DestinationWithRateLimit, RATE_BURST_KEY, RATE_PER_SECOND_KEY, with_default_middleware,
};
use connector_sdk::parameter::validate_config;
use connector_telemetry::init_test_tracing;
use futures::stream;
use std::time::Duration;
use tokio::time::Instant;

fn config(pairs: &[(&str, &str)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn records(count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| Record::with_key(format!("key-{i}"), format!("payload-{i}")))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn memory_destination_through_both_middlewares() {
    init_test_tracing();

    let memory = MemoryDestination::new();
    let mut destination = memory
        .clone()
        .with(DestinationWithRateLimit::new(100.0, 10))
        .with(DestinationWithBatch::new(3, Duration::from_secs(1)));
    let ctx = Context::background();

    let mut raw = config(&[(NAME_KEY, "orders")]);
    validate_config(&destination.parameters(), &raw).unwrap();
    destination.configure(&ctx, &mut raw).await.unwrap();
    destination.open(&ctx).await.unwrap();

    let written = destination
        .write_stream(&ctx, stream::iter(records(7)))
        .await
        .unwrap();
    destination.teardown(&ctx).await.unwrap();

    assert_eq!(written, 7);
    assert_eq!(memory.records().await, records(7));
    assert_eq!(memory.batches().await, vec![3, 3, 1]);
    assert_eq!(memory.batch_flags().await, vec![true, true, true]);
    assert!(!memory.is_open().await);

    let seen = memory.raw_config().await;
    assert_eq!(seen[NAME_KEY], "orders");
    assert_eq!(seen[BATCH_SIZE_KEY], "3");
    assert_eq!(seen[BATCH_DELAY_KEY], "1s");
    assert_eq!(seen[RATE_PER_SECOND_KEY], "100");
    assert_eq!(seen[RATE_BURST_KEY], "10");
}

#[tokio::test]
async fn stacked_parameters_are_validated() {
    init_test_tracing();

    let destination = with_default_middleware(MemoryDestination::new());
    let parameters = destination.parameters();
    assert_eq!(parameters.len(), 6);

    let raw = config(&[
        (CAPACITY_KEY, "-5"),
        (BATCH_SIZE_KEY, "ten"),
        (RATE_PER_SECOND_KEY, "2.5"),
    ]);
    let err = validate_config(&parameters, &raw).unwrap_err();

    assert_eq!(
        err.kinds(),
        vec![ErrorKind::ValidationError, ErrorKind::ValidationError]
    );
}

#[tokio::test]
async fn destination_errors_cross_the_middlewares() {
    init_test_tracing();

    let memory = MemoryDestination::new();
    let mut destination = with_default_middleware(memory.clone());
    let ctx = Context::background();

    destination
        .configure(&ctx, &mut config(&[(CAPACITY_KEY, "2")]))
        .await
        .unwrap();

    let err = destination.write(&ctx, records(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    destination.open(&ctx).await.unwrap();
    let err = destination.write(&ctx, records(3)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DestinationError);
    assert!(memory.records().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_a_throttled_stream() {
    init_test_tracing();

    let memory = MemoryDestination::new();
    let mut destination = memory
        .clone()
        .with(DestinationWithRateLimit::new(1.0, 1))
        .with(DestinationWithBatch::new(1, Duration::ZERO));
    let ctx = Context::background();

    destination
        .configure(&ctx, &mut ConfigMap::new())
        .await
        .unwrap();
    destination.open(&ctx).await.unwrap();

    let start = Instant::now();
    let ctx = ctx.with_timeout(Duration::from_millis(2500));
    let err = destination
        .write_stream(&ctx, stream::iter(records(5)))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    assert!(err.is_cancellation());
    assert_eq!(memory.records().await.len(), 3);
    assert!(start.elapsed() < Duration::from_millis(2500));
}
