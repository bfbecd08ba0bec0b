//! Integration tests for DeliveryClient and DeliveryPipeline
//!
//! These post real HTTP requests to an httpmock collector.

use std::time::Duration;

use cardgate_core::{CardNormalizer, DeviceId, ScanEvent};
use cardgate_network::{
    DeliveryClient, DeliveryConfig, DeliveryError, DeliveryOutcome, DeliveryPipeline, Url,
};
use httpmock::prelude::*;
use tokio::time::{Instant, sleep, sleep_until};

fn scan(raw: &str) -> ScanEvent {
    let card = CardNormalizer::new().normalize(raw).unwrap();
    ScanEvent::new(card, DeviceId::new("gate-01").unwrap())
}

fn config_for(server: &MockServer) -> DeliveryConfig {
    let endpoint: Url = server.url("/scans").parse().unwrap();
    DeliveryConfig::new(endpoint).with_retries(3, Duration::from_millis(50))
}

/// Successful delivery posts the event as JSON exactly once
#[tokio::test]
async fn test_delivers_json_body() {
    let server = MockServer::start_async().await;
    let event = scan("111111");
    let expected_body = serde_json::to_value(&event).unwrap();

    let collector = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/scans")
                .header("content-type", "application/json")
                .json_body(expected_body);
            then.status(201);
        })
        .await;

    let client = DeliveryClient::new(config_for(&server)).unwrap();
    let event_id = event.id();
    let outcome = client.deliver(event).await;

    assert!(outcome.is_delivered());
    assert_eq!(outcome.event_id(), event_id);
    assert_eq!(outcome.attempts(), 1);
    collector.assert_async().await;
}

/// The bearer token is sent when configured
#[tokio::test]
async fn test_sends_bearer_token() {
    let server = MockServer::start_async().await;
    let collector = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/scans")
                .header("authorization", "Bearer s3cret");
            then.status(200);
        })
        .await;

    let client = DeliveryClient::new(config_for(&server).with_auth_token("s3cret")).unwrap();
    let outcome = client.deliver(scan("6017700010001111")).await;

    assert!(outcome.is_delivered());
    collector.assert_async().await;
}

/// A collector that always fails gets exactly `max_attempts` calls, one per
/// retry delay, and `deliver` returns right after the last one
#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    const RETRY: Duration = Duration::from_millis(300);

    let server = MockServer::start_async().await;
    let collector = server
        .mock_async(|when, then| {
            when.method(POST).path("/scans");
            then.status(500);
        })
        .await;

    let client = DeliveryClient::new(config_for(&server).with_retries(3, RETRY)).unwrap();
    let started = Instant::now();
    let task = tokio::spawn(async move {
        let outcome = client.deliver(scan("111111")).await;
        (outcome, started.elapsed())
    });

    // Sample half-way between attempts: one new call per retry delay.
    for (expected_hits, at) in [(1, RETRY / 2), (2, RETRY * 3 / 2), (3, RETRY * 5 / 2)] {
        sleep_until(started + at).await;
        assert_eq!(collector.hits_async().await, expected_hits, "calls after {at:?}");
    }
    assert!(task.is_finished(), "no sleep may follow the last attempt");

    let (outcome, elapsed) = task.await.unwrap();
    assert!(elapsed >= RETRY * 2, "attempts not spaced: {elapsed:?}");
    assert!(elapsed < RETRY * 5 / 2, "slept after the last attempt: {elapsed:?}");
    match outcome {
        DeliveryOutcome::GaveUp {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(matches!(last_error, DeliveryError::Status { status: 500 }));
        }
        other => panic!("expected give-up, got {other:?}"),
    }

    sleep(RETRY * 2).await;
    collector.assert_hits_async(3).await;
}

/// Non-success statuses other than 5xx are retried the same way
#[tokio::test]
async fn test_client_error_status_is_retried() {
    let server = MockServer::start_async().await;
    let collector = server
        .mock_async(|when, then| {
            when.method(POST).path("/scans");
            then.status(401);
        })
        .await;

    let config = config_for(&server).with_retries(2, Duration::from_millis(10));
    let outcome = DeliveryClient::new(config)
        .unwrap()
        .deliver(scan("42"))
        .await;

    assert_eq!(outcome.attempts(), 2);
    assert!(!outcome.is_delivered());
    collector.assert_hits_async(2).await;
}

/// An unreachable collector is a transport failure, retried like any other
#[tokio::test]
async fn test_unreachable_collector() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let endpoint: Url = format!("http://127.0.0.1:{port}/scans").parse().unwrap();
    let config = DeliveryConfig::new(endpoint).with_retries(2, Duration::from_millis(10));

    let outcome = DeliveryClient::new(config)
        .unwrap()
        .deliver(scan("42"))
        .await;

    match outcome {
        DeliveryOutcome::GaveUp {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 2);
            assert!(matches!(last_error, DeliveryError::Transport(_)));
        }
        other => panic!("expected give-up, got {other:?}"),
    }
}

/// A slow collector hits the per-request timeout
#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/scans");
            then.status(200).delay(Duration::from_millis(500));
        })
        .await;

    let config = config_for(&server)
        .with_retries(1, Duration::ZERO)
        .with_request_timeout(Duration::from_millis(100));
    let outcome = DeliveryClient::new(config)
        .unwrap()
        .deliver(scan("42"))
        .await;

    match outcome {
        DeliveryOutcome::GaveUp { last_error, .. } => {
            assert!(matches!(last_error, DeliveryError::Timeout(100)));
        }
        other => panic!("expected give-up, got {other:?}"),
    }
}

/// Zero configured attempts still makes one attempt
#[tokio::test]
async fn test_zero_attempts_means_one() {
    let server = MockServer::start_async().await;
    let collector = server
        .mock_async(|when, then| {
            when.method(POST).path("/scans");
            then.status(503);
        })
        .await;

    let config = config_for(&server).with_retries(0, Duration::ZERO);
    let outcome = DeliveryClient::new(config)
        .unwrap()
        .deliver(scan("42"))
        .await;

    assert_eq!(outcome.attempts(), 1);
    collector.assert_hits_async(1).await;
}

/// Events are delivered concurrently and each reports its own outcome
#[tokio::test]
async fn test_pipeline_delivers_all_events() {
    let server = MockServer::start_async().await;
    let collector = server
        .mock_async(|when, then| {
            when.method(POST).path("/scans");
            then.status(200);
        })
        .await;

    let mut pipeline = DeliveryPipeline::new(DeliveryClient::new(config_for(&server)).unwrap());
    let mut expected = Vec::new();
    for raw in ["1", "22", "333"] {
        let event = scan(raw);
        expected.push(event.id());
        pipeline.dispatch(event);
    }
    assert_eq!(pipeline.in_flight(), 3);

    let mut delivered = Vec::new();
    while let Some(outcome) = pipeline.next_finished().await {
        assert!(outcome.is_delivered());
        delivered.push(outcome.event_id());
    }

    delivered.sort();
    expected.sort();
    assert_eq!(delivered, expected);
    assert!(pipeline.is_idle());
    collector.assert_hits_async(3).await;
}

/// Shutdown aborts in-flight deliveries instead of draining them
#[tokio::test]
async fn test_pipeline_abandon() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/scans");
            then.status(200).delay(Duration::from_secs(5));
        })
        .await;

    let mut pipeline = DeliveryPipeline::new(DeliveryClient::new(config_for(&server)).unwrap());
    pipeline.dispatch(scan("1"));
    pipeline.dispatch(scan("2"));
    sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    assert_eq!(pipeline.abandon().await, 2);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(pipeline.in_flight(), 0);
    assert!(pipeline.next_finished().await.is_none());
}
