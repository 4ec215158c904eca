use scene_diff::{ChangeDetectorWorker, ChangeRequest, DetectorError, WorkerConfig};
use scene_test_utils::{init_tracing, DashboardFixture};
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn request_with_from(from: &str) -> ChangeRequest {
    let initial = DashboardFixture::new("W").panel(1, "A").time("now-1h", "now").build();
    let changed = DashboardFixture::new("W").panel(1, "A").time(from, "now").build();
    ChangeRequest::new(initial, changed).ignore_time_changes(true)
}

#[tokio::test(start_paused = true)]
async fn burst_collapses_into_last_request() {
    init_tracing();
    let (mut worker, mut results) =
        ChangeDetectorWorker::spawn(WorkerConfig::new().with_debounce(Duration::from_millis(200)));

    // First and second differ only in time; the last one is identical
    worker.submit(request_with_from("now-6h")).unwrap();
    sleep(Duration::from_millis(50)).await;
    worker.submit(request_with_from("now-12h")).unwrap();
    sleep(Duration::from_millis(50)).await;
    let last = worker.submit(request_with_from("now-1h")).unwrap();

    let outcome = results.recv().await.unwrap();
    assert_eq!(outcome.ticket, last);
    let info = outcome.result.unwrap();
    assert!(!info.has_changes);
    assert_eq!(info.has_time_changes, Some(false));

    assert!(timeout(Duration::from_secs(5), results.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn requests_outside_window_each_produce_a_result() {
    let (mut worker, mut results) = ChangeDetectorWorker::spawn(WorkerConfig::default());

    let first = worker.submit(request_with_from("now-6h")).unwrap();
    let first_outcome = results.recv().await.unwrap();

    let second = worker.submit(request_with_from("now-1h")).unwrap();
    let second_outcome = results.recv().await.unwrap();

    assert_eq!(first_outcome.ticket, first);
    assert_eq!(first_outcome.result.unwrap().has_time_changes, Some(true));
    assert_eq!(second_outcome.ticket, second);
    assert_eq!(second_outcome.result.unwrap().has_time_changes, Some(false));
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_request() {
    let (mut worker, mut results) = ChangeDetectorWorker::spawn(WorkerConfig::default());
    let ticket = worker.submit(request_with_from("now-6h")).unwrap();

    worker.shutdown().await.unwrap();

    let outcome = results.recv().await.unwrap();
    assert_eq!(outcome.ticket, ticket);
    assert!(results.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn invalid_message_is_rejected_before_queueing() {
    let (mut worker, _results) = ChangeDetectorWorker::spawn(WorkerConfig::default());

    let err = worker.submit_message("{\"changed\": {}}").unwrap_err();

    assert!(matches!(err, DetectorError::InvalidMessage(_)));
    assert!(!err.is_retryable());
}
