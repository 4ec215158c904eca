//! Background change detection
//!
//! Requests are posted to a tokio task over an unbounded channel, so
//! submitting never blocks the caller. The task applies a trailing debounce:
//! after a request arrives it waits for `debounce` of silence, replacing the
//! pending request with every newer one. Only the last request of a burst is
//! diffed; superseded requests are dropped without a result.
//!
//! The diff itself runs on the blocking pool. There is no retry and no
//! timeout; a caller that stops receiving results must decide its own
//! fallback.

use crate::detector::ChangeDetector;
use crate::error::DetectorError;
use crate::message::{ChangeRequest, DashboardChangeInfo};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Worker configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Quiet period after the last request before the diff runs
    pub debounce: Duration,
}

impl WorkerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
        }
    }
}

/// Identifies a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Wrap raw value
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

/// Result of one debounced diff
#[derive(Debug)]
pub struct DetectionOutcome {
    /// Ticket of the request that was actually diffed
    pub ticket: Ticket,
    /// Classification, or why it could not be produced
    pub result: Result<DashboardChangeInfo, DetectorError>,
}

#[derive(Debug)]
struct Job {
    ticket: Ticket,
    request: ChangeRequest,
}

/// Handle to the background change detector
#[derive(Debug)]
pub struct ChangeDetectorWorker {
    jobs: mpsc::UnboundedSender<Job>,
    next_ticket: u64,
    task: JoinHandle<()>,
}

impl ChangeDetectorWorker {
    /// Start the worker on the current tokio runtime
    ///
    /// Must be called from within a runtime context.
    #[must_use]
    pub fn spawn(config: WorkerConfig) -> (Self, mpsc::UnboundedReceiver<DetectionOutcome>) {
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let (result_tx, results) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(job_rx, result_tx, config.debounce));
        tracing::debug!(debounce_ms = config.debounce.as_millis(), "change detector worker started");

        (
            Self {
                jobs,
                next_ticket: 0,
                task,
            },
            results,
        )
    }

    /// Queue a request; returns immediately
    ///
    /// # Errors
    /// Returns [`DetectorError::WorkerUnavailable`] if the worker task has stopped
    pub fn submit(&mut self, request: ChangeRequest) -> Result<Ticket, DetectorError> {
        let ticket = Ticket(self.next_ticket);
        self.jobs
            .send(Job { ticket, request })
            .map_err(|_| DetectorError::WorkerUnavailable)?;
        self.next_ticket += 1;
        Ok(ticket)
    }

    /// Queue a JSON-encoded request
    ///
    /// # Errors
    /// - [`DetectorError::InvalidMessage`] if `message` is not a valid request
    /// - [`DetectorError::WorkerUnavailable`] if the worker task has stopped
    pub fn submit_message(&mut self, message: &str) -> Result<Ticket, DetectorError> {
        let request: ChangeRequest = serde_json::from_str(message)?;
        self.submit(request)
    }

    /// Check if the worker task is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting requests and wait for the pending one to finish
    ///
    /// # Errors
    /// Returns [`DetectorError::Panicked`] if the worker task panicked
    pub async fn shutdown(self) -> Result<(), DetectorError> {
        drop(self.jobs);
        self.task
            .await
            .map_err(|err| DetectorError::Panicked(err.to_string()))
    }
}

async fn run(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    results: mpsc::UnboundedSender<DetectionOutcome>,
    debounce: Duration,
) {
    while let Some(mut pending) = jobs.recv().await {
        loop {
            match tokio::time::timeout(debounce, jobs.recv()).await {
                Ok(Some(newer)) => {
                    tracing::trace!(superseded = %pending.ticket, by = %newer.ticket, "debounced change request");
                    pending = newer;
                }
                // Channel closed or window elapsed
                Ok(None) | Err(_) => break,
            }
        }

        let Job { ticket, request } = pending;
        let result = tokio::task::spawn_blocking(move || ChangeDetector::new().detect(&request))
            .await
            .map_err(|err| DetectorError::Panicked(err.to_string()));

        if let Err(err) = &result {
            tracing::warn!(%ticket, error = %err, "change detection failed");
        }
        if results.send(DetectionOutcome { ticket, result }).is_err() {
            tracing::debug!("result receiver dropped, stopping change detector worker");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn single_request_produces_result() {
        let (mut worker, mut results) = ChangeDetectorWorker::spawn(WorkerConfig::default());
        let ticket = worker
            .submit(ChangeRequest::new(json!({"title": "a"}), json!({"title": "b"})))
            .unwrap();

        let outcome = results.recv().await.unwrap();
        assert_eq!(outcome.ticket, ticket);
        assert!(outcome.result.unwrap().has_changes);
    }

    #[tokio::test(start_paused = true)]
    async fn worker_stops_when_results_are_dropped() {
        let (mut worker, results) = ChangeDetectorWorker::spawn(WorkerConfig::default());
        drop(results);
        worker
            .submit(ChangeRequest::new(json!({}), json!({})))
            .unwrap();

        (&mut worker.task).await.unwrap();
        assert!(!worker.is_running());
        assert!(matches!(
            worker.submit(ChangeRequest::new(json!({}), json!({}))),
            Err(DetectorError::WorkerUnavailable)
        ));
    }

    #[test]
    fn default_debounce_is_200ms() {
        assert_eq!(WorkerConfig::new().debounce, Duration::from_millis(200));
    }
}
