//! Unsaved change tracking for a dashboard scene
//!
//! The tracker keeps the last saved model and compares the live scene against
//! it, either synchronously with [`DashboardChangeTracker::detect_now`] or
//! through a debounced [`ChangeDetectorWorker`]. A worker that fails or goes
//! away counts as "changed" so edits are never silently dropped.

use crate::config::ChangeDetectionOptions;
use crate::error::DashboardError;
use crate::scene::DashboardScene;
use scene_diff::{
    ChangeDetector, ChangeDetectorWorker, ChangeRequest, DashboardChangeInfo, DetectionOutcome,
    DetectorError, Ticket,
};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

/// Tracks whether a dashboard differs from its saved model
#[derive(Debug)]
pub struct DashboardChangeTracker {
    initial: Value,
    options: ChangeDetectionOptions,
    detector: ChangeDetector,
    worker: Option<ChangeDetectorWorker>,
    pending: Option<Ticket>,
    last: Option<DashboardChangeInfo>,
    dirty: bool,
}

impl DashboardChangeTracker {
    /// Track changes against `initial`
    #[must_use]
    pub fn new(initial: Value, options: ChangeDetectionOptions) -> Self {
        Self {
            initial,
            options,
            detector: ChangeDetector::new(),
            worker: None,
            pending: None,
            last: None,
            dirty: false,
        }
    }

    /// Track changes of `scene` starting from its current model
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if the scene cannot be saved
    pub fn for_scene(scene: &DashboardScene) -> Result<Self, DashboardError> {
        Ok(Self::new(
            scene.save_model()?,
            scene.options().change_detection,
        ))
    }

    /// Saved model changes are measured against
    #[inline]
    #[must_use]
    pub fn initial(&self) -> &Value {
        &self.initial
    }

    /// Whether the last detection (or a failure) reported unsaved changes
    #[inline]
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.dirty
    }

    /// Last detection result
    #[inline]
    #[must_use]
    pub fn last_result(&self) -> Option<DashboardChangeInfo> {
        self.last
    }

    /// Ticket of the most recent submission still awaiting its result
    #[inline]
    #[must_use]
    pub fn pending(&self) -> Option<Ticket> {
        self.pending
    }

    fn request(&self, changed: Value) -> ChangeRequest {
        ChangeRequest::new(self.initial.clone(), changed)
            .ignore_time_changes(self.options.ignore_time_changes)
            .ignore_variable_value_changes(self.options.ignore_variable_value_changes)
            .ignore_refresh_changes(self.options.ignore_refresh_changes)
    }

    fn record(&mut self, info: DashboardChangeInfo) -> DashboardChangeInfo {
        self.dirty = info.has_changes;
        self.last = Some(info);
        info
    }

    /// Compare `scene` against the saved model on the calling thread
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if the scene cannot be saved
    pub fn detect_now(
        &mut self,
        scene: &DashboardScene,
    ) -> Result<DashboardChangeInfo, DashboardError> {
        let request = self.request(scene.save_model()?);
        let info = self.detector.detect(&request);
        Ok(self.record(info))
    }

    /// Start the background worker and return its result channel
    ///
    /// Must be called within a tokio runtime. A previously started worker is
    /// replaced; its channel closes once its queue drains.
    pub fn start_worker(&mut self) -> UnboundedReceiver<DetectionOutcome> {
        let (worker, results) = ChangeDetectorWorker::spawn(self.options.worker_config());
        self.worker = Some(worker);
        self.pending = None;
        tracing::debug!(debounce_ms = self.options.debounce_ms, "started change detector worker");
        results
    }

    /// Queue a comparison of `scene` on the background worker
    ///
    /// On failure the tracker assumes unsaved changes.
    ///
    /// # Errors
    /// - [`DashboardError::Detector`] with [`DetectorError::WorkerUnavailable`]
    ///   if no worker is running
    /// - [`DashboardError::InvalidModel`] if the scene cannot be saved
    pub fn schedule(&mut self, scene: &DashboardScene) -> Result<Ticket, DashboardError> {
        let request = self.request(scene.save_model()?);
        let submitted = match self.worker.as_mut() {
            Some(worker) => worker.submit(request),
            None => Err(DetectorError::WorkerUnavailable),
        };

        match submitted {
            Ok(ticket) => {
                self.pending = Some(ticket);
                Ok(ticket)
            }
            Err(err) => {
                tracing::warn!(error = %err, "change detection unavailable, assuming changes");
                self.record(DashboardChangeInfo::assume_changed());
                Err(err.into())
            }
        }
    }

    /// Result for a ticket older than the latest submission
    fn is_stale(&self, ticket: Ticket) -> bool {
        self.pending.is_some_and(|latest| ticket < latest)
    }

    fn current(&self) -> DashboardChangeInfo {
        self.last.unwrap_or_else(|| {
            if self.dirty {
                DashboardChangeInfo::assume_changed()
            } else {
                DashboardChangeInfo::unchanged()
            }
        })
    }

    /// Apply a worker result
    ///
    /// A failed detection counts as changed. A result for a ticket older than
    /// the pending one was computed from a superseded model and leaves the
    /// tracker untouched; the current state is returned instead.
    pub fn apply_outcome(&mut self, outcome: DetectionOutcome) -> DashboardChangeInfo {
        if self.is_stale(outcome.ticket) {
            tracing::debug!(
                ticket = %outcome.ticket,
                "dropping change detection result for superseded request"
            );
            return self.current();
        }
        if self.pending == Some(outcome.ticket) {
            self.pending = None;
        }
        match outcome.result {
            Ok(info) => self.record(info),
            Err(err) => {
                tracing::warn!(
                    ticket = %outcome.ticket,
                    error = %err,
                    "change detection failed, assuming changes"
                );
                self.record(DashboardChangeInfo::assume_changed())
            }
        }
    }

    /// Wait for the next worker result and apply it
    ///
    /// Results for superseded requests are skipped. A closed channel means the
    /// worker died and counts as changed.
    pub async fn next_outcome(
        &mut self,
        results: &mut UnboundedReceiver<DetectionOutcome>,
    ) -> DashboardChangeInfo {
        loop {
            match results.recv().await {
                Some(outcome) if self.is_stale(outcome.ticket) => {
                    tracing::trace!(ticket = %outcome.ticket, "skipping superseded result");
                }
                Some(outcome) => return self.apply_outcome(outcome),
                None => {
                    tracing::warn!("change detector worker stopped, assuming changes");
                    self.pending = None;
                    self.worker = None;
                    return self.record(DashboardChangeInfo::assume_changed());
                }
            }
        }
    }

    /// Make the scene's current model the new baseline
    ///
    /// # Errors
    /// Returns [`DashboardError::InvalidModel`] if the scene cannot be saved
    pub fn mark_saved(&mut self, scene: &DashboardScene) -> Result<(), DashboardError> {
        self.initial = scene.save_model()?;
        self.dirty = false;
        self.last = None;
        tracing::debug!("dashboard saved, change baseline reset");
        Ok(())
    }

    /// Stop the background worker, flushing any debounced request
    ///
    /// # Errors
    /// Returns [`DashboardError::Detector`] if the worker task panicked
    pub async fn stop_worker(&mut self) -> Result<(), DashboardError> {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardSceneOptions;
    use serde_json::json;

    fn scene() -> DashboardScene {
        DashboardScene::from_json(
            &json!({"uid": "t", "panels": [{"id": 1, "type": "stat", "title": "A"}]}),
            DashboardSceneOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn fresh_tracker_is_clean() {
        let scene = scene();
        let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();
        assert!(!tracker.detect_now(&scene).unwrap().has_changes);
        assert!(!tracker.has_changes());
    }

    #[test]
    fn schedule_without_worker_assumes_changes() {
        let scene = scene();
        let mut tracker = DashboardChangeTracker::for_scene(&scene).unwrap();
        let err = tracker.schedule(&scene).unwrap_err();
        assert!(matches!(
            err,
            DashboardError::Detector(DetectorError::WorkerUnavailable)
        ));
        assert!(tracker.has_changes());
    }

    #[test]
    fn failed_outcome_counts_as_changed() {
        let mut tracker = DashboardChangeTracker::new(json!({}), ChangeDetectionOptions::default());
        let info = tracker.apply_outcome(DetectionOutcome {
            ticket: Ticket::new(1),
            result: Err(DetectorError::Panicked("boom".into())),
        });
        assert!(info.has_changes);
        assert!(tracker.has_changes());
    }

    #[test]
    fn superseded_outcome_is_ignored() {
        let mut tracker = DashboardChangeTracker::new(json!({}), ChangeDetectionOptions::default());
        tracker.pending = Some(Ticket::new(5));

        let info = tracker.apply_outcome(DetectionOutcome {
            ticket: Ticket::new(3),
            result: Ok(DashboardChangeInfo::assume_changed()),
        });
        assert!(!info.has_changes);
        assert!(!tracker.has_changes());
        assert!(tracker.last_result().is_none());
        assert_eq!(tracker.pending(), Some(Ticket::new(5)));

        tracker.apply_outcome(DetectionOutcome {
            ticket: Ticket::new(5),
            result: Ok(DashboardChangeInfo::unchanged()),
        });
        assert!(tracker.pending().is_none());
        assert!(!tracker.has_changes());
    }

    #[tokio::test]
    async fn next_outcome_skips_superseded_results() {
        let mut tracker = DashboardChangeTracker::new(json!({}), ChangeDetectionOptions::default());
        tracker.pending = Some(Ticket::new(2));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.send(DetectionOutcome {
            ticket: Ticket::new(1),
            result: Err(DetectorError::Panicked("old".into())),
        })
        .unwrap();
        tx.send(DetectionOutcome {
            ticket: Ticket::new(2),
            result: Ok(DashboardChangeInfo::unchanged()),
        })
        .unwrap();

        let info = tracker.next_outcome(&mut rx).await;

        assert!(!info.has_changes);
        assert!(tracker.pending().is_none());
        assert!(rx.try_recv().is_err());
    }
}
