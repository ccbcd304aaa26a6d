// =====================================================================================
// CALL TRACKER SERVICE
// =====================================================================================

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::models::{CallId, CallMetadata, ServiceCall, SessionEvent};
use crate::services::MetricsAggregator;

#[derive(Debug)]
struct InFlightCall {
    call: ServiceCall,
    started: Instant,
}

/// Records the lifecycle of instrumented service calls.
///
/// A call that is started and never ended stays in flight indefinitely; there is
/// no reaping timeout.
#[derive(Debug)]
pub struct CallTracker {
    active_calls: RwLock<HashMap<CallId, InFlightCall>>,
    call_history: RwLock<VecDeque<ServiceCall>>,
    history_limit: usize,
    aggregator: Arc<MetricsAggregator>,
    active_sessions: RwLock<HashSet<String>>,
    total_sessions: AtomicU64,
    request_count: AtomicU64,
}

impl CallTracker {
    pub fn new(aggregator: Arc<MetricsAggregator>, history_limit: usize) -> Self {
        Self {
            active_calls: RwLock::new(HashMap::new()),
            call_history: RwLock::new(VecDeque::with_capacity(history_limit.min(1024))),
            history_limit,
            aggregator,
            active_sessions: RwLock::new(HashSet::new()),
            total_sessions: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn aggregator(&self) -> &Arc<MetricsAggregator> {
        &self.aggregator
    }

    pub async fn start_call(
        &self,
        service: &str,
        method: &str,
        metadata: Option<CallMetadata>,
    ) -> CallId {
        let id = CallId::new();
        let call = ServiceCall {
            id: id.clone(),
            service_name: service.to_string(),
            method_name: method.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            success: None,
            error: None,
            metadata,
        };

        self.active_calls.write().await.insert(
            id.clone(),
            InFlightCall {
                call,
                started: Instant::now(),
            },
        );

        debug!(call_id = %id, service, method, "Service call started");
        id
    }

    pub async fn end_call(&self, call_id: &CallId) {
        self.finish(call_id, None).await;
    }

    pub async fn end_call_with_error(&self, call_id: &CallId, error: impl Into<String>) {
        self.finish(call_id, Some(error.into())).await;
    }

    async fn finish(&self, call_id: &CallId, error: Option<String>) {
        // Lock order: in-flight -> metrics -> history. reset() takes the same order.
        let mut active = self.active_calls.write().await;
        let Some(in_flight) = active.remove(call_id) else {
            warn!(call_id = %call_id, "Attempted to end unknown or already completed call");
            return;
        };

        let mut call = in_flight.call;
        let duration_ms = in_flight.started.elapsed().as_secs_f64() * 1000.0;
        let completed_at = Utc::now();
        let success = error.is_none();

        call.end_time = Some(completed_at);
        call.duration_ms = Some(duration_ms);
        call.success = Some(success);
        call.error = error;

        let mut metrics = self.aggregator.write().await;
        metrics.record(&call.service_name, &call.method_name, duration_ms, success, completed_at);

        if success {
            debug!(
                call_id = %call.id,
                service = %call.service_name,
                method = %call.method_name,
                duration_ms,
                "Service call completed"
            );
        } else {
            warn!(
                call_id = %call.id,
                service = %call.service_name,
                method = %call.method_name,
                duration_ms,
                error = ?call.error,
                "Service call failed"
            );
        }

        let mut history = self.call_history.write().await;
        history.push_back(call);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    /// Runs `operation` as an instrumented call of `service.method`, recording its
    /// outcome and handing the result back untouched.
    pub async fn track<F, T, E>(&self, service: &str, method: &str, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let call_id = self.start_call(service, method, None).await;
        let result = operation.await;

        match &result {
            Ok(_) => self.end_call(&call_id).await,
            Err(error) => self.end_call_with_error(&call_id, error.to_string()).await,
        }

        result
    }

    pub async fn get_active_calls(&self) -> Vec<ServiceCall> {
        let active = self.active_calls.read().await;
        let mut calls: Vec<ServiceCall> = active.values().map(|c| c.call.clone()).collect();
        calls.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        calls
    }

    pub async fn active_call_count(&self) -> usize {
        self.active_calls.read().await.len()
    }

    /// Completed calls, most recent first.
    pub async fn get_call_history(&self, limit: Option<usize>) -> Vec<ServiceCall> {
        let history = self.call_history.read().await;
        history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn track_session(&self, session_id: &str, event: SessionEvent) {
        let mut sessions = self.active_sessions.write().await;
        match event {
            SessionEvent::Start => {
                if sessions.insert(session_id.to_string()) {
                    self.total_sessions.fetch_add(1, Ordering::Relaxed);
                    info!(session_id, active = sessions.len(), "Session started");
                } else {
                    debug!(session_id, "Session already active");
                }
            }
            SessionEvent::End => {
                if sessions.remove(session_id) {
                    info!(session_id, active = sessions.len(), "Session ended");
                } else {
                    warn!(session_id, "Attempted to end unknown session");
                }
            }
        }
    }

    pub fn track_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn active_session_count(&self) -> usize {
        self.active_sessions.read().await.len()
    }

    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Clears in-flight calls, metrics, call history and session counters together.
    pub async fn reset(&self) {
        let mut active = self.active_calls.write().await;
        let mut metrics = self.aggregator.write().await;
        let mut history = self.call_history.write().await;
        let mut sessions = self.active_sessions.write().await;

        active.clear();
        metrics.clear();
        history.clear();
        sessions.clear();
        self.total_sessions.store(0, Ordering::Relaxed);
        self.request_count.store(0, Ordering::Relaxed);

        info!("Call tracker reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::ServiceMetricsView;

    fn tracker() -> CallTracker {
        CallTracker::new(Arc::new(MetricsAggregator::new()), 1000)
    }

    async fn metrics_for(tracker: &CallTracker, service: &str, method: &str) -> crate::models::ServiceMetrics {
        match tracker.aggregator().get_service_metrics(service, Some(method)).await {
            ServiceMetricsView::Single(m) => m,
            other => panic!("unexpected view {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_lifecycle_records_duration() {
        let tracker = tracker();
        let id = tracker.start_call("speech_to_text", "transcribe", None).await;
        assert_eq!(tracker.active_call_count().await, 1);

        tokio::time::advance(Duration::from_millis(250)).await;
        tracker.end_call(&id).await;

        assert_eq!(tracker.active_call_count().await, 0);
        let history = tracker.get_call_history(None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].success, Some(true));
        assert!((history[0].duration_ms.unwrap() - 250.0).abs() < 1.0);

        let metrics = metrics_for(&tracker, "speech_to_text", "transcribe").await;
        assert_eq!(metrics.total_calls, 1);
        assert!((metrics.average_response_time_ms - 250.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn test_end_with_error_records_failure() {
        let tracker = tracker();
        let id = tracker.start_call("text_to_speech", "synthesize", None).await;
        tracker.end_call_with_error(&id, "quota exceeded").await;

        let history = tracker.get_call_history(Some(1)).await;
        assert_eq!(history[0].success, Some(false));
        assert_eq!(history[0].error.as_deref(), Some("quota exceeded"));

        let metrics = metrics_for(&tracker, "text_to_speech", "synthesize").await;
        assert_eq!(metrics.failed_calls, 1);
        assert_eq!(metrics.error_rate, 1.0);
    }

    #[tokio::test]
    async fn test_double_end_is_noop() {
        let tracker = tracker();
        let id = tracker.start_call("document", "render", None).await;
        tracker.end_call(&id).await;
        tracker.end_call(&id).await;
        tracker.end_call_with_error(&id, "late failure").await;
        tracker.end_call(&CallId::from("never-started".to_string())).await;

        let metrics = metrics_for(&tracker, "document", "render").await;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.successful_calls, 1);
        assert_eq!(metrics.failed_calls, 0);
        assert_eq!(tracker.get_call_history(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_invariants() {
        let tracker = Arc::new(tracker());
        let mut handles = Vec::new();

        for i in 0..50 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                let id = tracker.start_call("conversation", "reply", None).await;
                if i % 5 == 0 {
                    tracker.end_call_with_error(&id, "timeout").await;
                } else {
                    tracker.end_call(&id).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let metrics = metrics_for(&tracker, "conversation", "reply").await;
        assert_eq!(metrics.total_calls, 50);
        assert_eq!(metrics.total_calls, metrics.successful_calls + metrics.failed_calls);
        assert_eq!(metrics.failed_calls, 10);
        assert!((metrics.error_rate - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let tracker = CallTracker::new(Arc::new(MetricsAggregator::new()), 3);
        for _ in 0..5 {
            let id = tracker.start_call("export", "pdf", None).await;
            tracker.end_call(&id).await;
        }
        assert_eq!(tracker.get_call_history(None).await.len(), 3);
        assert_eq!(tracker.get_call_history(Some(2)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_unended_call_stays_active() {
        let tracker = tracker();
        let id = tracker
            .start_call("document", "render", Some(CallMetadata::with_request("req-1")))
            .await;

        let active = tracker.get_active_calls().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert!(active[0].is_active());
        assert_eq!(
            active[0].metadata.as_ref().and_then(|m| m.request_id.as_deref()),
            Some("req-1")
        );
    }

    #[tokio::test]
    async fn test_track_wraps_results() {
        let tracker = tracker();

        let ok: Result<u32, String> = tracker.track("export", "chart", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> = tracker
            .track("export", "chart", async { Err("renderer crashed".to_string()) })
            .await;
        assert!(err.is_err());

        let metrics = metrics_for(&tracker, "export", "chart").await;
        assert_eq!(metrics.total_calls, 2);
        assert_eq!(metrics.failed_calls, 1);

        let history = tracker.get_call_history(Some(1)).await;
        assert_eq!(history[0].error.as_deref(), Some("renderer crashed"));
    }

    #[tokio::test]
    async fn test_sessions_and_requests() {
        let tracker = tracker();
        tracker.track_session("s1", SessionEvent::Start).await;
        tracker.track_session("s2", SessionEvent::Start).await;
        tracker.track_session("s1", SessionEvent::Start).await;
        tracker.track_session("s1", SessionEvent::End).await;
        tracker.track_session("ghost", SessionEvent::End).await;
        tracker.track_request();
        tracker.track_request();

        assert_eq!(tracker.active_session_count().await, 1);
        assert_eq!(tracker.total_sessions(), 2);
        assert_eq!(tracker.total_requests(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_calls_metrics_and_history() {
        let tracker = tracker();
        let done = tracker.start_call("document", "render", None).await;
        tracker.end_call(&done).await;
        let pending = tracker.start_call("document", "render", None).await;
        tracker.track_request();

        tracker.reset().await;

        assert_eq!(tracker.active_call_count().await, 0);
        assert!(tracker.get_call_history(None).await.is_empty());
        assert!(tracker.aggregator().get_all_metrics().await.is_empty());
        assert_eq!(tracker.total_requests(), 0);

        // the call started before reset no longer exists
        tracker.end_call(&pending).await;
        assert!(tracker.aggregator().get_all_metrics().await.is_empty());
    }
}
