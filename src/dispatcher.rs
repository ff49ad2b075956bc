//! Submission, queueing and replay of story generation requests.
//!
//! Per request the dispatcher walks
//! `Evaluating -> {Queued, Sending} -> {Succeeded, FailedTerminal}`.
//! A queued request moves back to `Sending` when the connectivity monitor
//! reports a recovery, and an in-flight request that hits a transport error
//! drops back to `Queued`. Every request resolves its [`StoryTicket`] exactly
//! once; retryable failures never reach the caller.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::OpenAiConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::error::{DispatchError, Result};
use crate::models::{ApiErrorEnvelope, ChatCompletionResponse, GenerationRequest, Story};
use crate::probe::{ProbeFailure, ServiceAvailability, ServiceProbe};
use crate::prompt::{build_chat_request, prompt_for};
use crate::queue::{DrainReport, DrainStep, RequestQueue};
use crate::transport::{RawResponse, Transport};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Evaluating,
    Queued,
    Sending,
    Succeeded,
    FailedTerminal,
}

/// State transition of one submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    pub request_id: Uuid,
    pub sequence: u64,
    pub state: RequestState,
}

/// A submitted request together with the channel that resolves its ticket
struct PendingRequest {
    id: Uuid,
    sequence: u64,
    request: GenerationRequest,
    submitted_at: DateTime<Utc>,
    reply: oneshot::Sender<Result<Story>>,
}

impl PendingRequest {
    fn new(sequence: u64, request: GenerationRequest) -> (Self, StoryTicket) {
        let (reply, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let pending = Self {
            id,
            sequence,
            request,
            submitted_at: Utc::now(),
            reply,
        };
        (pending, StoryTicket { id, sequence, rx })
    }

    fn waited_ms(&self) -> i64 {
        (Utc::now() - self.submitted_at).num_milliseconds()
    }

    fn resolve(self, result: Result<Story>) {
        if self.reply.send(result).is_err() {
            tracing::debug!(request_id = %self.id, "Caller dropped its ticket before resolution");
        }
    }
}

/// Caller's handle on a submitted request
#[derive(Debug)]
pub struct StoryTicket {
    pub id: Uuid,
    pub sequence: u64,
    rx: oneshot::Receiver<Result<Story>>,
}

impl StoryTicket {
    /// Wait for the request to resolve. A queued request resolves when the
    /// queue is replayed, not at submission time.
    pub async fn wait(self) -> Result<Story> {
        self.rx.await.unwrap_or(Err(DispatchError::Abandoned))
    }

    /// Non-blocking check; `None` while the request is queued or in flight
    pub fn try_take(&mut self) -> Option<Result<Story>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DispatchError::Abandoned)),
        }
    }
}

enum Attempt {
    Resolved,
    Requeue {
        pending: PendingRequest,
        offline: bool,
    },
}

struct Inner {
    transport: Arc<dyn Transport>,
    monitor: Arc<ConnectivityMonitor>,
    probe: Arc<ServiceProbe>,
    queue: RequestQueue<PendingRequest>,
    openai: OpenAiConfig,
    next_sequence: AtomicU64,
    events: broadcast::Sender<DispatchEvent>,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        monitor: Arc<ConnectivityMonitor>,
        probe: Arc<ServiceProbe>,
        openai: OpenAiConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                monitor,
                probe,
                queue: RequestQueue::new(),
                openai,
                next_sequence: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Send now if the network and the API allow it, otherwise queue.
    pub async fn submit(&self, request: GenerationRequest) -> StoryTicket {
        let sequence = self.inner.next_sequence.fetch_add(1, Ordering::SeqCst);
        let (pending, ticket) = PendingRequest::new(sequence, request);
        self.emit(&pending, RequestState::Evaluating);

        if let Attempt::Requeue { pending, offline } = self.attempt(pending).await {
            let (id, sequence) = (pending.id, pending.sequence);
            self.inner.queue.enqueue(pending);
            self.publish(id, sequence, RequestState::Queued);

            // The network may have come back between the check and the
            // enqueue, after the listener already drained an empty queue.
            if offline && self.is_reachable() {
                tracing::debug!(sequence, "Network returned during submit, draining");
                self.drain_pending().await;
            }
        }
        ticket
    }

    /// Submit and wait for the story
    pub async fn generate(&self, request: GenerationRequest) -> Result<Story> {
        self.submit(request).await.wait().await
    }

    /// Replay queued requests in submission order, one at a time
    pub async fn drain_pending(&self) -> DrainReport {
        let report = self
            .inner
            .queue
            .drain(|pending| async move {
                match self.attempt(pending).await {
                    Attempt::Resolved => DrainStep::Resolved,
                    Attempt::Requeue { pending, .. } => {
                        self.emit(&pending, RequestState::Queued);
                        DrainStep::Retry(pending)
                    }
                }
            })
            .await;

        if report.resolved > 0 || report.halted {
            tracing::info!(
                resolved = report.resolved,
                halted = report.halted,
                remaining = self.inner.queue.len(),
                "Drained pending requests"
            );
        }
        report
    }

    /// Drain the queue on every `BecameReachable`. Runs until aborted.
    pub fn spawn_recovery_listener(&self) -> JoinHandle<()> {
        let dispatcher = self.clone();
        // Subscribe before returning so no transition is missed
        let mut events = self.inner.monitor.subscribe();
        tokio::spawn(async move {
            while dispatcher.on_connectivity(events.recv().await).await {}
            tracing::debug!("Recovery listener stopped");
        })
    }

    /// React to one receive from the monitor; false once the channel closed
    async fn on_connectivity(
        &self,
        received: std::result::Result<ConnectivityEvent, RecvError>,
    ) -> bool {
        match received {
            Ok(ConnectivityEvent::BecameReachable) => {
                tracing::info!(pending = self.pending(), "Network restored, replaying queue");
                self.drain_pending().await;
            }
            Ok(ConnectivityEvent::BecameUnreachable) => {
                tracing::info!("Network lost, new requests will be queued");
            }
            // Missed transitions may include a recovery; trust the current state
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Connectivity listener lagged");
                if self.is_reachable() {
                    self.drain_pending().await;
                }
            }
            Err(RecvError::Closed) => return false,
        }
        true
    }

    /// Stream of request state transitions. Delivery is at most once: a
    /// subscriber that lags behind the channel capacity loses events.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.events.subscribe()
    }

    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.monitor.is_reachable()
    }

    /// Last probe verdict, including why the API is unusable. Callers can
    /// use a non-retryable reason to stop submitting.
    pub fn service_status(&self) -> ServiceAvailability {
        self.inner.probe.current()
    }

    async fn attempt(&self, pending: PendingRequest) -> Attempt {
        let inner = &self.inner;

        if let Err(e) = self.admit().await {
            let offline = matches!(e, DispatchError::Connectivity);
            if offline {
                tracing::debug!(sequence = pending.sequence, "Offline, request stays queued");
            } else {
                tracing::warn!(sequence = pending.sequence, "Request queued: {}", e);
            }
            return Attempt::Requeue { pending, offline };
        }

        self.emit(&pending, RequestState::Sending);
        let prompt = prompt_for(&pending.request);
        let body = build_chat_request(&prompt, &inner.openai);

        match inner.transport.chat(&body).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    sequence = pending.sequence,
                    "Exchange failed, request requeued: {}",
                    e
                );
                inner.probe.invalidate();
                Attempt::Requeue {
                    pending,
                    offline: false,
                }
            }
            Err(e) => {
                self.finish(pending, Err(e));
                Attempt::Resolved
            }
            Ok(raw) => {
                self.finish(pending, interpret_response(raw));
                Attempt::Resolved
            }
        }
    }

    /// Network path first, then the API verdict; a trusted verdict skips
    /// the probe
    async fn admit(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.monitor.is_reachable() {
            return Err(DispatchError::Connectivity);
        }
        if inner.probe.is_trusted() {
            return Ok(());
        }

        let availability = inner.probe.ensure_available().await;
        if availability.available {
            return Ok(());
        }
        let reason = availability
            .reason
            .unwrap_or_else(|| ProbeFailure::Transport("no probe verdict".to_string()));
        Err(DispatchError::ServiceUnavailable(reason))
    }

    fn finish(&self, pending: PendingRequest, result: Result<Story>) {
        match &result {
            Ok(story) => {
                tracing::info!(
                    sequence = pending.sequence,
                    waited_ms = pending.waited_ms(),
                    title = %story.title,
                    "Story generated"
                );
                self.emit(&pending, RequestState::Succeeded);
            }
            Err(e) => {
                tracing::error!(
                    sequence = pending.sequence,
                    waited_ms = pending.waited_ms(),
                    "Story generation failed: {}",
                    e
                );
                self.emit(&pending, RequestState::FailedTerminal);
            }
        }
        pending.resolve(result);
    }

    fn emit(&self, pending: &PendingRequest, state: RequestState) {
        self.publish(pending.id, pending.sequence, state);
    }

    fn publish(&self, request_id: Uuid, sequence: u64, state: RequestState) {
        tracing::debug!(%request_id, sequence, ?state);
        // No subscribers is fine
        let _ = self.inner.events.send(DispatchEvent {
            request_id,
            sequence,
            state,
        });
    }
}

/// Turn an answered exchange into a story or a terminal error
pub fn interpret_response(raw: RawResponse) -> Result<Story> {
    if !raw.is_success() {
        let message = serde_json::from_str::<ApiErrorEnvelope>(&raw.body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| raw.body.trim().to_string());
        return Err(DispatchError::HttpStatus {
            status: raw.status,
            message,
        });
    }

    let response: ChatCompletionResponse = serde_json::from_str(&raw.body)
        .map_err(|e| DispatchError::MalformedResponse(format!("undecodable body: {e}")))?;

    let content = response
        .choices
        .into_iter()
        .map(|choice| choice.message)
        .find(|message| message.role.as_deref().unwrap_or("assistant") == "assistant")
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| DispatchError::MalformedResponse("missing story content".to_string()))?;

    Ok(split_story(&content))
}

/// First paragraph is the title; the remaining paragraphs are the body
pub fn split_story(text: &str) -> Story {
    let mut paragraphs = text.trim().split("\n\n");
    let title = paragraphs.next().unwrap_or_default().trim().to_string();
    let body = paragraphs.collect::<Vec<_>>().join("\n\n").trim().to_string();
    Story { title, body }
}
