//! Fan-out of setup events to subscribers.
//!
//! Every subscriber owns a bounded FIFO queue. Publishing never blocks and
//! never waits on a subscriber. When a queue is full the oldest queued
//! *log* event is evicted to make room, and the subscriber's
//! [`EventStream::dropped_logs`] counter is bumped. Stage and credential
//! events are never evicted, so a slow subscriber may miss log lines
//! (visible as a gap in [`LogEvent::seq`]) but always sees every stage
//! transition, in order. A subscriber that keeps up sees every event.

use crate::privilege::RequestId;
use crate::session::{LogLine, LogSource};
use crate::InstallationStage;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::Notify;
use tracing::trace;

/// Default per-subscriber queue capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// A stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    /// The stage entered.
    pub stage: InstallationStage,
}

/// One line of setup output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Log the line belongs to.
    pub source: LogSource,
    /// Position within its source, starting at 1.
    pub seq: u64,
    /// Line text.
    pub text: String,
}

impl From<LogLine> for LogEvent {
    fn from(line: LogLine) -> Self {
        Self {
            source: line.source,
            seq: line.seq,
            text: line.text,
        }
    }
}

/// Event delivered to subscribers.
///
/// Serialized with a `type` tag:
///
/// ```rust
/// use runtime_bootstrap::{InstallationStage, SetupEvent, StageEvent};
///
/// let event = SetupEvent::Stage(StageEvent { stage: InstallationStage::ProbingRuntime });
/// let json = serde_json::to_string(&event).unwrap();
/// assert_eq!(json, r#"{"type":"stage","stage":"ProbingRuntime"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetupEvent {
    /// The session entered a stage.
    Stage(StageEvent),
    /// A line of runtime-install or container output.
    Log(LogEvent),
    /// The operator must answer a credential request with this id.
    CredentialRequested {
        /// Id to pass to `submit_credential`.
        request_id: RequestId,
    },
}

impl SetupEvent {
    fn is_log(&self) -> bool {
        matches!(self, Self::Log(_))
    }
}

struct QueueState {
    events: VecDeque<SetupEvent>,
    dropped_logs: u64,
    closed: bool,
}

struct SubscriberQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl SubscriberQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: SetupEvent) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            if state.events.len() >= self.capacity {
                match state.events.iter().position(SetupEvent::is_log) {
                    Some(oldest_log) => {
                        state.events.remove(oldest_log);
                        state.dropped_logs += 1;
                    }
                    // Only stage events queued; a log can wait no longer.
                    None if event.is_log() => {
                        state.dropped_logs += 1;
                        return;
                    }
                    None => {}
                }
            }
            state.events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }
}

struct ReporterShared {
    capacity: usize,
    subscribers: Mutex<Vec<Weak<SubscriberQueue>>>,
}

impl Drop for ReporterShared {
    fn drop(&mut self) {
        let subscribers = self
            .subscribers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.drain(..).filter_map(|w| w.upgrade()) {
            queue.close();
        }
    }
}

/// Publishes setup events to any number of subscribers.
///
/// Cheap to clone; clones publish to the same subscribers. When the last
/// clone is dropped every [`EventStream`] ends after draining its queue.
#[derive(Clone)]
pub struct EventReporter {
    shared: Arc<ReporterShared>,
}

impl Default for EventReporter {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

impl EventReporter {
    /// Reporter whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(ReporterShared {
                capacity: capacity.max(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a new subscriber. It sees events published from now on.
    pub fn subscribe(&self) -> EventStream {
        let queue = Arc::new(SubscriberQueue {
            capacity: self.shared.capacity,
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                dropped_logs: 0,
                closed: false,
            }),
            notify: Notify::new(),
        });
        self.subscribers().push(Arc::downgrade(&queue));
        EventStream { queue }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|w| w.strong_count() > 0);
        subscribers.len()
    }

    /// Publish a stage transition.
    pub fn publish_stage(&self, stage: InstallationStage) {
        self.publish(SetupEvent::Stage(StageEvent { stage }));
    }

    /// Publish a log line.
    pub fn publish_log(&self, line: LogLine) {
        self.publish(SetupEvent::Log(line.into()));
    }

    /// Publish any event.
    pub fn publish(&self, event: SetupEvent) {
        let live: Vec<Arc<SubscriberQueue>> = {
            let mut subscribers = self.subscribers();
            subscribers.retain(|w| w.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        trace!(subscribers = live.len(), ?event, "publishing setup event");
        for queue in live {
            queue.push(event.clone());
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Weak<SubscriberQueue>>> {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A subscriber's view of setup events.
///
/// Dropping it unsubscribes.
pub struct EventStream {
    queue: Arc<SubscriberQueue>,
}

impl EventStream {
    /// Next event, or `None` once the reporter is gone and the queue drained.
    pub async fn recv(&mut self) -> Option<SetupEvent> {
        loop {
            {
                let mut state = self.queue.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            self.queue.notify.notified().await;
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<SetupEvent> {
        self.queue.lock().events.pop_front()
    }

    /// Drain every queued event without waiting.
    pub fn drain(&mut self) -> Vec<SetupEvent> {
        self.queue.lock().events.drain(..).collect()
    }

    /// Log events evicted from this subscriber's queue so far.
    pub fn dropped_logs(&self) -> u64 {
        self.queue.lock().dropped_logs
    }

    /// Adapt into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = SetupEvent> + Send + 'static {
        futures::stream::unfold(self, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}
