//! Generation progress events and the per-session progress bus.
//!
//! The orchestrator emits [`ProgressEvent`]s through a plain callback. A
//! [`ProgressBus`] turns such callbacks into a replayable channel keyed by
//! session id: late subscribers call [`ProgressBus::buffer`] to resync, and
//! channels expire a fixed interval after a terminal event so abandoned
//! sessions do not accumulate.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::FailureKind;
use crate::contracts::{Difficulty, Language};

/// Events kept for replay per session.
pub const BUFFER_CAP: usize = 400;

/// Lifetime of a channel after its terminal event.
pub const TERMINAL_TTL: Duration = Duration::from_secs(5 * 60);

/// Which half of an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptPhase {
    Generate,
    Validate,
}

/// One observable step of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    GenerationStarted {
        total_slots: usize,
    },
    SlotStarted {
        slot_index: usize,
        difficulty: Difficulty,
        topic: String,
        language: Language,
    },
    SlotLlmAttemptStarted {
        slot_index: usize,
        attempt: usize,
    },
    SlotContractValidated {
        slot_index: usize,
        attempt: usize,
    },
    SlotContractFailed {
        slot_index: usize,
        attempt: usize,
        short_error: String,
    },
    SlotDockerValidationStarted {
        slot_index: usize,
        attempt: usize,
    },
    SlotDockerValidationFailed {
        slot_index: usize,
        attempt: usize,
        short_error: String,
    },
    SlotCompleted {
        slot_index: usize,
    },
    AttemptFailed {
        slot_index: usize,
        attempt: usize,
        phase: AttemptPhase,
    },
    ProblemFailed {
        slot_index: usize,
    },
    GenerationCompleted {
        problem_count: usize,
    },
    GenerationFailed {
        slot_index: Option<usize>,
        kind: FailureKind,
        error: String,
    },
    Heartbeat {
        ts: DateTime<Utc>,
    },
}

impl ProgressEvent {
    /// Completed or failed runs end the channel's useful life.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::GenerationCompleted { .. } | ProgressEvent::GenerationFailed { .. }
        )
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, ProgressEvent::Heartbeat { .. })
    }
}

/// Callback the orchestrator reports through.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

#[derive(Default)]
struct Channel {
    listeners: HashMap<u64, mpsc::UnboundedSender<ProgressEvent>>,
    buffer: VecDeque<ProgressEvent>,
    terminal: bool,
    expires_at: Option<Instant>,
}

impl Channel {
    fn schedule_expiry(&mut self, ttl: Duration) {
        if self.expires_at.is_none() {
            self.expires_at = Some(Instant::now() + ttl);
        }
    }
}

struct BusInner {
    channels: Mutex<HashMap<String, Channel>>,
    next_listener: AtomicU64,
    ttl: Duration,
}

/// Registry of progress channels keyed by session id. Cheap to clone.
#[derive(Clone)]
pub struct ProgressBus {
    inner: Arc<BusInner>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::with_ttl(TERMINAL_TTL)
    }

    /// A bus whose channels expire `ttl` after their terminal event.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
                ttl,
            }),
        }
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        let mut guard = self
            .inner
            .channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        guard.retain(|_, c| c.expires_at.map_or(true, |at| at > now));
        guard
    }

    /// Append to the session's buffer and fan out to live listeners.
    ///
    /// Heartbeats are delivered but never buffered. Empty session ids are
    /// ignored.
    pub fn publish(&self, session_id: &str, event: ProgressEvent) {
        if session_id.is_empty() {
            return;
        }
        let mut channels = self.channels();
        let channel = channels.entry(session_id.to_string()).or_default();

        if !event.is_heartbeat() {
            channel.buffer.push_back(event.clone());
            while channel.buffer.len() > BUFFER_CAP {
                channel.buffer.pop_front();
            }
        }
        if event.is_terminal() {
            channel.terminal = true;
            channel.schedule_expiry(self.inner.ttl);
        }
        channel
            .listeners
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Snapshot of the buffered events for a session.
    pub fn buffer(&self, session_id: &str) -> Vec<ProgressEvent> {
        self.channels()
            .get(session_id)
            .map(|c| c.buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Receive every event published to the session from now on.
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.channels()
            .entry(session_id.to_string())
            .or_default()
            .listeners
            .insert(id, tx);
        Subscription {
            bus: self.clone(),
            session_id: session_id.to_string(),
            id,
            receiver: rx,
        }
    }

    fn unsubscribe(&self, session_id: &str, id: u64) {
        let mut channels = self.channels();
        if let Some(channel) = channels.get_mut(session_id) {
            channel.listeners.remove(&id);
            if channel.listeners.is_empty() && channel.terminal {
                channel.schedule_expiry(self.inner.ttl);
            }
        }
    }

    /// Drop a session's channel immediately.
    pub fn expire(&self, session_id: &str) -> bool {
        self.channels().remove(session_id).is_some()
    }

    /// Remove expired channels; returns how many remain.
    pub fn sweep_expired(&self) -> usize {
        self.channels().len()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.channels().contains_key(session_id)
    }

    /// A callback that publishes into `session_id`.
    pub fn publisher(&self, session_id: impl Into<String>) -> ProgressCallback {
        let bus = self.clone();
        let session_id = session_id.into();
        Arc::new(move |event: &ProgressEvent| bus.publish(&session_id, event.clone()))
    }
}

/// A live listener. Dropping it unsubscribes.
pub struct Subscription {
    bus: ProgressBus,
    session_id: String,
    id: u64,
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.session_id, self.id);
    }
}

/// Background task that publishes a heartbeat every `interval`.
///
/// Call [`HeartbeatMonitor::stop`] to cancel.
pub struct HeartbeatMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatMonitor {
    pub fn start(bus: ProgressBus, session_id: impl Into<String>, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let session_id = session_id.into();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }
                bus.publish(&session_id, ProgressEvent::Heartbeat { ts: Utc::now() });
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signal the monitor to stop and wait for it to finish.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}
