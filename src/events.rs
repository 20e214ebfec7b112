//! Event fan-out to UI collaborators
//!
//! Toolbars, panels and waveform renderers subscribe to the orchestrator's
//! [`EventBus`] and drain [`ConsoleEvent`]s from their own bounded crossbeam
//! channel on their own schedule. Publishing never blocks: when a
//! subscriber's queue is full the event is dropped for that subscriber and
//! counted, and subscribers whose receiver was dropped are pruned.

use crate::error::OperationKind;
use crate::types::{
    BuildArtifact, CompileDiagnostic, ConnectionState, DeviceSession, EraseResult, FlashResult,
};
use crate::waveform::TimeWindow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Something UI collaborators may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    /// The session state machine moved to a new state
    StateChanged(ConnectionState),
    /// A device session was established
    Connected(DeviceSession),
    /// The device session ended
    Disconnected,
    /// A build finished and produced an artifact
    BuildFinished(BuildArtifact),
    /// A build failed with compiler output; diagnostics are parsed from it
    BuildFailed {
        project_id: String,
        errors: Vec<CompileDiagnostic>,
        warnings: Vec<CompileDiagnostic>,
        compile_log: String,
    },
    /// Firmware was written to the target
    FlashFinished(FlashResult),
    /// The target flash was erased
    EraseFinished(EraseResult),
    /// A remote operation failed or timed out
    OperationFailed {
        operation: OperationKind,
        message: String,
    },
    /// A watch request was sent and awaits acknowledgement
    WatchRequested { variables: Vec<String> },
    /// The service acknowledged the watch request
    WatchStarted { variables: Vec<String> },
    /// Watching stopped (locally or by acknowledgement)
    WatchStopped,
    /// New samples were stored; `window` is the visible time window afterwards
    SamplesIngested {
        variables: Vec<String>,
        window: TimeWindow,
    },
    /// Information about a variable reported by the service
    VariableInfo {
        variable: String,
        info: serde_json::Value,
    },
    /// The service acknowledged a variable write
    VariableSet {
        variable: String,
        value: Option<f64>,
    },
    /// The viewport changed without new samples (user scroll/zoom)
    ViewportChanged(TimeWindow),
    /// The service reported an error on the telemetry channel
    TelemetryError(String),
    /// The telemetry socket closed; it is not reopened automatically
    TelemetryClosed { reason: Option<String> },
}

struct BusInner {
    subscribers: Vec<Sender<ConsoleEvent>>,
    queue_depth: usize,
    dropped: u64,
}

/// Cloneable handle for publishing events to all subscribers
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventBus")
            .field("subscribers", &inner.subscribers.len())
            .field("queue_depth", &inner.queue_depth)
            .field("dropped", &inner.dropped)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `queue_depth` events
    pub fn new(queue_depth: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: Vec::new(),
                queue_depth: queue_depth.max(1),
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> EventReceiver {
        let mut inner = self.lock();
        let (tx, rx) = bounded(inner.queue_depth);
        inner.subscribers.push(tx);
        EventReceiver { receiver: rx }
    }

    /// Deliver an event to every live subscriber without blocking
    pub fn publish(&self, event: ConsoleEvent) {
        let mut inner = self.lock();
        let mut dropped = 0;
        inner.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        if dropped > 0 {
            inner.dropped += dropped;
            tracing::trace!("Dropped event for {} slow subscriber(s)", dropped);
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Total events dropped because a subscriber queue was full
    pub fn dropped_events(&self) -> u64 {
        self.lock().dropped
    }
}

/// Subscriber side of the event bus
pub struct EventReceiver {
    receiver: Receiver<ConsoleEvent>,
}

impl EventReceiver {
    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<ConsoleEvent> {
        self.receiver.try_recv().ok()
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<ConsoleEvent> {
        self.receiver.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event
    ///
    /// Returns `None` on timeout or when the bus is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ConsoleEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
