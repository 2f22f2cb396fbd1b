//! Delivery tracking: one single-assignment outcome per delivery.
//!
//! Transports report through [`DeliveryListener`]. Callers wait on the
//! [`DeliveryTracker`] either blocking (condition variable) or async
//! (tokio `Notify`). The first outcome written wins; later reports are
//! ignored.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;

/// Longest timeout a tracker honours. Larger values are clamped.
const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Terminal result of a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    Success,
    Error(String),
    Timeout,
    #[serde(rename = "UNCERTAIN_DELIVERY")]
    Uncertain(String),
    Unreachable,
}

impl DeliveryOutcome {
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "SUCCESS",
            DeliveryOutcome::Error(_) => "ERROR",
            DeliveryOutcome::Timeout => "TIMEOUT",
            DeliveryOutcome::Uncertain(_) => "UNCERTAIN_DELIVERY",
            DeliveryOutcome::Unreachable => "UNREACHABLE",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Error(cause) => write!(f, "ERROR: {cause}"),
            DeliveryOutcome::Uncertain(info) => write!(f, "UNCERTAIN_DELIVERY: {info}"),
            other => f.write_str(other.code()),
        }
    }
}

/// Where a delivery is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStage {
    Created,
    ChannelChosen,
    Sent,
    Done,
}

/// Which channel carried a delivery and how it was split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchInfo {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<String>,
    pub parts: usize,
}

/// Callback surface transports report through.
pub trait DeliveryListener: Send + Sync {
    fn on_success(&self);
    fn on_error(&self, cause: &str);
    fn on_timeout(&self);
    fn on_uncertain(&self, info: &str);
    fn on_unreachable(&self);
}

struct State {
    stage: DeliveryStage,
    outcome: Option<DeliveryOutcome>,
    dispatch: Option<DispatchInfo>,
}

/// Single-assignment completion handle with a fixed deadline.
pub struct DeliveryTracker {
    request_id: u32,
    deadline: Instant,
    state: Mutex<State>,
    settled: Condvar,
    notify: Notify,
}

impl DeliveryTracker {
    pub fn new(request_id: u32, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            request_id,
            deadline: Instant::now() + timeout.min(MAX_TIMEOUT),
            state: Mutex::new(State {
                stage: DeliveryStage::Created,
                outcome: None,
                dispatch: None,
            }),
            settled: Condvar::new(),
            notify: Notify::new(),
        })
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn stage(&self) -> DeliveryStage {
        self.lock().stage
    }

    /// Non-blocking peek. Past the deadline an unsettled tracker settles as Timeout.
    pub fn outcome(&self) -> Option<DeliveryOutcome> {
        let current = self.lock().outcome.clone();
        if current.is_none() && Instant::now() >= self.deadline {
            self.timeout();
            return self.lock().outcome.clone();
        }
        current
    }

    pub fn dispatch_info(&self) -> Option<DispatchInfo> {
        self.lock().dispatch.clone()
    }

    /// Commit the delivery to a channel. Only the first call is recorded.
    ///
    /// The stage only advances while unsettled: a transport may report
    /// before the driver gets here.
    pub fn record_dispatch(&self, info: DispatchInfo) {
        let mut state = self.lock();
        if state.dispatch.is_some() {
            return;
        }
        state.dispatch = Some(info);
        if state.outcome.is_none() {
            state.stage = DeliveryStage::ChannelChosen;
        }
    }

    /// Every envelope was handed to the transport.
    pub fn mark_sent(&self) {
        let mut state = self.lock();
        if state.outcome.is_none() && state.stage == DeliveryStage::ChannelChosen {
            state.stage = DeliveryStage::Sent;
        }
    }

    pub fn succeed(&self) -> bool {
        self.settle(DeliveryOutcome::Success)
    }

    pub fn fail(&self, cause: impl Into<String>) -> bool {
        self.settle(DeliveryOutcome::Error(cause.into()))
    }

    pub fn timeout(&self) -> bool {
        self.settle(DeliveryOutcome::Timeout)
    }

    pub fn mark_uncertain(&self, info: impl Into<String>) -> bool {
        self.settle(DeliveryOutcome::Uncertain(info.into()))
    }

    pub fn mark_unreachable(&self) -> bool {
        self.settle(DeliveryOutcome::Unreachable)
    }

    /// Block until an outcome is set or the tracker's deadline passes.
    pub fn wait(&self) -> DeliveryOutcome {
        self.wait_until(self.deadline)
    }

    /// Block for at most `timeout`, never past the tracker's deadline.
    ///
    /// Returns Timeout when nothing was reported in time. Timeout is only
    /// recorded as the final outcome once the tracker's own deadline passed.
    pub fn wait_timeout(&self, timeout: Duration) -> DeliveryOutcome {
        self.wait_until(self.limit(timeout))
    }

    /// Async counterpart of [`wait_timeout`](Self::wait_timeout).
    pub async fn wait_async(&self, timeout: Duration) -> DeliveryOutcome {
        let until = self.limit(timeout);
        loop {
            // Registered before the check so a settle in between is not lost.
            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            let now = Instant::now();
            if now >= until {
                break;
            }
            if tokio::time::timeout(until - now, notified).await.is_err() {
                break;
            }
        }
        self.expire()
    }

    fn wait_until(&self, until: Instant) -> DeliveryOutcome {
        let mut state = self.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            let now = Instant::now();
            if now >= until {
                break;
            }
            let (guard, _) = self
                .settled
                .wait_timeout(state, until - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        drop(state);
        self.expire()
    }

    /// Record Timeout if the deadline passed, then report whatever is current.
    fn expire(&self) -> DeliveryOutcome {
        if Instant::now() >= self.deadline {
            self.timeout();
        }
        self.outcome().unwrap_or(DeliveryOutcome::Timeout)
    }

    fn limit(&self, timeout: Duration) -> Instant {
        Instant::now()
            .checked_add(timeout)
            .map_or(self.deadline, |t| t.min(self.deadline))
    }

    /// Reports arriving at or after the deadline settle as Timeout, whether
    /// or not anyone was waiting.
    fn settle(&self, outcome: DeliveryOutcome) -> bool {
        let mut state = self.lock();
        if state.outcome.is_some() {
            return false;
        }
        let late = Instant::now() >= self.deadline && outcome != DeliveryOutcome::Timeout;
        let outcome = if late {
            tracing::debug!(
                request_id = self.request_id,
                reported = outcome.code(),
                "report after deadline, settling as timeout"
            );
            DeliveryOutcome::Timeout
        } else {
            outcome
        };
        tracing::debug!(request_id = self.request_id, outcome = outcome.code(), "delivery settled");
        state.outcome = Some(outcome);
        state.stage = DeliveryStage::Done;
        drop(state);
        self.settled.notify_all();
        self.notify.notify_waiters();
        !late
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeliveryListener for DeliveryTracker {
    fn on_success(&self) {
        self.succeed();
    }

    fn on_error(&self, cause: &str) {
        self.fail(cause);
    }

    fn on_timeout(&self) {
        self.timeout();
    }

    fn on_uncertain(&self, info: &str) {
        self.mark_uncertain(info);
    }

    fn on_unreachable(&self) {
        self.mark_unreachable();
    }
}

#[derive(Default)]
struct Tally {
    succeeded: usize,
    uncertain: usize,
    uncertain_info: Option<String>,
    finished: bool,
}

/// Folds the outcomes of a multi-envelope send into one report.
///
/// Success once every part succeeded; Uncertain once every part finished
/// and at least one was uncertain; the first error, timeout or
/// unreachable is forwarded immediately.
pub struct SequenceListener {
    inner: Arc<dyn DeliveryListener>,
    expected: usize,
    tally: Mutex<Tally>,
}

impl SequenceListener {
    pub fn new(inner: Arc<dyn DeliveryListener>, expected: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            expected,
            tally: Mutex::new(Tally::default()),
        })
    }

    fn count(&self, uncertain: Option<&str>) {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        if tally.finished {
            return;
        }
        match uncertain {
            Some(info) => {
                tally.uncertain += 1;
                tally.uncertain_info.get_or_insert_with(|| info.to_string());
            }
            None => tally.succeeded += 1,
        }
        if tally.succeeded + tally.uncertain < self.expected {
            return;
        }
        tally.finished = true;
        let info = tally.uncertain_info.take();
        drop(tally);
        match info {
            Some(info) => self.inner.on_uncertain(&info),
            None => self.inner.on_success(),
        }
    }

    /// Returns true for the first terminal report only.
    fn finish(&self) -> bool {
        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        !std::mem::replace(&mut tally.finished, true)
    }
}

impl DeliveryListener for SequenceListener {
    fn on_success(&self) {
        self.count(None);
    }

    fn on_error(&self, cause: &str) {
        if self.finish() {
            self.inner.on_error(cause);
        }
    }

    fn on_timeout(&self) {
        if self.finish() {
            self.inner.on_timeout();
        }
    }

    fn on_uncertain(&self, info: &str) {
        self.count(Some(info));
    }

    fn on_unreachable(&self) {
        if self.finish() {
            self.inner.on_unreachable();
        }
    }
}
