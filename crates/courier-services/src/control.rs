//! Control loops: periodic command pushers, one per target system.
//!
//! Each loop is a tokio interval task submitting a fresh message every
//! tick. Dispatch may block on transport I/O, so ticks run it on the
//! blocking pool. Outcomes are not awaited and failed ticks are never re-sent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use courier_core::Message;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dispatcher::{DeliveryRequest, TransmissionDispatcher};

/// Builds the message sent on each tick.
pub type MessageProducer = Arc<dyn Fn() -> Message + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("control period must be greater than zero")]
    ZeroPeriod,

    #[error("control loops need a tokio runtime")]
    NoRuntime,
}

/// Public view of a running loop.
#[derive(Debug, Clone, Serialize)]
pub struct ControlLoopInfo {
    pub target: String,
    pub period_millis: u64,
    pub channels: Vec<String>,
    pub ticks: u64,
    pub running_secs: u64,
}

struct ControlLoop {
    period: Duration,
    channels: Vec<String>,
    started_at: Instant,
    ticks: Arc<AtomicU64>,
    /// Held while a tick dispatches; false once stopped.
    live: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

impl ControlLoop {
    fn halt(&self) {
        *self.live.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.handle.abort();
    }
}

pub struct ControlLoops {
    dispatcher: Arc<TransmissionDispatcher>,
    loops: DashMap<String, ControlLoop>,
}

impl ControlLoops {
    pub fn new(dispatcher: Arc<TransmissionDispatcher>) -> Self {
        Self {
            dispatcher,
            loops: DashMap::new(),
        }
    }

    /// Start pushing to `target` every `period`. Replaces an existing loop.
    pub fn start(
        &self,
        target: &str,
        period: Duration,
        channels: Vec<String>,
        producer: MessageProducer,
    ) -> Result<(), ControlError> {
        if period.is_zero() {
            return Err(ControlError::ZeroPeriod);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ControlError::NoRuntime)?;

        let ticks = Arc::new(AtomicU64::new(0));
        let live = Arc::new(Mutex::new(true));
        let handle = runtime.spawn(run_loop(
            self.dispatcher.clone(),
            target.to_string(),
            period,
            channels.clone(),
            producer,
            ticks.clone(),
            live.clone(),
        ));

        let replaced = self.loops.insert(
            target.to_string(),
            ControlLoop {
                period,
                channels,
                started_at: Instant::now(),
                ticks,
                live,
                handle,
            },
        );
        if let Some(old) = replaced {
            old.halt();
        }
        tracing::info!(
            target_system = %target,
            period_ms = period.as_millis() as u64,
            "control loop started"
        );
        Ok(())
    }

    /// Stop the loop for `target`. No tick is submitted after this returns.
    pub fn stop(&self, target: &str) -> bool {
        match self.loops.remove(target) {
            Some((_, control)) => {
                control.halt();
                tracing::info!(target_system = %target, "control loop stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let targets: Vec<String> = self.loops.iter().map(|e| e.key().clone()).collect();
        for target in targets {
            self.stop(&target);
        }
    }

    pub fn is_running(&self, target: &str) -> bool {
        self.loops.contains_key(target)
    }

    /// Running loops sorted by target.
    pub fn active(&self) -> Vec<ControlLoopInfo> {
        let mut loops: Vec<ControlLoopInfo> = self
            .loops
            .iter()
            .map(|e| ControlLoopInfo {
                target: e.key().clone(),
                period_millis: e.period.as_millis() as u64,
                channels: e.channels.clone(),
                ticks: e.ticks.load(Ordering::Relaxed),
                running_secs: e.started_at.elapsed().as_secs(),
            })
            .collect();
        loops.sort_by(|a, b| a.target.cmp(&b.target));
        loops
    }
}

impl Drop for ControlLoops {
    fn drop(&mut self) {
        for entry in self.loops.iter() {
            entry.halt();
        }
        self.loops.clear();
    }
}

async fn run_loop(
    dispatcher: Arc<TransmissionDispatcher>,
    target: String,
    period: Duration,
    channels: Vec<String>,
    producer: MessageProducer,
    ticks: Arc<AtomicU64>,
    live: Arc<Mutex<bool>>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let request = DeliveryRequest::new(producer(), &target)
            .timeout(period)
            .channels(&channels);
        let dispatched = {
            let dispatcher = dispatcher.clone();
            let live = live.clone();
            tokio::task::spawn_blocking(move || {
                let live = live.lock().unwrap_or_else(PoisonError::into_inner);
                if !*live {
                    return None;
                }
                Some(dispatcher.dispatch(request))
            })
            .await
        };
        let handle = match dispatched {
            Ok(Some(handle)) => handle,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(target_system = %target, error = %e, "control tick panicked");
                continue;
            }
        };
        ticks.fetch_add(1, Ordering::Relaxed);
        if let Some(outcome) = handle.outcome() {
            tracing::debug!(
                target_system = %target,
                outcome = outcome.code(),
                "control tick settled at dispatch"
            );
        }
    }
}
