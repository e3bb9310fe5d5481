//! Kiosk host
//!
//! Owns the orchestrator state and drives it: one event at a time from a
//! single channel, `now` taken from a [`Clock`], effects handed to the
//! [`EffectExecutor`]. A tick task feeds `TICK` so the timeout rules fire
//! without any user input, and housekeeping runs alongside on its own
//! interval.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiosk_sdk::types::Event;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::db::{run_housekeeping, MemoryRepository};
use crate::executor::{EffectExecutor, KioskDevice};
use crate::orchestrator::{transition, OrchestratorState};
use crate::providers::Providers;

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by_ms: i64) {
        self.now_ms.fetch_add(by_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// The running kiosk
pub struct KioskHost {
    state: OrchestratorState,
    executor: EffectExecutor,
    clock: Arc<dyn Clock>,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    tick_interval: Duration,
    housekeeping_interval: Option<Duration>,
}

impl KioskHost {
    pub fn new(
        device: Arc<dyn KioskDevice>,
        providers: Providers,
        memories: MemoryRepository,
        clock: Arc<dyn Clock>,
        event_buffer: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_buffer.max(1));
        let executor = EffectExecutor::new(
            device,
            providers,
            memories,
            Arc::clone(&clock),
            events_tx.clone(),
        );

        Self {
            state: OrchestratorState::new(clock.now_ms()),
            executor,
            clock,
            events_tx,
            events_rx,
            tick_interval: Duration::from_secs(1),
            housekeeping_interval: None,
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sweep expired memories at startup and then every `interval`
    pub fn with_housekeeping(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = Some(interval);
        self
    }

    pub fn with_executor(mut self, configure: impl FnOnce(EffectExecutor) -> EffectExecutor) -> Self {
        self.executor = configure(self.executor);
        self
    }

    /// Sender for staff input. Provider results and ticks use clones of it.
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.events_tx.clone()
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn executor(&self) -> &EffectExecutor {
        &self.executor
    }

    /// Wait for the next queued event: staff input, a provider result or a tick
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    /// Run one event through the orchestrator and execute its effects
    pub async fn handle_event(&mut self, event: Event) {
        let now_ms = self.clock.now_ms();
        let (next, effects) = transition(&self.state, &event, now_ms);

        if next.mode != self.state.mode {
            info!("Mode changed: {} -> {}", self.state.mode, next.mode);
        }
        if next.phase != self.state.phase || !effects.is_empty() {
            debug!(
                event = event.name(),
                from = self.state.phase.as_str(),
                to = next.phase.as_str(),
                effects = ?effects.iter().map(|e| e.name()).collect::<Vec<_>>(),
                "Transition"
            );
        }

        self.state = next;
        for effect in effects {
            self.executor.execute(effect).await;
        }
    }

    /// Process events until `shutdown` resolves.
    ///
    /// Returns the final state. Running provider calls are aborted.
    pub async fn run<F>(mut self, shutdown: F) -> OrchestratorState
    where
        F: Future<Output = ()>,
    {
        info!("Kiosk host started in {} mode", self.state.mode);

        let tick_tx = self.events_tx.clone();
        let tick_interval = self.tick_interval;
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if tick_tx.send(Event::Tick).await.is_err() {
                    break;
                }
            }
        });

        let housekeeper = self.housekeeping_interval.map(|period| {
            tokio::spawn(run_housekeeping(
                self.executor.memories().clone(),
                period,
                Arc::clone(&self.clock),
            ))
        });

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Kiosk host shutting down");
                    break;
                }
                event = self.next_event() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }

        ticker.abort();
        if let Some(housekeeper) = housekeeper {
            housekeeper.abort();
        }
        self.executor.shutdown();

        self.state
    }
}
