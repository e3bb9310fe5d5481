//! Effect executor
//!
//! Performs the I/O the orchestrator asks for. Device and store effects run
//! inline; provider calls run on their own tokio tasks and report back as
//! events on the host's channel, each bounded by its kind's time budget.
//!
//! At most one call per provider kind is tracked. Starting a new call of a
//! kind aborts the previous one, and `CANCEL_PROVIDER_CALL` aborts the call
//! only if its request id still matches. Aborting is best effort: a result
//! that slips through is dropped by the orchestrator's id check.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kiosk_sdk::errors::EngineError;
use kiosk_sdk::types::{Effect, Event, InnerTaskKind, ProviderKind, RequestId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::MemoryRepository;
use crate::host::Clock;
use crate::providers::Providers;

pub mod device;

pub use device::{ConsoleDevice, KioskDevice};

struct ProviderCall {
    request_id: RequestId,
    handle: JoinHandle<()>,
}

/// Turns effects into device actions, store writes and provider tasks
pub struct EffectExecutor {
    device: Arc<dyn KioskDevice>,
    providers: Providers,
    memories: MemoryRepository,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<Event>,
    calls: HashMap<ProviderKind, ProviderCall>,
    timeouts: HashMap<ProviderKind, Duration>,

    /// Audio from the last `KIOSK_RECORD_STOP`, consumed by the next `CALL_STT`
    recording: Option<Vec<u8>>,
}

impl EffectExecutor {
    pub fn new(
        device: Arc<dyn KioskDevice>,
        providers: Providers,
        memories: MemoryRepository,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<Event>,
    ) -> Self {
        let timeouts = ProviderKind::ALL
            .iter()
            .map(|kind| (*kind, Duration::from_millis(kind.timeout_ms())))
            .collect();

        Self {
            device,
            providers,
            memories,
            clock,
            events,
            calls: HashMap::new(),
            timeouts,
            recording: None,
        }
    }

    /// Override the time budget of one provider kind
    pub fn with_timeout(mut self, kind: ProviderKind, timeout: Duration) -> Self {
        self.timeouts.insert(kind, timeout);
        self
    }

    pub fn memories(&self) -> &MemoryRepository {
        &self.memories
    }

    /// Request id of the provider call still tracked for `kind`
    pub fn running_call(&self, kind: ProviderKind) -> Option<&str> {
        self.calls
            .get(&kind)
            .filter(|call| !call.handle.is_finished())
            .map(|call| call.request_id.as_str())
    }

    /// Execute one effect. Failures are logged, never returned.
    pub async fn execute(&mut self, effect: Effect) {
        debug!("Executing {}", effect.name());

        match effect {
            Effect::KioskRecordStart => {
                self.recording = None;
                if let Err(e) = self.device.start_recording().await {
                    error!("Failed to start recording: {}", e);
                }
            }
            Effect::KioskRecordStop => match self.device.stop_recording().await {
                Ok(audio) => self.recording = Some(audio),
                Err(e) => {
                    error!("Failed to stop recording: {}", e);
                    self.recording = Some(Vec::new());
                }
            },
            Effect::CallStt { request_id } => {
                let audio = self.recording.take().unwrap_or_default();
                let stt = Arc::clone(&self.providers.stt);
                let timeout = self.timeout_for(ProviderKind::Stt);
                let id = request_id.clone();
                self.spawn_call(ProviderKind::Stt, request_id, async move {
                    match tokio::time::timeout(timeout, stt.transcribe(&audio)).await {
                        Ok(Ok(text)) => Event::SttResult {
                            request_id: id,
                            text,
                        },
                        Ok(Err(e)) => Event::SttFailed {
                            request_id: id,
                            reason: e.into_engine_error(ProviderKind::Stt).to_string(),
                        },
                        Err(_) => Event::SttFailed {
                            request_id: id,
                            reason: EngineError::ProviderTimeout(ProviderKind::Stt).to_string(),
                        },
                    }
                });
            }
            Effect::CallChat {
                request_id,
                mode,
                text,
            } => {
                let chat = Arc::clone(&self.providers.chat);
                let timeout = self.timeout_for(ProviderKind::Chat);
                let id = request_id.clone();
                self.spawn_call(ProviderKind::Chat, request_id, async move {
                    match tokio::time::timeout(timeout, chat.chat(&mode, &text)).await {
                        Ok(Ok(reply)) => Event::ChatResult {
                            request_id: id,
                            assistant_text: reply.assistant_text,
                            memory_candidate: reply.memory_candidate,
                        },
                        Ok(Err(e)) => Event::ChatFailed {
                            request_id: id,
                            reason: e.into_engine_error(ProviderKind::Chat).to_string(),
                        },
                        Err(_) => Event::ChatFailed {
                            request_id: id,
                            reason: EngineError::ProviderTimeout(ProviderKind::Chat).to_string(),
                        },
                    }
                });
            }
            Effect::CallInnerTask {
                request_id,
                task,
                input,
            } => self.call_inner_task(request_id, task, input),
            Effect::CancelProviderCall { kind, request_id } => {
                self.cancel(kind, &request_id);
            }
            Effect::Say { text } => {
                if let Err(e) = self.device.say(&text).await {
                    error!("Failed to speak: {}", e);
                }
            }
            Effect::SayInterrupt => {
                if let Err(e) = self.device.interrupt().await {
                    error!("Failed to interrupt speech: {}", e);
                }
            }
            Effect::SetMode { mode } => {
                if let Err(e) = self.device.set_mode(&mode).await {
                    error!("Failed to show mode {}: {}", mode, e);
                }
            }
            Effect::ShowConsentUi { visible } => {
                if let Err(e) = self.device.show_consent_ui(visible).await {
                    error!("Failed to toggle consent UI: {}", e);
                }
            }
            Effect::StoreWritePending {
                personal_name,
                candidate,
            } => {
                match self
                    .memories
                    .insert_pending(&personal_name, &candidate, self.clock.now_ms())
                    .await
                {
                    Ok(item) => info!(
                        memory_id = %item.id,
                        kind = %item.kind,
                        "Stored pending memory for staff review"
                    ),
                    Err(e) => error!("Failed to store pending memory: {:#}", e),
                }
            }
            Effect::StoreWriteConfirmed { memory_id } => {
                match self.memories.confirm(&memory_id, self.clock.now_ms()).await {
                    Ok(_) => info!(memory_id = %memory_id, "Memory confirmed"),
                    Err(e) => error!("Failed to confirm memory {}: {:#}", memory_id, e),
                }
            }
            Effect::StoreWriteRejected { memory_id } => {
                match self.memories.reject(&memory_id, self.clock.now_ms()).await {
                    Ok(_) => info!(memory_id = %memory_id, "Memory rejected"),
                    Err(e) => error!("Failed to reject memory {}: {:#}", memory_id, e),
                }
            }
        }
    }

    /// Abort every running provider call
    pub fn shutdown(&mut self) {
        for (kind, call) in self.calls.drain() {
            if !call.handle.is_finished() {
                debug!("Aborting {} call {} on shutdown", kind, call.request_id);
                call.handle.abort();
            }
        }
    }

    fn call_inner_task(&mut self, request_id: RequestId, task: InnerTaskKind, input: String) {
        let inner_task = Arc::clone(&self.providers.inner_task);
        let timeout = self.timeout_for(ProviderKind::InnerTask);
        let id = request_id.clone();
        self.spawn_call(ProviderKind::InnerTask, request_id, async move {
            match tokio::time::timeout(timeout, inner_task.run(task, &input)).await {
                Ok(Ok(json_text)) => Event::InnerTaskResult {
                    request_id: id,
                    json_text,
                },
                Ok(Err(e)) => Event::InnerTaskFailed {
                    request_id: id,
                    reason: e.into_engine_error(ProviderKind::InnerTask).to_string(),
                },
                Err(_) => Event::InnerTaskFailed {
                    request_id: id,
                    reason: EngineError::ProviderTimeout(ProviderKind::InnerTask).to_string(),
                },
            }
        });
    }

    fn timeout_for(&self, kind: ProviderKind) -> Duration {
        self.timeouts
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Duration::from_millis(kind.timeout_ms()))
    }

    fn spawn_call<F>(&mut self, kind: ProviderKind, request_id: RequestId, call: F)
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let event = call.await;
            if let Event::SttFailed { reason, .. }
            | Event::ChatFailed { reason, .. }
            | Event::InnerTaskFailed { reason, .. } = &event
            {
                warn!("{} call failed: {}", kind, reason);
            }
            if events.send(event).await.is_err() {
                debug!("Event channel closed, dropping {} result", kind);
            }
        });

        if let Some(previous) = self.calls.insert(
            kind,
            ProviderCall {
                request_id,
                handle,
            },
        ) {
            if !previous.handle.is_finished() {
                debug!("Superseding {} call {}", kind, previous.request_id);
                previous.handle.abort();
            }
        }
    }

    fn cancel(&mut self, kind: ProviderKind, request_id: &str) {
        match self.calls.get(&kind) {
            Some(call) if call.request_id == request_id => {
                if let Some(call) = self.calls.remove(&kind) {
                    call.handle.abort();
                    debug!("Cancelled {} call {}", kind, request_id);
                }
            }
            _ => debug!("No running {} call {} to cancel", kind, request_id),
        }
    }
}

impl Drop for EffectExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
