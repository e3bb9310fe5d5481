//! Integration tests for the kiosk host
//!
//! A scripted device and the stub providers run full conversations through
//! the host, the executor and the memory store.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use kiosk_engine::db::{Database, RetentionPolicy};
use kiosk_engine::executor::KioskDevice;
use kiosk_engine::host::{KioskHost, ManualClock};
use kiosk_engine::orchestrator::speech;
use kiosk_engine::orchestrator::{Phase, IDLE_TIMEOUT_MS};
use kiosk_engine::providers::{self, ChatProvider, ChatReply, Providers};
use kiosk_sdk::errors::EngineError;
use kiosk_sdk::types::{ConsentAnswer, Event, MemoryStatus, Mode, ProviderKind};

/// Device whose recordings are queued up front
#[derive(Default)]
struct ScriptedDevice {
    utterances: Mutex<Vec<String>>,
    spoken: Mutex<Vec<String>>,
    modes: Mutex<Vec<Mode>>,
}

impl ScriptedDevice {
    fn queue(&self, text: &str) {
        self.utterances.lock().unwrap().insert(0, text.to_string());
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    fn last_spoken(&self) -> String {
        self.spoken().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl KioskDevice for ScriptedDevice {
    async fn start_recording(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn stop_recording(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self
            .utterances
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_default()
            .into_bytes())
    }

    async fn say(&self, text: &str) -> Result<(), EngineError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn set_mode(&self, mode: &Mode) -> Result<(), EngineError> {
        self.modes.lock().unwrap().push(mode.clone());
        Ok(())
    }

    async fn show_consent_ui(&self, _visible: bool) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Chat provider that never answers in time
struct StalledChat;

#[async_trait]
impl ChatProvider for StalledChat {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn chat(&self, _mode: &Mode, _text: &str) -> providers::Result<ChatReply> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(ChatReply::text("too late"))
    }
}

async fn setup(providers: Providers) -> (TempDir, Arc<ScriptedDevice>, Arc<ManualClock>, KioskHost) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("kiosk.db")).await.unwrap();
    let device = Arc::new(ScriptedDevice::default());
    let clock = Arc::new(ManualClock::new(1_000_000));

    let host = KioskHost::new(
        device.clone(),
        providers,
        db.memories(RetentionPolicy::default()),
        clock.clone(),
        32,
    );

    (temp_dir, device, clock, host)
}

/// Handle `event`, then every provider result it causes, until the host is
/// no longer waiting on a provider
async fn settle(host: &mut KioskHost, event: Event) {
    host.handle_event(event).await;
    while matches!(
        host.state().phase,
        Phase::WaitingStt | Phase::WaitingChat | Phase::WaitingInnerTask
    ) {
        let next = tokio::time::timeout(Duration::from_secs(2), host.next_event())
            .await
            .expect("provider result in time")
            .expect("channel open");
        host.handle_event(next).await;
    }
}

/// One push-to-talk turn with the given words
async fn talk(host: &mut KioskHost, device: &ScriptedDevice, text: &str) {
    device.queue(text);
    settle(host, Event::StaffPttDown).await;
    settle(host, Event::StaffPttUp).await;
}

#[tokio::test]
async fn test_personal_conversation_with_consent() {
    let (_dir, device, _clock, mut host) = setup(Providers::stub()).await;

    talk(&mut host, &device, "パーソナル、ゆうた").await;
    assert_eq!(host.state().mode, Mode::personal("ゆうた"));
    assert_eq!(device.last_spoken(), speech::personal_ack("ゆうた"));

    talk(&mut host, &device, "カレーが好き").await;
    assert_eq!(host.state().phase, Phase::AskingConsent);
    assert!(device.last_spoken().contains("カレー"));

    talk(&mut host, &device, "うん、いいよ").await;
    assert_eq!(host.state().phase, Phase::Idle);
    assert!(host.state().pending_consent.is_none());
    assert_eq!(device.last_spoken(), speech::CONSENT_THANKS);

    let items = host
        .executor()
        .memories()
        .list(Some("ゆうた"), None)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].value, "カレー");
    assert_eq!(items[0].status, MemoryStatus::Pending);

    // Staff review from the console
    settle(
        &mut host,
        Event::StaffMemoryConfirm {
            memory_id: items[0].id.clone(),
        },
    )
    .await;
    let item = host
        .executor()
        .memories()
        .get(&items[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, MemoryStatus::Confirmed);
    assert_eq!(item.source_quote, None);
}

#[tokio::test]
async fn test_consent_button_declines_without_storing() {
    let (_dir, device, _clock, mut host) = setup(Providers::stub()).await;

    talk(&mut host, &device, "パーソナル、さくら").await;
    talk(&mut host, &device, "ねこが好き").await;
    assert_eq!(host.state().phase, Phase::AskingConsent);

    settle(
        &mut host,
        Event::UiConsentButton {
            answer: ConsentAnswer::No,
        },
    )
    .await;
    assert_eq!(device.last_spoken(), speech::CONSENT_DECLINED);
    assert!(host
        .executor()
        .memories()
        .list(None, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_room_mode_never_asks_for_consent() {
    let (_dir, device, _clock, mut host) = setup(Providers::stub()).await;

    talk(&mut host, &device, "サッカーが好き").await;
    assert_eq!(host.state().mode, Mode::Room);
    assert_eq!(host.state().phase, Phase::Idle);
    assert!(host.state().pending_consent.is_none());
}

#[tokio::test]
async fn test_idle_timeout_returns_to_room() {
    let (_dir, device, clock, mut host) = setup(Providers::stub()).await;

    talk(&mut host, &device, "パーソナル、ゆうた").await;
    let spoken_before = device.spoken().len();

    clock.advance(IDLE_TIMEOUT_MS);
    settle(&mut host, Event::Tick).await;

    assert_eq!(host.state().mode, Mode::Room);
    assert_eq!(device.spoken().len(), spoken_before);
    assert_eq!(device.modes.lock().unwrap().last(), Some(&Mode::Room));
}

#[tokio::test]
async fn test_chat_timeout_speaks_fallback() {
    let providers = Providers {
        chat: Arc::new(StalledChat),
        ..Providers::stub()
    };
    let (_dir, device, _clock, host) = setup(providers).await;
    let mut host =
        host.with_executor(|executor| executor.with_timeout(ProviderKind::Chat, Duration::from_millis(50)));

    talk(&mut host, &device, "こんにちは").await;

    assert_eq!(host.state().phase, Phase::Idle);
    assert_eq!(device.last_spoken(), speech::CHAT_FALLBACK);
}

#[tokio::test]
async fn test_force_room_cancels_running_chat() {
    let providers = Providers {
        chat: Arc::new(StalledChat),
        ..Providers::stub()
    };
    let (_dir, device, _clock, mut host) = setup(providers).await;

    device.queue("こんにちは");
    host.handle_event(Event::StaffPttDown).await;
    host.handle_event(Event::StaffPttUp).await;
    let stt = tokio::time::timeout(Duration::from_secs(2), host.next_event())
        .await
        .unwrap()
        .unwrap();
    host.handle_event(stt).await;
    assert_eq!(host.state().phase, Phase::WaitingChat);
    assert!(host.executor().running_call(ProviderKind::Chat).is_some());

    host.handle_event(Event::StaffForceRoom).await;
    assert_eq!(host.state().phase, Phase::Idle);
    assert!(host.executor().running_call(ProviderKind::Chat).is_none());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (_dir, device, _clock, host) = setup(Providers::stub()).await;
    let host = host.with_tick_interval(Duration::from_millis(10));
    let sender = host.sender();

    device.queue("パーソナル、ゆうた");
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(host.run(async {
        let _ = stop_rx.await;
    }));

    sender.send(Event::StaffPttDown).await.unwrap();
    sender.send(Event::StaffPttUp).await.unwrap();

    let mut switched = false;
    for _ in 0..100 {
        if device.modes.lock().unwrap().contains(&Mode::personal("ゆうた")) {
            switched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(switched);

    stop_tx.send(()).unwrap();
    let final_state = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(final_state.mode, Mode::personal("ゆうた"));
}
