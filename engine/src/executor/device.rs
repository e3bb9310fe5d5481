//! Kiosk hardware boundary
//!
//! Speech output, push-to-talk recording, the mode indicator and the consent
//! buttons all sit behind [`KioskDevice`]. The executor never touches hardware
//! directly.

use async_trait::async_trait;
use kiosk_sdk::errors::EngineError;
use kiosk_sdk::types::Mode;
use std::sync::Mutex;

/// The physical (or simulated) kiosk
///
/// Every method is awaited inline by the host loop, so no event is handled
/// until it returns. Implementations must not wait on the audio itself.
#[async_trait]
pub trait KioskDevice: Send + Sync {
    async fn start_recording(&self) -> Result<(), EngineError>;

    /// Stop recording and hand back the captured audio
    async fn stop_recording(&self) -> Result<Vec<u8>, EngineError>;

    /// Queue `text` for speech and return once playback has started.
    ///
    /// Must not wait for the utterance to finish: a `STAFF_EMERGENCY_STOP`
    /// arriving mid-sentence is only seen after this returns, and reaches
    /// the speaker through [`KioskDevice::interrupt`].
    async fn say(&self, text: &str) -> Result<(), EngineError>;

    /// Cut off whatever is currently being spoken
    async fn interrupt(&self) -> Result<(), EngineError>;

    async fn set_mode(&self, mode: &Mode) -> Result<(), EngineError>;

    async fn show_consent_ui(&self, visible: bool) -> Result<(), EngineError>;
}

/// Development device: prints to stdout and takes typed text as the recording.
///
/// Pair it with the stub STT provider, which decodes the "audio" back to text.
#[derive(Debug, Default)]
pub struct ConsoleDevice {
    staged: Mutex<Option<String>>,
    recording: Mutex<bool>,
}

impl ConsoleDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set what the next recording will contain
    pub fn stage_utterance(&self, text: impl Into<String>) -> Result<(), EngineError> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| EngineError::Device("console device lock poisoned".to_string()))?;
        *staged = Some(text.into());
        Ok(())
    }

    fn set_recording(&self, on: bool) -> Result<bool, EngineError> {
        let mut recording = self
            .recording
            .lock()
            .map_err(|_| EngineError::Device("console device lock poisoned".to_string()))?;
        Ok(std::mem::replace(&mut *recording, on))
    }
}

#[async_trait]
impl KioskDevice for ConsoleDevice {
    async fn start_recording(&self) -> Result<(), EngineError> {
        self.set_recording(true)?;
        println!("[mic] recording...");
        Ok(())
    }

    async fn stop_recording(&self) -> Result<Vec<u8>, EngineError> {
        if !self.set_recording(false)? {
            return Err(EngineError::Device("not recording".to_string()));
        }
        let text = self
            .staged
            .lock()
            .map_err(|_| EngineError::Device("console device lock poisoned".to_string()))?
            .take()
            .unwrap_or_default();
        println!("[mic] stopped");
        Ok(text.into_bytes())
    }

    async fn say(&self, text: &str) -> Result<(), EngineError> {
        println!("[kiosk] {}", text);
        Ok(())
    }

    async fn interrupt(&self) -> Result<(), EngineError> {
        println!("[kiosk] (stops talking)");
        Ok(())
    }

    async fn set_mode(&self, mode: &Mode) -> Result<(), EngineError> {
        println!("[mode] {}", mode);
        Ok(())
    }

    async fn show_consent_ui(&self, visible: bool) -> Result<(), EngineError> {
        if visible {
            println!("[consent] yes / no buttons shown");
        } else {
            println!("[consent] buttons hidden");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_recording_returns_staged_text() {
        let device = ConsoleDevice::new();
        device.stage_utterance("パーソナル、ゆうた").unwrap();

        device.start_recording().await.unwrap();
        let audio = device.stop_recording().await.unwrap();
        assert_eq!(String::from_utf8(audio).unwrap(), "パーソナル、ゆうた");

        // The staged text is consumed
        device.start_recording().await.unwrap();
        assert!(device.stop_recording().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_console_say_does_not_wait_for_playback() {
        let device = ConsoleDevice::new();
        let long = "きょうはいいてんきだね。".repeat(50);

        tokio::time::timeout(std::time::Duration::from_millis(100), device.say(&long))
            .await
            .expect("say returned before the utterance could finish")
            .unwrap();
        device.interrupt().await.unwrap();
    }

    #[tokio::test]
    async fn test_console_stop_without_start_fails() {
        let device = ConsoleDevice::new();
        assert!(device.stop_recording().await.is_err());
    }
}
