use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::controller::{CapabilityError, SpeechCapture, SpeechSynthesizer};

/// Stands in for the microphone: typed lines are the rep's utterances.
#[derive(Default)]
pub struct ConsoleCapture {
    listening: AtomicBool,
}

impl ConsoleCapture {
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SpeechCapture for ConsoleCapture {
    async fn start(&self) -> Result<(), CapabilityError> {
        self.listening.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        self.listening.store(false, Ordering::Release);
        Ok(())
    }
}

/// Stands in for text-to-speech: prints what the interviewer says.
pub struct ConsoleVoice<W> {
    out: Mutex<W>,
}

impl<W> ConsoleVoice<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }
}

#[async_trait]
impl<W> SpeechSynthesizer for ConsoleVoice<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn speak(&self, text: &str) -> Result<(), CapabilityError> {
        let mut out = self.out.lock().await;
        let line = format!("interviewer> {text}\n");
        out.write_all(line.as_bytes())
            .await
            .map_err(|error| CapabilityError::Playback(error.to_string()))?;
        out.flush().await.map_err(|error| CapabilityError::Playback(error.to_string()))
    }

    async fn stop(&self) -> Result<(), CapabilityError> {
        Ok(())
    }
}
