use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::backend::CaptureBackend;
use super::codec::encode_outbound;

/// One captured frame, encoded for the wire
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    /// Base64 16-bit LE PCM
    pub data: String,
    pub sample_rate: u32,
    pub sequence: u64,
}

impl EncodedChunk {
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Destination for encoded frames. Must never fail or block.
pub trait FrameSink: Send + Sync {
    fn forward(&self, chunk: EncodedChunk);
}

/// Microphone → encoder → session pump
#[derive(Default)]
pub struct CapturePipeline {
    backend: Option<Box<dyn CaptureBackend>>,
    pump: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    /// An inactive pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the backend and pump every frame through the encoder into `sink`
    pub async fn activate(
        mut backend: Box<dyn CaptureBackend>,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self> {
        let name = backend.name().to_string();
        let mut frames = backend
            .start()
            .await
            .with_context(|| format!("Failed to start {} capture", name))?;

        info!("Capture pipeline active ({})", name);

        let pump = tokio::spawn(async move {
            let mut sequence = 0u64;
            while let Some(frame) = frames.recv().await {
                sink.forward(EncodedChunk {
                    data: encode_outbound(&frame.samples),
                    sample_rate: frame.sample_rate,
                    sequence,
                });
                sequence += 1;
            }
            info!("Capture stream ended after {} frames", sequence);
        });

        Ok(Self {
            backend: Some(backend),
            pump: Some(pump),
        })
    }

    /// Stop the pump and the backend. Safe to call repeatedly or when inactive.
    pub async fn deactivate(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut backend) = self.backend.take() {
            let name = backend.name().to_string();
            if let Err(e) = backend.stop().await {
                error!("Failed to stop {} capture: {}", name, e);
            }
            info!("Capture pipeline stopped ({})", name);
        }
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_some()
    }
}
