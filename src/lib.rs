//! # tts-slot
//!
//! Lifecycle management for a single GPU-resident text-to-speech model, plus
//! the tool handlers that drive it.
//!
//! ## Features
//!
//! - **Single-slot manager**: at most one model loaded at a time, loaded on
//!   first use and swapped when a different model directory is requested
//! - **Safe handles**: an instance is never torn down while a caller uses it
//! - **Explicit eviction**: `release` frees the model; nothing is evicted behind
//!   your back
//! - **Tool handlers**: zero-shot, cross-lingual, instruct and SFT synthesis
//!   tools that write WAV files, plus status/offload/load tools
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tts_slot::{ManagerConfig, ResourceManager, ServiceConfig, ToolService};
//!
//! let manager = Arc::new(ResourceManager::new(my_loader, ManagerConfig::from_env()));
//! let tools = ToolService::new(Arc::clone(&manager), ServiceConfig::from_env());
//!
//! let response = tools.dispatch("tts_sft", serde_json::json!({
//!     "text": "Hello, world!",
//!     "speaker_id": "english_female",
//! }));
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod manager;
pub mod resource;
pub mod speech;
pub mod tools;

use std::path::Path;

pub use config::{ManagerConfig, ManagerConfigBuilder, ServiceConfig, ServiceConfigBuilder};
pub use device::{DeviceInfo, DeviceProbe, NoDevice, NvidiaSmiProbe};
pub use error::{
    BoxError, LoadError, ManagerError, SynthesisError, TeardownError, ToolError,
};
pub use manager::{ResourceHandle, ResourceManager, StatusReport};
pub use resource::{Resource, ResourceLoader};
pub use speech::{SpeechChunks, SpeechModel};
pub use tools::{ToolResponse, ToolService};

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug)]
pub struct SynthesisResult {
    /// Raw mono audio samples
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesisResult {
    /// Concatenate streamed chunks into one buffer.
    ///
    /// Fails on the first chunk error, or if the model produced no samples.
    pub fn from_chunks(chunks: SpeechChunks<'_>, sample_rate: u32) -> Result<Self, SynthesisError> {
        let mut samples = Vec::new();
        for chunk in chunks {
            samples.extend_from_slice(&chunk?);
        }
        if samples.is_empty() {
            return Err(SynthesisError::EmptyOutput);
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), SynthesisError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_chunks_in_order() {
        let parts: Vec<Result<Vec<f32>, SynthesisError>> = vec![Ok(vec![0.1, 0.2]), Ok(vec![0.3])];
        let chunks: SpeechChunks<'_> = Box::new(parts.into_iter());
        let result = SynthesisResult::from_chunks(chunks, 4).unwrap();
        assert_eq!(result.samples, vec![0.1, 0.2, 0.3]);
        assert_eq!(result.duration_secs(), 0.75);
    }

    #[test]
    fn no_samples_is_an_error() {
        let chunks: SpeechChunks<'_> = Box::new(std::iter::empty());
        assert!(matches!(
            SynthesisResult::from_chunks(chunks, 16000),
            Err(SynthesisError::EmptyOutput)
        ));
    }

    #[test]
    fn chunk_error_propagates() {
        let parts: Vec<Result<Vec<f32>, SynthesisError>> =
            vec![Ok(vec![0.5]), Err(SynthesisError::Inference("oom".into()))];
        let chunks: SpeechChunks<'_> = Box::new(parts.into_iter());
        assert!(matches!(
            SynthesisResult::from_chunks(chunks, 16000),
            Err(SynthesisError::Inference(_))
        ));
    }

    #[test]
    fn writes_readable_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let result = SynthesisResult {
            samples: vec![0.0, 0.25, -0.25],
            sample_rate: 22050,
        };
        result.write_wav(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 3);
    }
}
