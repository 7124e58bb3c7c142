//! Boundary to the speech-synthesis model.
//!
//! The model itself lives outside this crate. Implementations are shared
//! through [`ResourceHandle`](crate::ResourceHandle)s, so every method takes
//! `&self`; models with mutable inference state need their own interior
//! locking.

use std::path::Path;

use crate::error::SynthesisError;
use crate::resource::Resource;

/// Audio produced chunk by chunk. Each item is a run of mono f32 samples.
pub type SpeechChunks<'a> = Box<dyn Iterator<Item = Result<Vec<f32>, SynthesisError>> + 'a>;

/// A loaded text-to-speech model.
pub trait SpeechModel: Resource {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Pretrained speaker IDs usable with [`SpeechModel::inference_sft`].
    fn list_speakers(&self) -> Vec<String>;

    /// Clone the voice in `prompt_audio`, whose transcript is `prompt_text`.
    fn inference_zero_shot(
        &self,
        text: &str,
        prompt_text: &str,
        prompt_audio: &Path,
        speed: f32,
    ) -> SpeechChunks<'_>;

    /// Clone the voice in `prompt_audio` while speaking another language.
    fn inference_cross_lingual(&self, text: &str, prompt_audio: &Path, speed: f32)
        -> SpeechChunks<'_>;

    /// Speak as a pretrained speaker.
    fn inference_sft(&self, text: &str, speaker_id: &str, speed: f32) -> SpeechChunks<'_>;

    /// Voice-cloned synthesis steered by a style instruction.
    ///
    /// Models without prompt-audio instruct support fall back to
    /// [`SpeechModel::inference_instruct_sft`] with no speaker.
    fn inference_instruct(
        &self,
        text: &str,
        instruct_text: &str,
        prompt_audio: &Path,
        speed: f32,
    ) -> SpeechChunks<'_> {
        let _ = prompt_audio;
        self.inference_instruct_sft(text, "", instruct_text, speed)
    }

    /// Instruction-steered synthesis with a pretrained speaker.
    fn inference_instruct_sft(
        &self,
        text: &str,
        speaker_id: &str,
        instruct_text: &str,
        speed: f32,
    ) -> SpeechChunks<'_> {
        let _ = (text, speaker_id, instruct_text, speed);
        Box::new(std::iter::once(Err::<Vec<f32>, _>(SynthesisError::Unsupported(
            "instruct synthesis".to_string(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Resource for Plain {}
    impl SpeechModel for Plain {
        fn sample_rate(&self) -> u32 {
            16000
        }
        fn list_speakers(&self) -> Vec<String> {
            Vec::new()
        }
        fn inference_zero_shot(&self, _: &str, _: &str, _: &Path, _: f32) -> SpeechChunks<'_> {
            Box::new(std::iter::empty())
        }
        fn inference_cross_lingual(&self, _: &str, _: &Path, _: f32) -> SpeechChunks<'_> {
            Box::new(std::iter::empty())
        }
        fn inference_sft(&self, _: &str, _: &str, _: f32) -> SpeechChunks<'_> {
            Box::new(std::iter::empty())
        }
    }

    #[test]
    fn instruct_is_unsupported_by_default() {
        let mut chunks = Plain.inference_instruct("hi", "slowly", Path::new("p.wav"), 1.0);
        assert!(matches!(
            chunks.next(),
            Some(Err(SynthesisError::Unsupported(_)))
        ));
    }
}
