use std::f32::consts::TAU;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tts_slot::{
    BoxError, ManagerConfig, NvidiaSmiProbe, Resource, ResourceManager, ServiceConfig,
    SpeechChunks, SpeechModel, SynthesisError, ToolService,
};

/// Stand-in model: one short sine beep per word.
struct BeepModel {
    pitch: f32,
}

const SAMPLE_RATE: u32 = 22050;

impl BeepModel {
    fn beeps(&self, text: &str, speed: f32) -> SpeechChunks<'_> {
        let len = (SAMPLE_RATE as f32 * 0.2 / speed) as usize;
        let pitch = self.pitch;
        let words = text.split_whitespace().count();
        Box::new((0..words).map(move |_| {
            Ok::<_, SynthesisError>(
                (0..len)
                    .map(|i| (TAU * pitch * i as f32 / SAMPLE_RATE as f32).sin() * 0.2)
                    .collect(),
            )
        }))
    }
}

impl Resource for BeepModel {}

impl SpeechModel for BeepModel {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn list_speakers(&self) -> Vec<String> {
        vec!["low".to_string(), "high".to_string()]
    }

    fn inference_zero_shot(&self, text: &str, _: &str, _: &Path, speed: f32) -> SpeechChunks<'_> {
        self.beeps(text, speed)
    }

    fn inference_cross_lingual(&self, text: &str, _: &Path, speed: f32) -> SpeechChunks<'_> {
        self.beeps(text, speed)
    }

    fn inference_sft(&self, text: &str, _: &str, speed: f32) -> SpeechChunks<'_> {
        self.beeps(text, speed)
    }
}

fn load_beeper(key: &str) -> Result<BeepModel, BoxError> {
    std::thread::sleep(Duration::from_millis(500));
    let pitch = if key.ends_with("high") { 880.0 } else { 440.0 };
    Ok(BeepModel { pitch })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let manager = Arc::new(ResourceManager::with_probe(
        load_beeper,
        ManagerConfig::from_env(),
        NvidiaSmiProbe::default(),
    ));
    let service_config = ServiceConfig {
        output_dir: std::env::temp_dir().join("tts-slot"),
        ..ServiceConfig::from_env()
    };
    std::fs::create_dir_all(&service_config.output_dir)?;
    let tools = ToolService::new(Arc::clone(&manager), service_config);

    let start = Instant::now();
    let response = tools.dispatch(
        "tts_sft",
        serde_json::json!({ "text": "hello from the beep model", "speaker_id": "low" }),
    );
    println!("{} ({:.2?})", serde_json::to_string(&response)?, start.elapsed());

    let start = Instant::now();
    let response = tools.dispatch("tts_sft", serde_json::json!({ "text": "again", "speaker_id": "low" }));
    println!("{} ({:.2?}, no reload)", serde_json::to_string(&response)?, start.elapsed());

    let response = tools.dispatch("load_model", serde_json::json!({ "model_dir": "models/high" }));
    println!("{}", serde_json::to_string(&response)?);

    println!("{}", serde_json::to_string_pretty(&tools.gpu_status())?);
    println!("{}", serde_json::to_string(&tools.gpu_offload())?);
    println!("{}", serde_json::to_string_pretty(&tools.gpu_status())?);

    Ok(())
}
