//! Tool handlers exposed to the protocol layer.
//!
//! Each tool acquires the model through the shared [`ResourceManager`], does
//! its work, and answers with a [`ToolResponse`]. Failures come back as
//! `{"status": "error", "error": ...}` values; nothing panics across the
//! tool boundary.
//!
//! | Tool | Arguments |
//! |---|---|
//! | `tts_zero_shot` | [`ZeroShotArgs`] |
//! | `tts_cross_lingual` | [`CrossLingualArgs`] |
//! | `tts_instruct` | [`InstructArgs`] |
//! | `tts_sft` | [`SftArgs`] |
//! | `list_speakers` | none |
//! | `gpu_status` | none |
//! | `gpu_offload` | none |
//! | `load_model` | [`LoadModelArgs`] |

use std::ffi::OsStr;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::ToolError;
use crate::manager::{ResourceManager, StatusReport};
use crate::resource::ResourceLoader;
use crate::speech::{SpeechChunks, SpeechModel};
use crate::SynthesisResult;

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZeroShotArgs {
    pub text: String,
    /// Transcript of the prompt audio.
    pub prompt_text: String,
    /// Reference clip (3-30 seconds). Relative paths resolve against the input directory.
    pub prompt_audio_path: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub output_filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrossLingualArgs {
    pub text: String,
    pub prompt_audio_path: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub output_filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstructArgs {
    pub text: String,
    /// Style instruction, e.g. "speak slowly".
    pub instruct_text: String,
    pub prompt_audio_path: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub output_filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SftArgs {
    pub text: String,
    pub speaker_id: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
    pub output_filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadModelArgs {
    pub model_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioOutput {
    pub output_path: PathBuf,
    pub duration_seconds: f64,
    pub sample_rate: u32,
}

/// Payload of a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Audio(AudioOutput),
    Speakers { speakers: Vec<String> },
    Status(StatusReport),
    Loaded { model_dir: String },
    Message { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResponse {
    Success(ToolOutput),
    Error { error: String },
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success(_))
    }
}

impl From<Result<ToolOutput, ToolError>> for ToolResponse {
    fn from(result: Result<ToolOutput, ToolError>) -> Self {
        match result {
            Ok(output) => ToolResponse::Success(output),
            Err(e) => {
                log::warn!("Tool call failed: {e}");
                ToolResponse::Error {
                    error: e.to_string(),
                }
            }
        }
    }
}

/// Tool handlers bound to one manager and one pair of data directories.
pub struct ToolService<L: ResourceLoader> {
    manager: Arc<ResourceManager<L>>,
    config: ServiceConfig,
}

impl<L> ToolService<L>
where
    L: ResourceLoader,
    L::Resource: SpeechModel,
{
    pub fn new(manager: Arc<ResourceManager<L>>, config: ServiceConfig) -> Self {
        Self { manager, config }
    }

    pub fn manager(&self) -> &Arc<ResourceManager<L>> {
        &self.manager
    }

    /// Route a call by tool name, deserializing `args` for the tool.
    pub fn dispatch(&self, name: &str, args: serde_json::Value) -> ToolResponse {
        run_tool(name, || match name {
            "tts_zero_shot" => parse(args).and_then(|a| self.try_zero_shot(a)),
            "tts_cross_lingual" => parse(args).and_then(|a| self.try_cross_lingual(a)),
            "tts_instruct" => parse(args).and_then(|a| self.try_instruct(a)),
            "tts_sft" => parse(args).and_then(|a| self.try_sft(a)),
            "list_speakers" => self.try_list_speakers(),
            "gpu_status" => Ok(self.status_output()),
            "gpu_offload" => Ok(self.offload_output()),
            "load_model" => parse(args).and_then(|a| self.try_load_model(a)),
            other => Err(ToolError::UnknownTool(other.to_string())),
        })
    }

    pub fn tts_zero_shot(&self, args: ZeroShotArgs) -> ToolResponse {
        run_tool("tts_zero_shot", || self.try_zero_shot(args))
    }

    pub fn tts_cross_lingual(&self, args: CrossLingualArgs) -> ToolResponse {
        run_tool("tts_cross_lingual", || self.try_cross_lingual(args))
    }

    pub fn tts_instruct(&self, args: InstructArgs) -> ToolResponse {
        run_tool("tts_instruct", || self.try_instruct(args))
    }

    pub fn tts_sft(&self, args: SftArgs) -> ToolResponse {
        run_tool("tts_sft", || self.try_sft(args))
    }

    pub fn list_speakers(&self) -> ToolResponse {
        run_tool("list_speakers", || self.try_list_speakers())
    }

    pub fn gpu_status(&self) -> ToolResponse {
        run_tool("gpu_status", || Ok(self.status_output()))
    }

    /// Unload the model and free its device memory.
    pub fn gpu_offload(&self) -> ToolResponse {
        run_tool("gpu_offload", || Ok(self.offload_output()))
    }

    pub fn load_model(&self, args: LoadModelArgs) -> ToolResponse {
        run_tool("load_model", || self.try_load_model(args))
    }

    fn try_zero_shot(&self, args: ZeroShotArgs) -> Result<ToolOutput, ToolError> {
        let prompt_audio = self.input_path(&args.prompt_audio_path);
        self.synthesize(args.speed, args.output_filename.as_deref(), |model| {
            model.inference_zero_shot(&args.text, &args.prompt_text, &prompt_audio, args.speed)
        })
    }

    fn try_cross_lingual(&self, args: CrossLingualArgs) -> Result<ToolOutput, ToolError> {
        let prompt_audio = self.input_path(&args.prompt_audio_path);
        self.synthesize(args.speed, args.output_filename.as_deref(), |model| {
            model.inference_cross_lingual(&args.text, &prompt_audio, args.speed)
        })
    }

    fn try_instruct(&self, args: InstructArgs) -> Result<ToolOutput, ToolError> {
        let prompt_audio = self.input_path(&args.prompt_audio_path);
        self.synthesize(args.speed, args.output_filename.as_deref(), |model| {
            model.inference_instruct(&args.text, &args.instruct_text, &prompt_audio, args.speed)
        })
    }

    fn try_sft(&self, args: SftArgs) -> Result<ToolOutput, ToolError> {
        self.synthesize(args.speed, args.output_filename.as_deref(), |model| {
            model.inference_sft(&args.text, &args.speaker_id, args.speed)
        })
    }

    fn try_list_speakers(&self) -> Result<ToolOutput, ToolError> {
        let model = self.manager.acquire(None)?;
        Ok(ToolOutput::Speakers {
            speakers: model.list_speakers(),
        })
    }

    fn try_load_model(&self, args: LoadModelArgs) -> Result<ToolOutput, ToolError> {
        self.manager.acquire(Some(args.model_dir.as_str()))?;
        Ok(ToolOutput::Loaded {
            model_dir: args.model_dir,
        })
    }

    fn status_output(&self) -> ToolOutput {
        ToolOutput::Status(self.manager.status())
    }

    fn offload_output(&self) -> ToolOutput {
        self.manager.release();
        ToolOutput::Message {
            message: "GPU memory released".to_string(),
        }
    }

    /// Run one synthesis against the default model and write the WAV file.
    ///
    /// The model handle is dropped before the file is written.
    fn synthesize<F>(
        &self,
        speed: f32,
        output_filename: Option<&str>,
        run: F,
    ) -> Result<ToolOutput, ToolError>
    where
        F: for<'m> FnOnce(&'m L::Resource) -> SpeechChunks<'m>,
    {
        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(ToolError::InvalidSpeed(speed));
        }
        let output_path = self.output_path(output_filename)?;

        let model = self.manager.acquire(None)?;
        let result = SynthesisResult::from_chunks(run(&*model), model.sample_rate())?;
        drop(model);

        result.write_wav(&output_path)?;
        log::info!(
            "Wrote {:.2}s of audio to {}",
            result.duration_secs(),
            output_path.display()
        );

        Ok(ToolOutput::Audio(AudioOutput {
            output_path,
            duration_seconds: (result.duration_secs() * 100.0).round() / 100.0,
            sample_rate: result.sample_rate,
        }))
    }

    fn input_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.input_dir.join(path)
        }
    }

    fn output_path(&self, filename: Option<&str>) -> Result<PathBuf, ToolError> {
        let name = match filename {
            Some(name) => {
                let bare = Path::new(name).file_name() == Some(OsStr::new(name));
                if !bare {
                    return Err(ToolError::InvalidArguments(format!(
                        "output_filename must be a plain file name, got {name:?}"
                    )));
                }
                name.to_string()
            }
            None => format!("tts_{}.wav", uuid::Uuid::new_v4().simple()),
        };
        Ok(self.config.output_dir.join(name))
    }
}

/// Run a tool body, turning a panic (in a loader or model) into an error response.
fn run_tool<F>(name: &str, call: F) -> ToolResponse
where
    F: FnOnce() -> Result<ToolOutput, ToolError>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("Tool {name} panicked: {message}");
        Err(ToolError::Panicked(message))
    });
    result.into()
}

fn parse<T: DeserializeOwned>(args: serde_json::Value) -> Result<T, ToolError> {
    Ok(serde_json::from_value(args)?)
}
