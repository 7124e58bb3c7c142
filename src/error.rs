use std::time::Duration;

/// Boxed error returned by resource loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Construction of a resource instance failed.
#[derive(thiserror::Error, Debug)]
#[error("Failed to load '{key}': {source}")]
pub struct LoadError {
    pub key: String,
    #[source]
    pub source: BoxError,
}

impl LoadError {
    pub fn new(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// Teardown of a resource instance did not complete cleanly.
///
/// Never propagated out of the manager; it is logged and the slot is cleared anyway.
#[derive(thiserror::Error, Debug)]
#[error("Teardown failed: {0}")]
pub struct TeardownError(pub String);

#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Timed out after {0:?} waiting for the resource lock")]
    LockTimeout(Duration),
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Not supported by this model: {0}")]
    Unsupported(String),
    #[error("Model produced no audio")]
    EmptyOutput,
    #[error("Speaker '{0}' not found. Call list_speakers to see available speakers.")]
    SpeakerNotFound(String),
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Speed {0} out of range (0.5-2.0)")]
    InvalidSpeed(f32),
    #[error("Tool panicked: {0}")]
    Panicked(String),
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}

impl From<serde_json::Error> for ToolError {
    fn from(e: serde_json::Error) -> Self {
        ToolError::InvalidArguments(e.to_string())
    }
}
