use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::PipelineError;
use crate::ports::EndpointMode;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Audio format is fixed: mono s16le at 16 kHz.
pub const SAMPLE_RATE: u32 = 16000;
pub const CHANNELS: u32 = 1;
pub const BYTES_PER_SAMPLE: usize = 2;

pub const DEFAULT_MODEL: &str = "vosk-model-small-en-us-0.15";

/// What a Final result that resolves to no letter does to the published one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NoMatchPolicy {
    /// Keep showing the previous letter.
    #[default]
    Retain,
    /// Publish "no letter".
    Clear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IngestMode {
    /// The audio thread runs recognition from its callback.
    #[default]
    Push,
    /// The main loop drains and batches audio itself.
    Pull,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub model_dir: PathBuf,
    pub model_name: String,
    /// Also accept NATO words ("alfa".."zulu").
    pub phonetic: bool,
    pub mode: IngestMode,
    pub endpoint: EndpointMode,
    /// Pull mode only: audio accumulated before one recognizer call.
    pub batch_ms: u32,
    /// Pull mode only: most bytes drained per poll.
    pub drain_bytes: usize,
    /// RMS level (0..1) at which a chunk counts as speech.
    pub activity_threshold: f64,
    pub no_match: NoMatchPolicy,
    /// Surface partial results as hints.
    pub hints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("assets"),
            model_name: DEFAULT_MODEL.to_string(),
            phonetic: true,
            mode: IngestMode::default(),
            endpoint: EndpointMode::default(),
            batch_ms: 500,
            drain_bytes: 4096,
            activity_threshold: 0.01,
            no_match: NoMatchPolicy::default(),
            hints: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.model_name.trim().is_empty() {
            return Err(PipelineError::Config("model_name is empty".into()));
        }
        if self.batch_ms == 0 {
            return Err(PipelineError::Config("batch_ms must be positive".into()));
        }
        if self.drain_bytes < BYTES_PER_SAMPLE {
            return Err(PipelineError::Config(format!(
                "drain_bytes must be at least {BYTES_PER_SAMPLE}"
            )));
        }
        if !(0.0..=1.0).contains(&self.activity_threshold) {
            return Err(PipelineError::Config(
                "activity_threshold must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }

    /// `batch_ms` of audio in bytes, rounded to whole samples.
    pub fn batch_bytes(&self) -> usize {
        let samples = SAMPLE_RATE as usize * self.batch_ms as usize / 1000;
        samples.max(1) * BYTES_PER_SAMPLE
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_name)
    }
}
