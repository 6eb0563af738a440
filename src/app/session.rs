use std::borrow::Cow;

use byte_slice_cast::AsSliceOf;

use super::vocabulary::Vocabulary;
use crate::config::SAMPLE_RATE;
use crate::error::{ChunkError, PipelineError};
use crate::ports::{BoxedRecognizer, DecodingState, EndpointMode};

/// Where the current utterance is. Audio is refused in `Endpointed` until
/// [`RecognizerSession::reset`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Listening,
    Endpointed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accepted {
    pub is_final: bool,
    /// RMS level of the chunk, 0.0 to 1.0.
    pub level: f64,
}

pub struct RecognizerSession {
    engine: BoxedRecognizer,
    vocabulary: Vocabulary,
    phase: SessionPhase,
    endpoint_mode: EndpointMode,
    activity_threshold: f64,
}

impl RecognizerSession {
    pub fn new(
        mut engine: BoxedRecognizer,
        vocabulary: Vocabulary,
        activity_threshold: f64,
    ) -> Result<Self, PipelineError> {
        if engine.sample_rate() != SAMPLE_RATE as f32 {
            return Err(PipelineError::Config(format!(
                "recognizer runs at {} Hz, audio is fixed at {SAMPLE_RATE} Hz",
                engine.sample_rate()
            )));
        }
        if vocabulary.is_empty() {
            return Err(PipelineError::VocabularyBuild("vocabulary is empty".into()));
        }
        for word in engine.unknown_words(vocabulary.words()) {
            log::warn!("word {word:?} not found in the model");
        }
        let endpoint_mode = EndpointMode::default();
        engine.set_endpoint_mode(endpoint_mode);
        Ok(Self {
            engine,
            vocabulary,
            phase: SessionPhase::Idle,
            endpoint_mode,
            activity_threshold,
        })
    }

    /// Loads a Vosk model and binds a recognizer to `vocabulary`.
    #[cfg(feature = "vosk")]
    pub fn initialize(
        model_path: &std::path::Path,
        sample_rate: f32,
        vocabulary: Vocabulary,
        activity_threshold: f64,
    ) -> Result<Self, PipelineError> {
        let engine = crate::adapters::recognizer::vosk::Vosk::new_with_grammar(
            model_path,
            sample_rate,
            &vocabulary,
        )
        .map_err(|e| PipelineError::ModelLoadFailed {
            path: model_path.to_path_buf(),
            reason: format!("{e:#}"),
        })?;
        log::info!("model loaded from {}", model_path.display());
        Self::new(Box::new(engine), vocabulary, activity_threshold)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn endpoint_mode(&self) -> EndpointMode {
        self.endpoint_mode
    }

    pub fn accept_audio(&mut self, chunk: &[u8]) -> Result<Accepted, ChunkError> {
        if self.phase == SessionPhase::Endpointed {
            return Err(ChunkError::ResetRequired);
        }
        let samples = decode_pcm(chunk)?;
        let level = rms(&samples);
        if self.phase == SessionPhase::Idle && level >= self.activity_threshold {
            log::debug!("audio activity at level {level:.3}, listening");
            self.phase = SessionPhase::Listening;
        }
        match self.engine.feed(&samples) {
            DecodingState::Finalized => {
                self.phase = SessionPhase::Endpointed;
                Ok(Accepted {
                    is_final: true,
                    level,
                })
            }
            DecodingState::Running => Ok(Accepted {
                is_final: false,
                level,
            }),
            DecodingState::Failed => Err(ChunkError::DecodeFailed(format!(
                "{} samples rejected",
                samples.len()
            ))),
        }
    }

    /// Best guess for the utterance in progress. Does not consume audio.
    pub fn partial_result(&mut self) -> String {
        self.engine.partial_result()
    }

    pub fn final_result(&mut self) -> Result<String, ChunkError> {
        if self.phase != SessionPhase::Endpointed {
            return Err(ChunkError::NotEndpointed);
        }
        Ok(self.engine.final_result())
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.phase = SessionPhase::Idle;
    }

    pub fn set_endpoint_sensitivity(&mut self, mode: EndpointMode) -> Result<(), ChunkError> {
        if self.phase != SessionPhase::Idle {
            return Err(ChunkError::MidUtterance);
        }
        self.engine.set_endpoint_mode(mode);
        self.endpoint_mode = mode;
        Ok(())
    }
}

impl Drop for RecognizerSession {
    fn drop(&mut self) {
        log::info!("releasing recognizer session");
    }
}

fn decode_pcm(bytes: &[u8]) -> Result<Cow<'_, [i16]>, ChunkError> {
    if bytes.is_empty() {
        return Err(ChunkError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(ChunkError::Malformed(bytes.len()));
    }
    if cfg!(target_endian = "little") {
        // Zero-copy when the buffer happens to be aligned.
        if let Ok(samples) = bytes.as_slice_of::<i16>() {
            return Ok(Cow::Borrowed(samples));
        }
    }
    Ok(Cow::Owned(
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect(),
    ))
}

fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|sample| {
            let f = f64::from(*sample) / f64::from(i16::MAX);
            f * f
        })
        .sum();
    (sum / samples.len() as f64).sqrt()
}
