use std::path;

use anyhow::Context;

use crate::app::vocabulary::Vocabulary;
use crate::ports::recognizer::*;

// Field order matters: the recognizer is released before its model.
pub struct Vosk {
    recognizer: vosk::Recognizer,
    model: vosk::Model,
    sample_rate: f32,
}

impl Vosk {
    pub fn new_with_grammar(
        model_path: &path::Path,
        sample_rate: f32,
        vocabulary: &Vocabulary,
    ) -> anyhow::Result<Self> {
        let model_dir = model_path
            .to_str()
            .context("model path is not valid UTF-8")?;
        let model = vosk::Model::new(model_dir).context("loading vosk model")?;
        let mut recognizer =
            vosk::Recognizer::new_with_grammar(&model, sample_rate, vocabulary.phrases())
                .context("creating grammar-constrained vosk recognizer")?;
        recognizer.set_max_alternatives(0);
        recognizer.set_words(false);
        recognizer.set_partial_words(false);
        Ok(Self {
            recognizer,
            model,
            sample_rate,
        })
    }
}

fn wire(key: &str, text: &str) -> String {
    serde_json::json!({ key: text }).to_string()
}

impl Recognizer for Vosk {
    type Sample = i16;

    fn feed(&mut self, data: &[Self::Sample]) -> DecodingState {
        match self.recognizer.accept_waveform(data) {
            Ok(vosk::DecodingState::Finalized) => DecodingState::Finalized,
            Ok(vosk::DecodingState::Running) => DecodingState::Running,
            Ok(vosk::DecodingState::Failed) => DecodingState::Failed,
            Err(e) => {
                log::warn!("vosk rejected waveform: {e:?}");
                DecodingState::Failed
            }
        }
    }

    fn partial_result(&mut self) -> String {
        wire("partial", self.recognizer.partial_result().partial)
    }

    fn final_result(&mut self) -> String {
        match self.recognizer.final_result() {
            vosk::CompleteResult::Single(single) => wire("text", single.text),
            vosk::CompleteResult::Multiple(multiple) => {
                let alternatives: Vec<_> = multiple
                    .alternatives
                    .iter()
                    .map(|a| serde_json::json!({ "confidence": a.confidence, "text": a.text }))
                    .collect();
                serde_json::json!({ "alternatives": alternatives }).to_string()
            }
        }
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn reset(&mut self) {
        self.recognizer.reset();
    }

    fn set_endpoint_mode(&mut self, mode: EndpointMode) {
        let mode = match mode {
            EndpointMode::Default => vosk::EndpointerMode::Default,
            EndpointMode::Short => vosk::EndpointerMode::Short,
            EndpointMode::Long => vosk::EndpointerMode::Long,
            EndpointMode::VeryLong => vosk::EndpointerMode::VeryLong,
        };
        self.recognizer.set_endpointer_mode(mode);
    }

    fn unknown_words(&mut self, vocabulary: &[String]) -> Vec<String> {
        vocabulary
            .iter()
            .filter(|w| self.model.find_word(w).is_none())
            .cloned()
            .collect()
    }
}

impl Drop for Vosk {
    fn drop(&mut self) {
        log::info!("freeing vosk recognizer and model");
    }
}
