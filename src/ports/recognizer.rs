#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingState {
    Finalized,
    Running,
    Failed,
}

/// How eagerly the engine treats trailing silence as the end of an utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointMode {
    Default,
    #[default]
    Short,
    Long,
    VeryLong,
}

/// A grammar-constrained decoder engine.
///
/// Results are returned in the engine's wire form, a single-line JSON object
/// such as `{"text": "b"}` or `{"partial": "b"}`. Callers must treat it as
/// untrusted text.
pub trait Recognizer {
    type Sample;
    fn feed(&mut self, data: &[Self::Sample]) -> DecodingState;
    fn partial_result(&mut self) -> String;
    fn final_result(&mut self) -> String;
    fn sample_rate(&self) -> f32;
    fn reset(&mut self);
    fn set_endpoint_mode(&mut self, mode: EndpointMode);
    /// Words of `vocabulary` the loaded model can't produce. Engines
    /// without a lexicon lookup report none.
    fn unknown_words(&mut self, _vocabulary: &[String]) -> Vec<String> {
        Vec::new()
    }
}

pub type BoxedRecognizer = Box<dyn Recognizer<Sample = i16> + Send>;
