//! A recognizer that replays a fixed script, one step per fed chunk.
//! Used for tests and for exercising the pipeline without a model.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::SAMPLE_RATE;
use crate::ports::recognizer::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep decoding; `partial_result` reports the text.
    Partial(String),
    /// Endpoint; `final_result` reports the text.
    Final(String),
    /// Endpoint with a verbatim result, for malformed-output cases.
    RawFinal(String),
    Fail,
}

impl Step {
    pub fn partial(text: &str) -> Self {
        Self::Partial(text.to_string())
    }

    pub fn final_text(text: &str) -> Self {
        Self::Final(text.to_string())
    }
}

/// Counters shared with the test that owns the script.
#[derive(Debug, Default)]
pub struct Probe {
    pub chunks: AtomicUsize,
    pub samples: AtomicUsize,
    pub resets: AtomicUsize,
    /// Set if audio arrived after an endpoint without an intervening reset.
    pub fed_after_final: AtomicBool,
    pub endpoint_mode: Mutex<Option<EndpointMode>>,
}

pub struct Scripted {
    steps: VecDeque<Step>,
    partial: String,
    last_final: Option<String>,
    endpointed: bool,
    sample_rate: f32,
    lexicon: Option<Vec<String>>,
    probe: Arc<Probe>,
}

impl Scripted {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            partial: String::new(),
            last_final: None,
            endpointed: false,
            sample_rate: SAMPLE_RATE as f32,
            lexicon: None,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn with_sample_rate(mut self, rate: f32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Words outside `lexicon` are reported by `unknown_words`.
    pub fn with_lexicon(mut self, lexicon: &[&str]) -> Self {
        self.lexicon = Some(lexicon.iter().map(|w| w.to_string()).collect());
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        self.probe.clone()
    }
}

fn wire(key: &str, text: &str) -> String {
    format!("{{\"{key}\": {}}}", serde_json::Value::from(text))
}

impl Recognizer for Scripted {
    type Sample = i16;

    fn feed(&mut self, data: &[Self::Sample]) -> DecodingState {
        self.probe.chunks.fetch_add(1, Ordering::SeqCst);
        self.probe.samples.fetch_add(data.len(), Ordering::SeqCst);
        if self.endpointed {
            self.probe.fed_after_final.store(true, Ordering::SeqCst);
        }
        match self.steps.pop_front() {
            Some(Step::Partial(text)) => {
                self.partial = text;
                DecodingState::Running
            }
            Some(Step::Final(text)) => {
                self.last_final = Some(wire("text", &text));
                self.endpointed = true;
                DecodingState::Finalized
            }
            Some(Step::RawFinal(raw)) => {
                self.last_final = Some(raw);
                self.endpointed = true;
                DecodingState::Finalized
            }
            Some(Step::Fail) => DecodingState::Failed,
            None => DecodingState::Running,
        }
    }

    fn partial_result(&mut self) -> String {
        wire("partial", &self.partial)
    }

    fn final_result(&mut self) -> String {
        self.partial.clear();
        self.last_final
            .take()
            .unwrap_or_else(|| wire("text", ""))
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn reset(&mut self) {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        self.partial.clear();
        self.last_final = None;
        self.endpointed = false;
    }

    fn set_endpoint_mode(&mut self, mode: EndpointMode) {
        if let Ok(mut current) = self.probe.endpoint_mode.lock() {
            *current = Some(mode);
        }
    }

    fn unknown_words(&mut self, vocabulary: &[String]) -> Vec<String> {
        match &self.lexicon {
            Some(lexicon) => vocabulary
                .iter()
                .filter(|w| !lexicon.contains(w))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

/// `samples` of a 440 Hz tone as s16le bytes, loud enough to count as
/// audio activity.
pub fn tone(samples: usize) -> Vec<u8> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / f64::from(SAMPLE_RATE);
            ((2.0 * PI * 440.0 * t).sin() * 8000.0) as i16
        })
        .flat_map(i16::to_le_bytes)
        .collect()
}
