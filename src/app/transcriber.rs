// The role of this module is to glue an audio source, the recognizer session
// and the letter resolver together, under either delivery model. Both drivers
// hand every chunk to the same `Recognition::process_chunk`.

use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::Context;
use postage::mpsc::{channel, Receiver, Sender};
use postage::prelude::*;

use super::extract::extract;
use super::letters::{Letter, LetterResolver};
use super::session::RecognizerSession;
use super::state::{StatePublisher, StateReader};
use crate::config::{NoMatchPolicy, BYTES_PER_SAMPLE};
use crate::error::ChunkError;
use crate::ports::{EndpointMode, PullSource, PushSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionResult {
    NoMatch,
    Partial(Letter),
    Final(Letter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Started,
    Partial(Letter),
    Final(Option<Letter>),
    Reset,
    Stopped,
}

#[derive(Debug, Clone)]
pub enum InMsg {
    Reset,
    Clear,
    SetEndpoint(EndpointMode),
    Stop,
}

pub struct Recognition {
    session: RecognizerSession,
    resolver: LetterResolver,
    publisher: StatePublisher,
    no_match: NoMatchPolicy,
    hints: bool,
    last_partial: Option<Letter>,
    events: Option<Sender<Msg>>,
}

impl Recognition {
    pub fn new(
        session: RecognizerSession,
        resolver: LetterResolver,
        publisher: StatePublisher,
    ) -> Self {
        Self {
            session,
            resolver,
            publisher,
            no_match: NoMatchPolicy::default(),
            hints: false,
            last_partial: None,
            events: None,
        }
    }

    pub fn with_no_match(mut self, policy: NoMatchPolicy) -> Self {
        self.no_match = policy;
        self
    }

    pub fn with_hints(mut self, enabled: bool) -> Self {
        self.hints = enabled;
        self
    }

    /// Events are sent without blocking. When the channel is full the event
    /// is dropped; audio never is.
    pub fn with_events(mut self, events: Sender<Msg>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn reader(&self) -> StateReader {
        self.publisher.reader()
    }

    fn emit(&mut self, msg: Msg) {
        if let Some(events) = self.events.as_mut() {
            if let Err(e) = events.try_send(msg) {
                log::debug!("dropping event: {e:?}");
            }
        }
    }

    /// Feeds one chunk and publishes the outcome. An endpointed utterance is
    /// reset before this returns, so the next chunk starts a fresh one.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> RecognitionResult {
        let accepted = match self.session.accept_audio(chunk) {
            Ok(accepted) => accepted,
            Err(e @ (ChunkError::Empty | ChunkError::Malformed(_))) => {
                log::debug!("skipping audio chunk: {e}");
                return RecognitionResult::NoMatch;
            }
            Err(e) => {
                log::warn!("skipping audio chunk: {e}");
                return RecognitionResult::NoMatch;
            }
        };

        if accepted.is_final {
            let raw = self.session.final_result().unwrap_or_else(|e| {
                log::warn!("{e}");
                String::new()
            });
            self.session.reset();
            self.last_partial = None;
            self.finish_utterance(&raw)
        } else {
            let raw = self.session.partial_result();
            let Some(letter) = self.resolver.resolve(&extract(&raw)) else {
                return RecognitionResult::NoMatch;
            };
            if self.hints && self.last_partial != Some(letter) && self.publisher.publish_hint(letter)
            {
                self.emit(Msg::Partial(letter));
            }
            self.last_partial = Some(letter);
            RecognitionResult::Partial(letter)
        }
    }

    fn finish_utterance(&mut self, raw: &str) -> RecognitionResult {
        let hypothesis = extract(raw);
        let letter = self.resolver.resolve(&hypothesis);
        log::debug!("utterance {hypothesis:?} resolved to {letter:?}");
        match (letter, self.no_match) {
            (Some(_), _) | (None, NoMatchPolicy::Clear) => self.publisher.publish(letter),
            (None, NoMatchPolicy::Retain) => {}
        }
        self.emit(Msg::Final(letter));
        letter.map_or(RecognitionResult::NoMatch, RecognitionResult::Final)
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.last_partial = None;
        self.emit(Msg::Reset);
    }

    pub fn clear(&mut self) {
        self.publisher.clear();
    }

    pub fn set_endpoint_sensitivity(&mut self, mode: EndpointMode) -> Result<(), ChunkError> {
        self.session.set_endpoint_sensitivity(mode)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

type Shared = Arc<Mutex<Option<Recognition>>>;

/// Push-mode driver. Recognition runs inside the source's callback on the
/// audio thread; control messages run on a separate thread under the same
/// lock, so the session is never touched by two threads at once.
pub struct PushPipeline {
    chan_in: Sender<InMsg>,
    thread: Option<thread::JoinHandle<()>>,
    reader: StateReader,
}

impl PushPipeline {
    pub fn start(mut source: Box<dyn PushSource>, recognition: Recognition) -> anyhow::Result<Self> {
        let reader = recognition.reader();
        let shared: Shared = Arc::new(Mutex::new(Some(recognition)));

        if let Some(recognition) = lock(&shared).as_mut() {
            recognition.emit(Msg::Started);
        }

        let rec = shared.clone();
        source
            .start(Box::new(move |chunk| {
                if let Some(recognition) = lock(&rec).as_mut() {
                    recognition.process_chunk(chunk);
                }
            }))
            .context("starting audio capture")?;

        let (chan_in, receiver_in) = channel(8);
        let thread = thread::Builder::new()
            .name("recognition-control".into())
            .spawn(move || {
                let mut this = ControlThread {
                    source,
                    shared,
                    receiver_in,
                };
                this.start_msg_loop();
            })
            .context("spawning recognition control thread")?;

        Ok(Self {
            chan_in,
            thread: Some(thread),
            reader,
        })
    }

    pub fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    pub fn send(&self, msg: InMsg) {
        if self.chan_in.clone().blocking_send(msg).is_err() {
            log::warn!("recognition control thread is gone");
        }
    }

    pub fn reset(&self) {
        self.send(InMsg::Reset);
    }

    pub fn clear(&self) {
        self.send(InMsg::Clear);
    }

    /// Stops capture, then releases the session. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.send(InMsg::Stop);
        if thread.join().is_err() {
            log::error!("recognition control thread panicked");
        }
    }
}

impl Drop for PushPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ControlThread {
    source: Box<dyn PushSource>,
    shared: Shared,
    receiver_in: Receiver<InMsg>,
}

impl ControlThread {
    fn start_msg_loop(&mut self) {
        log::debug!("recognition control loop started");
        while let Some(msg) = self.receiver_in.blocking_recv() {
            if !self.handle(msg) {
                break;
            }
        }
        self.stop();
        log::debug!("recognition control loop ended");
    }

    fn handle(&mut self, msg: InMsg) -> bool {
        let mut guard = lock(&self.shared);
        let Some(recognition) = guard.as_mut() else {
            return false;
        };
        match msg {
            InMsg::Reset => recognition.reset(),
            InMsg::Clear => recognition.clear(),
            InMsg::SetEndpoint(mode) => {
                if let Err(e) = recognition.set_endpoint_sensitivity(mode) {
                    log::warn!("{e}");
                }
            }
            InMsg::Stop => return false,
        }
        true
    }

    fn stop(&mut self) {
        // Deregister first so the callback can't run against a released
        // session.
        self.source.stop();
        if let Some(mut recognition) = lock(&self.shared).take() {
            recognition.emit(Msg::Stopped);
        }
    }
}

/// Pull-mode driver, polled from the main loop. Drained audio is batched
/// until `batch_bytes` have accumulated, then recognized in one call.
pub struct PullPipeline<S> {
    source: S,
    recognition: Recognition,
    pending: Vec<u8>,
    batch_bytes: usize,
    drain_bytes: usize,
}

impl<S: PullSource> PullPipeline<S> {
    pub fn new(source: S, recognition: Recognition, batch_bytes: usize) -> Self {
        Self {
            source,
            recognition,
            pending: Vec::with_capacity(batch_bytes),
            batch_bytes: batch_bytes.max(BYTES_PER_SAMPLE),
            drain_bytes: 4096,
        }
    }

    pub fn with_drain_bytes(mut self, drain_bytes: usize) -> Self {
        self.drain_bytes = drain_bytes;
        self
    }

    pub fn reader(&self) -> StateReader {
        self.recognition.reader()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// True once the source has nothing more to give and no batch is pending.
    pub fn is_exhausted(&self) -> bool {
        self.source.is_exhausted() && self.pending.len() < BYTES_PER_SAMPLE
    }

    pub fn poll(&mut self) -> Option<RecognitionResult> {
        match self.source.drain_available(self.drain_bytes) {
            Ok(bytes) => self.pending.extend_from_slice(&bytes),
            Err(e) => log::warn!("draining audio failed: {e:#}"),
        }
        // Once the source is done, a short final batch goes out as is.
        if self.source.is_exhausted() {
            return self.flush();
        }
        if self.pending.len() < self.batch_bytes {
            return None;
        }
        self.process_pending()
    }

    /// Recognizes whatever is pending, even if short of a full batch.
    pub fn flush(&mut self) -> Option<RecognitionResult> {
        if self.pending.len() < BYTES_PER_SAMPLE {
            return None;
        }
        self.process_pending()
    }

    fn process_pending(&mut self) -> Option<RecognitionResult> {
        // A trailing odd byte waits for the rest of its sample.
        let whole = self.pending.len() - self.pending.len() % BYTES_PER_SAMPLE;
        let rest = self.pending.split_off(whole);
        let chunk = mem::replace(&mut self.pending, rest);
        Some(self.recognition.process_chunk(&chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::audio_src::file::PcmReader;
    use crate::adapters::recognizer::scripted::{tone, Probe, Scripted, Step};
    use crate::app::letters::AliasTable;
    use crate::app::state::recognition_state;
    use crate::app::vocabulary::Vocabulary;
    use std::io::Cursor;
    use std::sync::atomic::Ordering;

    fn letter(c: char) -> Letter {
        Letter::from_char(c).unwrap()
    }

    fn recognition(steps: Vec<Step>) -> (Recognition, Arc<Probe>) {
        let engine = Scripted::new(steps);
        let probe = engine.probe();
        let vocabulary = Vocabulary::builder().phonetic(true).build().unwrap();
        let session = RecognizerSession::new(Box::new(engine), vocabulary, 0.01).unwrap();
        let resolver = LetterResolver::new(AliasTable::standard().unwrap());
        let (publisher, _reader) = recognition_state();
        (Recognition::new(session, resolver, publisher), probe)
    }

    #[test]
    fn test_final_letter_is_published() {
        let (mut rec, probe) = recognition(vec![Step::partial("k"), Step::final_text("k")]);
        let reader = rec.reader();

        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::Partial(letter('K')));
        assert_eq!(reader.current_letter(), None);

        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::Final(letter('K')));
        assert_eq!(reader.current_letter(), Some(letter('K')));
        assert_eq!(reader.version(), 1);
        assert_eq!(probe.resets.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_match_retains_previous_letter() {
        let (mut rec, _) = recognition(vec![Step::final_text("k"), Step::final_text("the")]);
        let reader = rec.reader();
        rec.process_chunk(&tone(160));
        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::NoMatch);
        assert_eq!(reader.current_letter(), Some(letter('K')));
        assert_eq!(reader.version(), 1);
    }

    #[test]
    fn test_no_match_clears_when_configured() {
        let (rec, _) = recognition(vec![Step::final_text("k"), Step::final_text("the")]);
        let mut rec = rec.with_no_match(NoMatchPolicy::Clear);
        let reader = rec.reader();
        rec.process_chunk(&tone(160));
        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::NoMatch);
        assert_eq!(reader.current_letter(), None);
        assert_eq!(reader.version(), 2);
    }

    #[test]
    fn test_partial_never_overwrites_final() {
        let (rec, _) = recognition(vec![
            Step::final_text("b"),
            Step::partial("c"),
            Step::partial("d"),
        ]);
        let mut rec = rec.with_hints(true);
        let reader = rec.reader();
        rec.process_chunk(&tone(160));
        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::Partial(letter('C')));
        assert_eq!(reader.current_letter(), Some(letter('B')));
        assert_eq!(reader.hint(), None);
        assert_eq!(reader.version(), 1);
    }

    #[test]
    fn test_hints_surface_before_first_final() {
        let (rec, _) = recognition(vec![Step::partial("alfa"), Step::final_text("alfa")]);
        let mut rec = rec.with_hints(true);
        let reader = rec.reader();
        rec.process_chunk(&tone(160));
        assert_eq!(reader.hint(), Some(letter('A')));
        assert_eq!(reader.current_letter(), None);
        rec.process_chunk(&tone(160));
        assert_eq!(reader.hint(), None);
        assert_eq!(reader.current_letter(), Some(letter('A')));
    }

    #[test]
    fn test_garbled_output_is_no_match() {
        let (mut rec, _) = recognition(vec![
            Step::RawFinal("{\"text\": \"b".into()),
            Step::Fail,
            Step::final_text("[unk]"),
        ]);
        let reader = rec.reader();
        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::NoMatch);
        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::NoMatch);
        assert_eq!(rec.process_chunk(&[]), RecognitionResult::NoMatch);
        assert_eq!(rec.process_chunk(&[7]), RecognitionResult::NoMatch);
        assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::NoMatch);
        assert_eq!(reader.current_letter(), None);
    }

    #[test]
    fn test_events() {
        let (tx, mut rx) = channel(16);
        let (rec, _) = recognition(vec![Step::partial("e"), Step::partial("e"), Step::final_text("e")]);
        let mut rec = rec.with_hints(true).with_events(tx);
        for _ in 0..3 {
            rec.process_chunk(&tone(160));
        }
        rec.reset();
        assert_eq!(rx.try_recv().ok(), Some(Msg::Partial(letter('E'))));
        assert_eq!(rx.try_recv().ok(), Some(Msg::Final(Some(letter('E')))));
        assert_eq!(rx.try_recv().ok(), Some(Msg::Reset));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_event_channel_does_not_block() {
        let (tx, _rx) = channel(1);
        let steps = (0..10).map(|_| Step::final_text("f")).collect();
        let (rec, probe) = recognition(steps);
        let mut rec = rec.with_events(tx);
        for _ in 0..10 {
            assert_eq!(rec.process_chunk(&tone(160)), RecognitionResult::Final(letter('F')));
        }
        assert_eq!(probe.chunks.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_pull_batches_until_threshold() {
        let (rec, probe) = recognition(vec![Step::final_text("golf")]);
        let source = PcmReader::new(Cursor::new(tone(16000)));
        let mut pull = PullPipeline::new(source, rec, 16000).with_drain_bytes(4096);
        let reader = pull.reader();

        for _ in 0..3 {
            assert_eq!(pull.poll(), None);
        }
        assert_eq!(probe.chunks.load(Ordering::SeqCst), 0);
        assert_eq!(pull.pending_bytes(), 12288);

        assert_eq!(pull.poll(), Some(RecognitionResult::Final(letter('G'))));
        assert_eq!(probe.chunks.load(Ordering::SeqCst), 1);
        assert_eq!(probe.samples.load(Ordering::SeqCst), 8192);
        assert_eq!(reader.current_letter(), Some(letter('G')));
    }

    #[test]
    fn test_pull_drains_short_tail_at_end_of_input() {
        let (rec, probe) = recognition(vec![Step::final_text("lima")]);
        let source = PcmReader::new(Cursor::new(tone(1000)));
        let mut pull = PullPipeline::new(source, rec, 16000);
        let reader = pull.reader();
        let mut polls = 0;
        while !pull.is_exhausted() {
            pull.poll();
            polls += 1;
            assert!(polls < 10, "pull loop did not finish");
        }
        assert_eq!(probe.samples.load(Ordering::SeqCst), 1000);
        assert_eq!(pull.pending_bytes(), 0);
        assert_eq!(reader.current_letter(), Some(letter('L')));
        assert_eq!(pull.flush(), None);
    }

    #[test]
    fn test_pull_tail_keeps_sample_alignment() {
        let (rec, probe) = recognition(vec![Step::partial("h")]);
        let mut bytes = tone(100);
        bytes.push(0);
        let mut pull = PullPipeline::new(PcmReader::new(Cursor::new(bytes)), rec, 16000);
        assert_eq!(pull.poll(), Some(RecognitionResult::Partial(letter('H'))));
        assert_eq!(probe.samples.load(Ordering::SeqCst), 100);
        assert_eq!(pull.pending_bytes(), 1);
        assert!(pull.is_exhausted());
        assert_eq!(pull.flush(), None);
    }

    #[test]
    fn test_pull_never_feeds_after_final_without_reset() {
        let steps = vec![
            Step::final_text("a"),
            Step::partial("b"),
            Step::final_text("b"),
        ];
        let (rec, probe) = recognition(steps);
        let source = PcmReader::new(Cursor::new(tone(3 * 800)));
        let mut pull = PullPipeline::new(source, rec, 1600).with_drain_bytes(1600);
        let mut results = Vec::new();
        while !pull.is_exhausted() {
            results.extend(pull.poll());
        }
        assert_eq!(
            results,
            vec![
                RecognitionResult::Final(letter('A')),
                RecognitionResult::Partial(letter('B')),
                RecognitionResult::Final(letter('B')),
            ]
        );
        assert!(!probe.fed_after_final.load(Ordering::SeqCst));
        assert_eq!(probe.resets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_push_with_odd_chunk_size_keeps_every_chunk() {
        let (rec, probe) = recognition(vec![Step::final_text("k")]);
        let mut source = PcmReader::new(Cursor::new(tone(1605))).with_chunk_bytes(321);
        let ended = source.ended();
        // Drive the reader directly so the test can wait for the end of input.
        let shared = Arc::new(Mutex::new(rec));
        let sink = shared.clone();
        source
            .start(Box::new(move |chunk| {
                lock(&sink).process_chunk(chunk);
            }))
            .unwrap();
        source.join();
        assert!(ended.load(Ordering::Acquire));
        assert_eq!(probe.samples.load(Ordering::SeqCst), 1605);
        assert_eq!(lock(&shared).reader().current_letter(), Some(letter('K')));
    }

    #[test]
    fn test_push_end_to_end() {
        let (tx, mut rx) = channel(16);
        let (rec, probe) = recognition(vec![Step::final_text("k"), Step::final_text("the")]);
        let rec = rec.with_events(tx);
        let source = PcmReader::new(Cursor::new(tone(320))).with_chunk_bytes(320);

        let mut push = PushPipeline::start(Box::new(source), rec).unwrap();
        let reader = push.reader();
        assert_eq!(rx.blocking_recv(), Some(Msg::Started));
        assert_eq!(rx.blocking_recv(), Some(Msg::Final(Some(letter('K')))));
        assert_eq!(rx.blocking_recv(), Some(Msg::Final(None)));
        assert_eq!(reader.current_letter(), Some(letter('K')));

        push.reset();
        assert_eq!(rx.blocking_recv(), Some(Msg::Reset));
        push.clear();
        push.shutdown();
        assert_eq!(rx.blocking_recv(), Some(Msg::Stopped));
        assert_eq!(reader.current_letter(), None);
        assert!(!probe.fed_after_final.load(Ordering::SeqCst));

        push.shutdown();
    }
}
