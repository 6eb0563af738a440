use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use postage::mpsc::{channel, Receiver};
use postage::prelude::*;

use abc_speak::adapters::audio_src::file::PcmReader;
use abc_speak::adapters::models_repo::ModelsRepo;
use abc_speak::app::transcriber::Msg;
use abc_speak::config::{Config, IngestMode, NoMatchPolicy, SAMPLE_RATE, VERSION};
use abc_speak::ports::{EndpointMode, PullSource};
use abc_speak::{
    recognition_state, AliasTable, ChangeTracker, Letter, LetterResolver, PullPipeline,
    PushPipeline, Recognition, RecognizerSession, StateReader, Vocabulary,
};

const FRAME: Duration = Duration::from_millis(16);

/// Listens for a spoken letter or NATO word and prints the letter it heard.
#[derive(Parser)]
#[command(name = "abc-speak", version = VERSION)]
struct Cli {
    /// JSON config file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding Vosk models.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Model directory name inside --model-dir.
    #[arg(long)]
    model_name: Option<String>,

    /// Copy missing model files from this unpacked model before loading.
    #[arg(long)]
    install_from: Option<PathBuf>,

    /// push: recognize on the audio thread. pull: drain and batch per frame.
    #[arg(long, value_enum)]
    mode: Option<IngestMode>,

    /// Raw s16le 16 kHz mono PCM file, or "-" for stdin. Default: microphone.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Capture device name (see --list-devices).
    #[arg(long)]
    device: Option<String>,

    /// List capture devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Only accept letter names, not NATO words.
    #[arg(long)]
    no_phonetic: bool,

    #[arg(long, value_enum)]
    endpoint: Option<EndpointMode>,

    /// What an utterance that isn't a letter does to the shown letter.
    #[arg(long, value_enum)]
    no_match: Option<NoMatchPolicy>,

    /// Also show in-progress guesses until the first letter is recognized.
    #[arg(long)]
    hints: bool,

    /// Pull mode: milliseconds of audio per recognizer call.
    #[arg(long)]
    batch_ms: Option<u32>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        log::error!("{e:#}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(name) = &cli.model_name {
        config.model_name = name.clone();
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if cli.no_phonetic {
        config.phonetic = false;
    }
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(no_match) = cli.no_match {
        config.no_match = no_match;
    }
    if cli.hints {
        config.hints = true;
    }
    if let Some(batch_ms) = cli.batch_ms {
        config.batch_ms = batch_ms;
    }
    config.validate()?;
    Ok(config)
}

fn build_recognition(
    config: &Config,
    install_from: Option<&Path>,
) -> anyhow::Result<(Recognition, Receiver<Msg>)> {
    let repo = ModelsRepo::from_path(config.model_dir.clone())?;
    if let Some(source) = install_from {
        let copied = repo.install_from(source, &config.model_name)?;
        log::info!("installed {copied} model files");
    }
    let model_path = repo.verify(&config.model_name)?;

    let vocabulary = Vocabulary::builder().phonetic(config.phonetic).build()?;
    log::debug!("grammar: {}", vocabulary.grammar_json());
    let mut session = RecognizerSession::initialize(
        &model_path,
        SAMPLE_RATE as f32,
        vocabulary,
        config.activity_threshold,
    )?;
    session.set_endpoint_sensitivity(config.endpoint)?;

    let resolver = LetterResolver::new(AliasTable::standard()?);
    let (publisher, _reader) = recognition_state();
    let (events, events_rx) = channel(64);
    let recognition = Recognition::new(session, resolver, publisher)
        .with_no_match(config.no_match)
        .with_hints(config.hints)
        .with_events(events);
    Ok((recognition, events_rx))
}

/// Cleared on Ctrl-C or SIGTERM.
fn running_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupted, shutting down");
        flag.store(false, Ordering::Release);
    })
    .context("installing signal handler")?;
    Ok(running)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_devices {
        return list_devices();
    }
    let config = load_config(&cli)?;
    let running = running_flag()?;
    let (recognition, events) = build_recognition(&config, cli.install_from.as_deref())?;
    let mut frontend = Frontend::new(recognition.reader(), events, config.hints);

    match (config.mode, cli.input.as_deref()) {
        (IngestMode::Pull, Some(path)) if path == Path::new("-") => run_pull(
            PcmReader::new(io::stdin()),
            recognition,
            &config,
            &mut frontend,
            &running,
        ),
        (IngestMode::Pull, Some(path)) => run_pull(
            PcmReader::open(path)?,
            recognition,
            &config,
            &mut frontend,
            &running,
        ),
        (IngestMode::Pull, None) => run_pull(
            microphone(cli.device.as_deref())?,
            recognition,
            &config,
            &mut frontend,
            &running,
        ),
        (IngestMode::Push, Some(path)) => {
            let source = if path == Path::new("-") {
                PcmReader::new(Box::new(io::stdin()) as Box<dyn io::Read + Send>)
            } else {
                let file = std::fs::File::open(path)
                    .with_context(|| format!("opening PCM input {}", path.display()))?;
                PcmReader::new(Box::new(file) as Box<dyn io::Read + Send>)
            }
            .with_chunk_bytes(config.drain_bytes)
            .with_realtime(true);
            let ended = source.ended();
            let mut pipeline = PushPipeline::start(Box::new(source), recognition)?;
            while running.load(Ordering::Acquire) && !ended.load(Ordering::Acquire) {
                frontend.frame();
                thread::sleep(FRAME);
            }
            pipeline.shutdown();
            frontend.frame();
            Ok(())
        }
        (IngestMode::Push, None) => {
            let source = microphone(cli.device.as_deref())?;
            let mut pipeline = PushPipeline::start(Box::new(source), recognition)?;
            while running.load(Ordering::Acquire) {
                frontend.frame();
                thread::sleep(FRAME);
            }
            pipeline.shutdown();
            frontend.frame();
            Ok(())
        }
    }
}

fn run_pull<S: PullSource>(
    source: S,
    recognition: Recognition,
    config: &Config,
    frontend: &mut Frontend,
    running: &AtomicBool,
) -> anyhow::Result<()> {
    let mut pipeline =
        PullPipeline::new(source, recognition, config.batch_bytes()).with_drain_bytes(config.drain_bytes);
    while running.load(Ordering::Acquire) && !pipeline.is_exhausted() {
        pipeline.poll();
        frontend.frame();
        thread::sleep(FRAME);
    }
    pipeline.flush();
    frontend.frame();
    Ok(())
}

#[cfg(feature = "gstreamer")]
fn microphone(
    device: Option<&str>,
) -> anyhow::Result<abc_speak::adapters::audio_src::pulse::Pulse> {
    use abc_speak::adapters::audio_src::pulse::Pulse;

    Ok(match device {
        Some(name) => Pulse::from_device_name(name)?,
        None => Pulse::default_device()?,
    })
}

#[cfg(not(feature = "gstreamer"))]
fn microphone(_device: Option<&str>) -> anyhow::Result<MicUnavailable> {
    Err(abc_speak::PipelineError::AudioDeviceUnavailable(
        "built without the gstreamer feature, pass --input".into(),
    )
    .into())
}

#[cfg(feature = "gstreamer")]
fn list_devices() -> anyhow::Result<()> {
    for name in abc_speak::adapters::audio_src::pulse::Pulse::list_available()? {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "gstreamer"))]
fn list_devices() -> anyhow::Result<()> {
    anyhow::bail!("built without the gstreamer feature")
}

/// Stands in for a capture backend when none is compiled in. Never
/// constructed.
#[cfg(not(feature = "gstreamer"))]
enum MicUnavailable {}

#[cfg(not(feature = "gstreamer"))]
impl PullSource for MicUnavailable {
    fn drain_available(&mut self, _max_bytes: usize) -> anyhow::Result<Vec<u8>> {
        match *self {}
    }
}

#[cfg(not(feature = "gstreamer"))]
impl abc_speak::ports::PushSource for MicUnavailable {
    fn start(&mut self, _on_audio: abc_speak::ports::AudioCallback) -> anyhow::Result<()> {
        match *self {}
    }

    fn stop(&mut self) {
        match *self {}
    }
}

/// The per-frame consumer: polls the published letter and prints it when it
/// changes. Drawing the alphabet is left to a real renderer.
struct Frontend {
    reader: StateReader,
    tracker: ChangeTracker,
    events: Receiver<Msg>,
    show_hints: bool,
    hint: Option<Letter>,
}

impl Frontend {
    fn new(reader: StateReader, events: Receiver<Msg>, show_hints: bool) -> Self {
        Self {
            reader,
            tracker: ChangeTracker::default(),
            events,
            show_hints,
            hint: None,
        }
    }

    fn frame(&mut self) {
        while let Ok(msg) = self.events.try_recv() {
            log::debug!("{msg:?}");
        }
        if let Some(snapshot) = self.tracker.poll(&self.reader) {
            match snapshot.letter {
                Some(letter) => println!("{letter}"),
                None => println!("-"),
            }
        }
        if self.show_hints {
            let hint = self.reader.hint();
            if hint != self.hint {
                if let Some(letter) = hint {
                    println!("{letter}?");
                }
                self.hint = hint;
            }
        }
    }
}
