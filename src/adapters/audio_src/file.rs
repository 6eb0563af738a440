use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;

use crate::config::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use crate::ports::audio_src::*;

/// Raw mono s16le PCM at 16 kHz from any reader, e.g. a file recorded with
/// `arecord -f S16_LE -r 16000 -c 1 -t raw` or stdin.
///
/// Works as a pull source directly, or as a push source that delivers
/// `chunk_bytes` at a time from its own thread.
pub struct PcmReader<R> {
    reader: Option<R>,
    exhausted: bool,
    chunk_bytes: usize,
    realtime: bool,
    stop: Arc<AtomicBool>,
    ended: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PcmReader<fs::File> {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("opening PCM input {}", path.display()))?;
        Ok(Self::new(file))
    }
}

impl<R: Read> PcmReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            exhausted: false,
            chunk_bytes: 4096,
            realtime: false,
            stop: Arc::new(AtomicBool::new(false)),
            ended: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Rounded down to whole samples, so every pushed chunk decodes.
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = (chunk_bytes / BYTES_PER_SAMPLE).max(1) * BYTES_PER_SAMPLE;
        self
    }

    /// Push mode only: set once the delivery thread has finished.
    pub fn ended(&self) -> Arc<AtomicBool> {
        self.ended.clone()
    }

    /// Push mode only: blocks until the whole input has been delivered.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("PCM reader thread panicked");
            }
        }
    }

    /// Push mode only: pace delivery to the audio's own duration, as a
    /// capture device would.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

/// Reads until `buf` is full or the reader hits end of input. Returns the
/// number of bytes read and whether end of input was seen.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<(usize, bool)> {
    let mut n = 0;
    while n < buf.len() {
        match reader.read(&mut buf[n..]) {
            Ok(0) => return Ok((n, true)),
            Ok(read) => n += read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok((n, false))
}

fn chunk_duration(bytes: usize) -> Duration {
    let samples = (bytes / BYTES_PER_SAMPLE) as u64;
    Duration::from_micros(samples * 1_000_000 / u64::from(SAMPLE_RATE))
}

impl<R: Read> PullSource for PcmReader<R> {
    fn drain_available(&mut self, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Vec::new());
        };
        if self.exhausted {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; max_bytes];
        let (n, eof) = fill(reader, &mut buf).context("reading PCM input")?;
        buf.truncate(n);
        self.exhausted = eof;
        Ok(buf)
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted || self.reader.is_none()
    }
}

impl<R: Read + Send + 'static> PushSource for PcmReader<R> {
    fn start(&mut self, mut on_audio: AudioCallback) -> anyhow::Result<()> {
        let mut reader = self
            .reader
            .take()
            .context("PCM input already started")?;
        let stop = self.stop.clone();
        let ended = self.ended.clone();
        let chunk_bytes = self.chunk_bytes;
        let realtime = self.realtime;
        let thread = thread::Builder::new()
            .name("pcm-reader".into())
            .spawn(move || {
                let mut buf = vec![0u8; chunk_bytes];
                while !stop.load(Ordering::Acquire) {
                    match fill(&mut reader, &mut buf) {
                        Ok((n, eof)) => {
                            if n > 0 {
                                on_audio(&buf[..n]);
                            }
                            if eof {
                                log::debug!("PCM input ended");
                                break;
                            }
                            if realtime {
                                thread::sleep(chunk_duration(n));
                            }
                        }
                        Err(e) => {
                            log::warn!("reading PCM input failed: {e}");
                            break;
                        }
                    }
                }
                ended.store(true, Ordering::Release);
            })
            .context("spawning PCM reader thread")?;
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("PCM reader thread panicked");
            }
        }
        self.exhausted = true;
    }
}

impl<R> Drop for PcmReader<R> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;
    use std::sync::Mutex;

    #[test]
    fn test_pull_drains_in_order() {
        let bytes: Vec<u8> = (0..10).collect();
        let mut src = PcmReader::new(Cursor::new(bytes));
        assert_eq!(src.drain_available(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(src.drain_available(4).unwrap(), vec![4, 5, 6, 7]);
        assert!(!src.is_exhausted());
        assert_eq!(src.drain_available(4).unwrap(), vec![8, 9]);
        assert!(src.is_exhausted());
        assert!(src.drain_available(4).unwrap().is_empty());
    }

    #[test]
    fn test_push_delivers_every_chunk_in_order() {
        let bytes: Vec<u8> = (0..=255).collect();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let mut src = PcmReader::new(Cursor::new(bytes.clone())).with_chunk_bytes(10);
        src.start(Box::new(move |chunk| {
            sink.lock().unwrap().push(chunk.to_vec());
        }))
        .unwrap();
        src.join();
        assert!(src.ended().load(Ordering::Acquire));
        src.stop();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 26);
        assert!(received[..25].iter().all(|c| c.len() == 10));
        assert_eq!(received.concat(), bytes);
    }

    #[test]
    fn test_chunk_bytes_round_to_whole_samples() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut src = PcmReader::new(Cursor::new(vec![0u8; 1000])).with_chunk_bytes(321);
        src.start(Box::new(move |chunk| {
            sink.lock().unwrap().push(chunk.len());
        }))
        .unwrap();
        src.join();

        let received = received.lock().unwrap();
        assert!(received.iter().all(|len| len % BYTES_PER_SAMPLE == 0));
        assert_eq!(received[0], 320);
        assert_eq!(received.iter().sum::<usize>(), 1000);
    }

    #[rstest]
    #[case::odd(321, 320)]
    #[case::even(4096, 4096)]
    #[case::below_one_sample(1, 2)]
    fn test_chunk_bytes_rounding(#[case] requested: usize, #[case] expected: usize) {
        let src = PcmReader::new(Cursor::new(Vec::new())).with_chunk_bytes(requested);
        assert_eq!(src.chunk_bytes, expected);
    }

    #[test]
    fn test_push_start_twice_fails() {
        let mut src = PcmReader::new(Cursor::new(vec![0u8; 4]));
        src.start(Box::new(|_| {})).unwrap();
        assert!(src.start(Box::new(|_| {})).is_err());
        src.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut src = PcmReader::new(Cursor::new(vec![0u8; 4]));
        src.stop();
        src.stop();
        assert!(src.is_exhausted());
    }

    #[test]
    fn test_chunk_duration() {
        assert_eq!(chunk_duration(32000), Duration::from_secs(1));
        assert_eq!(chunk_duration(320), Duration::from_millis(10));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(PcmReader::open(Path::new("/nonexistent/input.raw")).is_err());
    }
}
