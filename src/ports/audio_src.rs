/// Receives mono 16 kHz s16le PCM bytes, in arrival order.
pub type AudioCallback = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Audio delivered by the platform on its own thread.
pub trait PushSource: Send {
    fn start(&mut self, on_audio: AudioCallback) -> anyhow::Result<()>;
    /// Deregisters the callback. Once this returns the callback is dropped
    /// and will not be invoked again.
    fn stop(&mut self);
}

/// Audio buffered by the platform and drained explicitly by the caller.
pub trait PullSource {
    /// Returns at most `max_bytes` of buffered audio, possibly none.
    fn drain_available(&mut self, max_bytes: usize) -> anyhow::Result<Vec<u8>>;
    fn is_exhausted(&self) -> bool {
        false
    }
}
