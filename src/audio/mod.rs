pub mod decode;
pub mod resample;
pub mod speaker;
pub mod stream;

use decode::AudioSource;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use stream::Streamer;

pub use speaker::Speaker;

pub const OUTPUT_SAMPLE_RATE: u32 = 44_100;
pub const OUTPUT_CHANNELS: usize = 2;

pub type SharedSource = Arc<Mutex<Box<dyn AudioSource>>>;

/// An installed composite stream. The pull side locks it for a whole chunk,
/// so it lives behind its own mutex instead of the transport's.
pub type StreamHandle = Arc<Mutex<Box<dyn Streamer>>>;

/// State shared between the control thread and the pull thread: the installed
/// stream handle, the pause flag and the gain factor. Only handle swaps and
/// flag reads or writes happen under its lock.
pub struct Transport {
    stream: Option<StreamHandle>,
    paused: bool,
    gain: f32,
    playing: bool,
    cleared: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            stream: None,
            paused: false,
            gain: 1.0,
            playing: false,
            cleared: 0,
        }
    }
}

impl Transport {
    /// Swaps the installed stream and hands back the old handle so the caller
    /// can drop it after releasing the lock.
    pub fn install(&mut self, stream: Option<Box<dyn Streamer>>) -> Option<StreamHandle> {
        std::mem::replace(&mut self.stream, stream.map(|stream| Arc::new(Mutex::new(stream))))
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn start(&mut self) {
        self.playing = true;
    }

    /// Stops pulling and tells the output to drop whatever it has buffered.
    pub fn clear(&mut self) {
        self.playing = false;
        self.cleared = self.cleared.wrapping_add(1);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn cleared(&self) -> u64 {
        self.cleared
    }
}

/// One chunk taken from a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulled {
    /// Samples that came from the stream. The rest of the chunk is silence.
    pub written: usize,
    /// Clear counter seen when the chunk was started.
    pub cleared: u64,
}

/// Fills `out` with the next chunk, padding with silence. The transport lock
/// is held only to read the handle and flags; decoding and resampling run
/// under the stream's own lock. Requests are cut to whole stereo frames.
pub fn pull(transport: &Mutex<Transport>, out: &mut [f32]) -> Pulled {
    out.fill(0.0);
    let (stream, gain, cleared) = {
        let transport = transport.lock();
        let cleared = transport.cleared;
        if !transport.playing || transport.paused {
            return Pulled { written: 0, cleared };
        }
        let Some(stream) = transport.stream.clone() else {
            return Pulled { written: 0, cleared };
        };
        (stream, transport.gain, cleared)
    };

    let frames = out.len() - out.len() % OUTPUT_CHANNELS;
    let written = stream.lock().stream(&mut out[..frames]);
    if gain != 1.0 {
        for sample in &mut out[..written] {
            *sample *= gain;
        }
    }
    Pulled { written, cleared }
}

/// The output side of playback. The queue only installs streams and flips
/// flags through `lock`; pulling happens on the sink's own schedule.
pub trait AudioSink: Send {
    fn lock(&self) -> MutexGuard<'_, Transport>;

    fn play(&self) {
        self.lock().start();
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn output_name(&self) -> String;
}

/// A sink that only moves when the caller pulls from it.
#[derive(Clone, Default)]
pub struct ManualSink {
    transport: Arc<Mutex<Transport>>,
}

impl ManualSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pull(&self, samples: usize) -> Vec<f32> {
        let mut out = vec![0.0; samples];
        pull(&self.transport, &mut out);
        out
    }
}

impl AudioSink for ManualSink {
    fn lock(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock()
    }

    fn output_name(&self) -> String {
        String::from("Manual sink")
    }
}
