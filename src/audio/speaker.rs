use super::{AudioSink, OUTPUT_CHANNELS, Transport, pull};
use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use rodio::buffer::SamplesBuffer;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

// Chunks handed to the device ahead of playback. Two gives double buffering.
const QUEUED_CHUNKS: usize = 2;

/// Pulls fixed-size chunks from the transport on a dedicated thread and feeds
/// them to the default output device. Without a device the chunks are
/// discarded at real-time pace so end-of-track still fires.
pub struct Speaker {
    transport: Arc<Mutex<Transport>>,
    running: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
    output: String,
}

impl Speaker {
    pub fn init(sample_rate: u32, buffer_frames: usize) -> Result<Self> {
        let transport = Arc::new(Mutex::new(Transport::default()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel();

        let pump = thread::Builder::new()
            .name(String::from("termdeck-audio"))
            .spawn({
                let transport = Arc::clone(&transport);
                let running = Arc::clone(&running);
                move || {
                    let pump = Pump {
                        transport,
                        running,
                        sample_rate,
                        buffer_frames: buffer_frames.max(1),
                    };
                    pump.run(ready_tx);
                }
            })
            .context("failed to spawn audio thread")?;

        let output = ready_rx
            .recv()
            .context("audio thread exited during start-up")?;
        info!(output = %output, sample_rate, buffer_frames, "speaker ready");

        Ok(Self {
            transport,
            running,
            pump: Some(pump),
            output,
        })
    }
}

impl AudioSink for Speaker {
    fn lock(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock()
    }

    fn output_name(&self) -> String {
        self.output.clone()
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}

struct Pump {
    transport: Arc<Mutex<Transport>>,
    running: Arc<AtomicBool>,
    sample_rate: u32,
    buffer_frames: usize,
}

impl Pump {
    fn run(self, ready: mpsc::Sender<String>) {
        let device = match open_output_stream() {
            Ok(device) => Some(device),
            Err(err) => {
                warn!("no audio output, discarding samples: {err:#}");
                None
            }
        };
        let name = if device.is_some() {
            String::from("System default output (CPAL)")
        } else {
            String::from("No audio output")
        };
        if ready.send(name).is_err() {
            return;
        }

        match device {
            Some((_stream, sink)) => self.feed_device(&sink),
            None => self.discard(),
        }
    }

    fn chunk_time(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_frames as f64 / f64::from(self.sample_rate.max(1)))
    }

    fn feed_device(&self, sink: &Sink) {
        let (Ok(channels), Ok(rate)) = (
            rodio::ChannelCount::try_from(OUTPUT_CHANNELS as u16),
            rodio::SampleRate::try_from(self.sample_rate),
        ) else {
            warn!(sample_rate = self.sample_rate, "output format rejected");
            return self.discard();
        };

        let mut chunk = vec![0.0_f32; self.buffer_frames * OUTPUT_CHANNELS];
        let mut seen_clear = self.transport.lock().cleared();
        let nap = self.chunk_time() / 4;

        while self.running.load(Ordering::Acquire) {
            let cleared = self.transport.lock().cleared();
            if cleared != seen_clear {
                sink.clear();
                sink.play();
                seen_clear = cleared;
                debug!("output buffer flushed");
            }

            while sink.len() < QUEUED_CHUNKS {
                let pulled = pull(&self.transport, &mut chunk);
                if pulled.cleared != seen_clear {
                    // Cleared mid-chunk; flush on the next pass instead.
                    break;
                }
                sink.append(SamplesBuffer::new(channels, rate, chunk.clone()));
            }
            thread::sleep(nap);
        }
        sink.stop();
    }

    fn discard(&self) {
        let mut chunk = vec![0.0_f32; self.buffer_frames * OUTPUT_CHANNELS];
        let pace = self.chunk_time();
        while self.running.load(Ordering::Acquire) {
            pull(&self.transport, &mut chunk);
            thread::sleep(pace);
        }
    }
}

fn open_output_stream() -> Result<(OutputStream, Sink)> {
    let mut stream = with_silenced_stderr(|| {
        match OutputStreamBuilder::from_default_device()
            .context("failed to open default system output stream")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_stream_or_fallback()
                    .context("failed to start default output stream")
            }) {
            Ok(stream) => Ok(stream),
            Err(default_err) => open_fallback_stream().with_context(|| {
                format!("unable to start any audio output stream after default failed: {default_err:#}")
            }),
        }
    })?;
    stream.log_on_drop(false);
    let sink = Sink::connect_new(stream.mixer());
    Ok((stream, sink))
}

fn open_fallback_stream() -> Result<OutputStream> {
    let host = rodio::cpal::default_host();
    let mut candidates: Vec<_> = host
        .output_devices()
        .context("failed to enumerate output devices")?
        .filter_map(|device| device.name().ok().map(|name| (name, device)))
        .collect();
    candidates.sort_by_cached_key(|(name, _)| {
        let lower = name.to_ascii_lowercase();
        let rank = if lower.contains("pulse") {
            0_u8
        } else if lower.contains("pipewire") {
            1_u8
        } else if lower.contains("default") {
            2_u8
        } else {
            3_u8
        };
        (rank, lower)
    });

    for (name, device) in candidates {
        let opened = OutputStreamBuilder::from_device(device)
            .context("failed to open fallback output device")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_stream_or_fallback()
                    .context("failed to start fallback output stream")
            });
        match opened {
            Ok(stream) => {
                info!(device = %name, "using fallback output device");
                return Ok(stream);
            }
            Err(err) => debug!(device = %name, "fallback device failed: {err:#}"),
        }
    }
    anyhow::bail!("no output device could be started")
}

// ALSA and friends print device scan noise on stderr, which would land on top of the
// terminal UI.
#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}
