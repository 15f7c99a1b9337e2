use crate::error::LoadError;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

// A few corrupt packets in a row are skipped, more than that ends the stream.
const MAX_DECODE_RETRIES: usize = 3;

/// Decoded audio as the queue sees it: interleaved samples at the source rate,
/// a frame position and a seekable length.
pub trait AudioSource: Send {
    fn channels(&self) -> usize;
    fn sample_rate(&self) -> u32;
    /// Fills whole frames into `out` and returns the number of samples written.
    fn read(&mut self, out: &mut [f32]) -> usize;
    fn position(&self) -> u64;
    fn length(&self) -> Option<u64>;
    fn seek(&mut self, frame: u64) -> Result<(), LoadError>;
    fn close(&mut self);

    fn at_end(&self) -> bool {
        self.length()
            .is_some_and(|length| self.position() >= length)
    }
}

pub fn is_supported(path: &Path, formats: &[String]) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    formats
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

struct DecoderState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

pub struct DecodedSource {
    path: PathBuf,
    state: Option<DecoderState>,
    channels: usize,
    sample_rate: u32,
    declared_frames: Option<u64>,
    position: u64,
    pending: Vec<f32>,
    cursor: usize,
    sample_buf: Option<SampleBuffer<f32>>,
    exhausted: bool,
}

impl DecodedSource {
    pub fn open(path: &Path, formats: &[String]) -> Result<Self, LoadError> {
        if !is_supported(path, formats) {
            return Err(LoadError::FormatUnsupported(path.to_path_buf()));
        }

        let metadata = fs::metadata(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if metadata.is_dir() {
            return Err(LoadError::NotATrack(path.to_path_buf()));
        }

        let mut source = Self {
            path: path.to_path_buf(),
            state: None,
            channels: 0,
            sample_rate: 0,
            declared_frames: None,
            position: 0,
            pending: Vec::new(),
            cursor: 0,
            sample_buf: None,
            exhausted: false,
        };
        source.reopen()?;

        // Decode the first packet now so broken files fail at load time and the
        // channel count and rate are known before the resampler asks for them.
        if !source.refill() && source.channels == 0 {
            return Err(LoadError::Decode {
                path: path.to_path_buf(),
                message: String::from("no decodable audio"),
            });
        }
        debug!(
            path = %path.display(),
            channels = source.channels,
            sample_rate = source.sample_rate,
            frames = ?source.declared_frames,
            "opened track"
        );
        Ok(source)
    }

    /// Opens the file again and decodes forward to `frame`.
    fn reopen_at(&mut self, frame: u64, cause: &str) -> Result<(), LoadError> {
        self.reopen().map_err(|err| LoadError::Seek {
            path: self.path.clone(),
            message: format!("{cause}; reopen failed: {err}"),
        })?;
        self.skip_frames(frame);
        self.position = frame;
        Ok(())
    }

    fn reopen(&mut self) -> Result<(), LoadError> {
        let file = File::open(&self.path).map_err(|source| LoadError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = self.path.extension().and_then(OsStr::to_str) {
            hint.with_extension(ext);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| self.symphonia_error(err))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| LoadError::Decode {
                path: self.path.clone(),
                message: String::from("no track with a supported codec"),
            })?;
        let track_id = track.id;
        let params = track.codec_params.clone();
        let decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|err| self.symphonia_error(err))?;

        if let Some(rate) = params.sample_rate {
            self.sample_rate = rate;
        }
        if let Some(channels) = params.channels {
            self.channels = channels.count();
        }
        self.declared_frames = params.n_frames;
        self.state = Some(DecoderState {
            format,
            decoder,
            track_id,
        });
        self.position = 0;
        self.pending.clear();
        self.cursor = 0;
        self.exhausted = false;
        Ok(())
    }

    fn symphonia_error(&self, err: SymphoniaError) -> LoadError {
        match err {
            SymphoniaError::IoError(source) => LoadError::Io {
                path: self.path.clone(),
                source,
            },
            other => LoadError::Decode {
                path: self.path.clone(),
                message: other.to_string(),
            },
        }
    }

    fn refill(&mut self) -> bool {
        let Some(state) = self.state.as_mut() else {
            return false;
        };

        let mut failures = 0;
        loop {
            let packet = match state.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return false;
                }
                Err(SymphoniaError::ResetRequired) => return false,
                Err(err) => {
                    warn!(path = %self.path.display(), "stopping stream: {err}");
                    return false;
                }
            };
            if packet.track_id() != state.track_id {
                continue;
            }

            match state.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let capacity = decoded.capacity() as u64;
                    if self
                        .sample_buf
                        .as_ref()
                        .is_none_or(|buf| (buf.capacity() as u64) < capacity)
                    {
                        self.sample_buf = Some(SampleBuffer::new(capacity, spec));
                    }
                    let Some(buf) = self.sample_buf.as_mut() else {
                        continue;
                    };
                    buf.copy_interleaved_ref(decoded);
                    if self.channels == 0 {
                        self.channels = spec.channels.count();
                    }
                    if self.sample_rate == 0 {
                        self.sample_rate = spec.rate;
                    }
                    self.pending.clear();
                    self.pending.extend_from_slice(buf.samples());
                    self.cursor = 0;
                    if !self.pending.is_empty() {
                        return true;
                    }
                }
                Err(SymphoniaError::DecodeError(message)) => {
                    failures += 1;
                    debug!(path = %self.path.display(), "skipping bad packet: {message}");
                    if failures > MAX_DECODE_RETRIES {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(path = %self.path.display(), "stopping stream: {err}");
                    return false;
                }
            }
        }
    }

    fn skip_frames(&mut self, mut frames: u64) {
        let channels = self.channels.max(1);
        while frames > 0 {
            if self.cursor >= self.pending.len() && !self.refill() {
                self.exhausted = true;
                return;
            }
            let available = ((self.pending.len() - self.cursor) / channels) as u64;
            let step = available.min(frames);
            self.cursor += step as usize * channels;
            frames -= step;
        }
    }
}

impl AudioSource for DecodedSource {
    fn channels(&self) -> usize {
        self.channels.max(1)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.exhausted || self.state.is_none() {
            return 0;
        }

        let channels = self.channels();
        let wanted = out.len() - out.len() % channels;
        let mut written = 0;
        while written < wanted {
            if self.cursor >= self.pending.len() && !self.refill() {
                self.exhausted = true;
                break;
            }
            let count = (self.pending.len() - self.cursor).min(wanted - written);
            out[written..written + count]
                .copy_from_slice(&self.pending[self.cursor..self.cursor + count]);
            self.cursor += count;
            written += count;
        }
        self.position += (written / channels) as u64;
        written
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        if self.exhausted {
            Some(self.position)
        } else {
            self.declared_frames
        }
    }

    fn seek(&mut self, frame: u64) -> Result<(), LoadError> {
        let Some(state) = self.state.as_mut() else {
            return self.reopen_at(frame, "decoder was closed");
        };

        let track_id = state.track_id;
        let sought = state.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: frame,
                track_id,
            },
        );
        match sought {
            Ok(seeked) => {
                state.decoder.reset();
                self.pending.clear();
                self.cursor = 0;
                self.exhausted = false;
                self.skip_frames(seeked.required_ts.saturating_sub(seeked.actual_ts));
                self.position = frame;
                Ok(())
            }
            Err(err) => {
                debug!(path = %self.path.display(), "seek failed, reopening: {err}");
                self.reopen_at(frame, &err.to_string())
            }
        }
    }

    fn close(&mut self) {
        self.state = None;
        self.pending = Vec::new();
        self.cursor = 0;
        self.sample_buf = None;
    }

    fn at_end(&self) -> bool {
        self.exhausted
    }
}

/// Samples held in memory. Used where a file is not at hand.
pub struct MemorySource {
    samples: Vec<f32>,
    channels: usize,
    sample_rate: u32,
    cursor: usize,
    closed: bool,
}

impl MemorySource {
    pub fn new(channels: usize, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
            cursor: 0,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl AudioSource for MemorySource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.closed {
            return 0;
        }
        let wanted = out.len() - out.len() % self.channels;
        let count = wanted.min(self.samples.len() - self.cursor);
        out[..count].copy_from_slice(&self.samples[self.cursor..self.cursor + count]);
        self.cursor += count;
        count
    }

    fn position(&self) -> u64 {
        (self.cursor / self.channels) as u64
    }

    fn length(&self) -> Option<u64> {
        Some((self.samples.len() / self.channels) as u64)
    }

    fn seek(&mut self, frame: u64) -> Result<(), LoadError> {
        let target = usize::try_from(frame)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.channels);
        self.cursor = target.min(self.samples.len() - self.samples.len() % self.channels);
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn write_test_wav(path: &Path, sample_rate: u32, frames: u32) {
        let channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let bytes_per_sample = u32::from(bits_per_sample / 8);
        let data_size = frames * u32::from(channels) * bytes_per_sample;
        let byte_rate = sample_rate * u32::from(channels) * bytes_per_sample;
        let block_align = channels * (bits_per_sample / 8);

        let mut bytes = Vec::with_capacity((44 + data_size) as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_size).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits_per_sample.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_size.to_le_bytes());
        for n in 0..frames {
            let sample = if n % 2 == 0 { 8_000_i16 } else { -8_000_i16 };
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        fs::write(path, bytes).expect("wav fixture should be written");
    }

    fn wav_formats() -> Vec<String> {
        vec![String::from("wav")]
    }

    #[test]
    fn unsupported_extension_is_skippable() {
        let err = match DecodedSource::open(Path::new("cover.jpg"), &wav_formats()) {
            Err(err) => err,
            Ok(_) => panic!("jpg must not open"),
        };
        assert!(matches!(err, LoadError::FormatUnsupported(_)));
        assert!(err.is_skippable());
    }

    #[test]
    fn directory_with_audio_extension_is_not_a_track() {
        let dir = tempdir().expect("tempdir");
        let fake = dir.path().join("album.wav");
        fs::create_dir(&fake).expect("create dir");

        let err = match DecodedSource::open(&fake, &wav_formats()) {
            Err(err) => err,
            Ok(_) => panic!("directory must not open"),
        };
        assert!(matches!(err, LoadError::NotATrack(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().expect("tempdir");
        let err = match DecodedSource::open(&dir.path().join("gone.wav"), &wav_formats()) {
            Err(err) => err,
            Ok(_) => panic!("missing file must not open"),
        };
        assert!(matches!(err, LoadError::Io { .. }));
        assert!(!err.is_skippable());
    }

    #[test]
    fn garbage_with_audio_extension_fails_to_decode() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("noise.wav");
        fs::write(&path, b"definitely not a riff header").expect("write");

        let err = match DecodedSource::open(&path, &wav_formats()) {
            Err(err) => err,
            Ok(_) => panic!("garbage must not decode"),
        };
        assert!(!err.is_skippable());
    }

    #[test]
    fn wav_reads_to_end_and_rewinds() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, 22_050, 2_000);

        let mut source = DecodedSource::open(&path, &wav_formats()).expect("open wav");
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 22_050);

        let mut buf = vec![0.0; 512];
        let mut total = 0;
        loop {
            let read = source.read(&mut buf);
            total += read;
            if read < buf.len() {
                break;
            }
        }
        assert_eq!(total, 2_000);
        assert!(source.at_end());
        assert_eq!(source.length(), Some(source.position()));

        source.seek(0).expect("seek to start");
        assert_eq!(source.position(), 0);
        assert!(!source.at_end());
        assert_eq!(source.read(&mut buf), buf.len());
        assert!(buf[0] > 0.0);
    }

    #[test]
    fn seek_reports_a_file_that_cannot_be_reopened() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("gone.wav");
        write_test_wav(&path, 44_100, 64);

        let mut source = DecodedSource::open(&path, &wav_formats()).expect("open wav");
        source.close();
        fs::remove_file(&path).expect("remove");

        match source.seek(0) {
            Err(LoadError::Seek { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected a seek error, got {other:?}"),
        }
    }

    #[test]
    fn closed_source_stops_producing() {
        let mut source = MemorySource::new(2, 44_100, vec![0.1; 8]);
        source.close();
        let mut buf = [0.0; 4];
        assert_eq!(source.read(&mut buf), 0);
        assert!(source.is_closed());
    }

    #[test]
    fn memory_source_reads_whole_frames_only() {
        let mut source = MemorySource::new(2, 44_100, vec![0.5; 6]);
        let mut buf = [0.0; 5];
        assert_eq!(source.read(&mut buf), 4);
        assert_eq!(source.position(), 2);
        assert!(!source.at_end());
        assert_eq!(source.read(&mut buf), 2);
        assert!(source.at_end());
    }
}
