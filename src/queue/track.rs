use crate::audio::decode::{AudioSource, DecodedSource};
use crate::audio::resample::Resampler;
use crate::audio::stream::{Shared, Streamer};
use crate::audio::{OUTPUT_SAMPLE_RATE, SharedSource};
use crate::error::LoadError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct Track {
    path: PathBuf,
    source: SharedSource,
    playable: Shared<Resampler>,
    quality: usize,
    ended: bool,
}

impl Track {
    pub fn load(path: &Path, formats: &[String], quality: usize) -> Result<Self, LoadError> {
        let source = DecodedSource::open(path, formats)?;
        info!(
            path = %path.display(),
            sample_rate = source.sample_rate(),
            channels = source.channels(),
            "loaded track"
        );
        Ok(Self::from_source(path, Box::new(source), quality))
    }

    pub fn from_source(
        path: impl Into<PathBuf>,
        source: Box<dyn AudioSource>,
        quality: usize,
    ) -> Self {
        let source: SharedSource = Arc::new(Mutex::new(source));
        let playable = resampled(quality, &source);
        Self {
            path: path.into(),
            source,
            playable,
            quality,
            ended: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base file name, which is what the browser shows and removes by.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub(crate) fn set_ended(&mut self, ended: bool) {
        self.ended = ended;
    }

    pub fn position(&self) -> u64 {
        self.source.lock().position()
    }

    pub fn length(&self) -> Option<u64> {
        self.source.lock().length()
    }

    pub fn sample_rate(&self) -> u32 {
        self.source.lock().sample_rate()
    }

    pub fn at_end(&self) -> bool {
        self.source.lock().at_end()
    }

    /// Seeks the source to its first frame and starts a new resampled view,
    /// since the old one holds interpolation history from the end of the track.
    pub(crate) fn rewind(&mut self) -> Result<(), LoadError> {
        self.source.lock().seek(0)?;
        self.playable = resampled(self.quality, &self.source);
        Ok(())
    }

    pub(crate) fn playable(&self) -> Box<dyn Streamer> {
        Box::new(self.playable.clone())
    }

    /// Releases the decoder. Streams still holding the view go quiet.
    pub fn close(&self) {
        self.source.lock().close();
    }
}

fn resampled(quality: usize, source: &SharedSource) -> Shared<Resampler> {
    Shared(Arc::new(Mutex::new(Resampler::new(
        quality,
        Arc::clone(source),
        OUTPUT_SAMPLE_RATE,
    ))))
}
