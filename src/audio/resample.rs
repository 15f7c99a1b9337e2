use super::SharedSource;
use super::stream::Streamer;
use std::collections::VecDeque;

const READ_FRAMES: usize = 1024;

/// Converts a shared source to stereo at `to_rate`.
///
/// Each output frame is a Lagrange polynomial through `2 * quality` input
/// frames around it; quality 1 is plain linear interpolation. The history it
/// keeps is only valid for the current read position, so a rewound source
/// needs a fresh `Resampler`.
pub struct Resampler {
    source: SharedSource,
    channels: usize,
    ratio: f64,
    quality: usize,
    frames: VecDeque<[f32; 2]>,
    first: u64,
    produced: u64,
    input_done: bool,
    scratch: Vec<f32>,
}

impl Resampler {
    pub fn new(quality: usize, source: SharedSource, to_rate: u32) -> Self {
        let (channels, from_rate) = {
            let source = source.lock();
            (source.channels().max(1), source.sample_rate())
        };
        let from_rate = if from_rate == 0 { to_rate } else { from_rate };
        Self {
            source,
            channels,
            ratio: f64::from(from_rate) / f64::from(to_rate.max(1)),
            quality: quality.clamp(1, 64),
            frames: VecDeque::new(),
            first: 0,
            produced: 0,
            input_done: false,
            scratch: vec![0.0; READ_FRAMES * channels],
        }
    }

    fn loaded_end(&self) -> u64 {
        self.first + self.frames.len() as u64
    }

    fn load_until(&mut self, frame: u64) {
        while !self.input_done && self.loaded_end() <= frame {
            let read = self.source.lock().read(&mut self.scratch);
            for chunk in self.scratch[..read].chunks_exact(self.channels) {
                self.frames.push_back(to_stereo(chunk));
            }
            if read < self.scratch.len() {
                self.input_done = true;
            }
        }
    }

    fn frame_at(&self, index: i64) -> [f32; 2] {
        let last = self.loaded_end().saturating_sub(1) as i64;
        let clamped = index.clamp(self.first as i64, last.max(self.first as i64));
        let offset = (clamped - self.first as i64) as usize;
        self.frames.get(offset).copied().unwrap_or([0.0, 0.0])
    }

    fn next_frame(&mut self) -> Option<[f32; 2]> {
        let t = self.produced as f64 * self.ratio;
        let base = t.floor() as i64;
        let frac = t - base as f64;
        let reach = base + self.quality as i64;

        self.load_until(reach.max(0) as u64);
        if self.input_done && base as u64 >= self.loaded_end() {
            return None;
        }

        let frame = if frac == 0.0 {
            self.frame_at(base)
        } else {
            let lo = base - self.quality as i64 + 1;
            let nodes = 2 * self.quality as i64;
            let mut acc = [0.0_f64; 2];
            for k in 0..nodes {
                let xk = (lo + k) as f64;
                let mut weight = 1.0;
                for m in 0..nodes {
                    if m != k {
                        let xm = (lo + m) as f64;
                        weight *= (t - xm) / (xk - xm);
                    }
                }
                let sample = self.frame_at(lo + k);
                acc[0] += weight * f64::from(sample[0]);
                acc[1] += weight * f64::from(sample[1]);
            }
            [acc[0] as f32, acc[1] as f32]
        };

        let keep_from = (base - self.quality as i64 + 1).max(0) as u64;
        while self.first < keep_from && !self.frames.is_empty() {
            self.frames.pop_front();
            self.first += 1;
        }

        self.produced += 1;
        Some(frame)
    }
}

impl Streamer for Resampler {
    fn stream(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;
        for pair in out.chunks_exact_mut(2) {
            let Some(frame) = self.next_frame() else {
                break;
            };
            pair.copy_from_slice(&frame);
            written += 2;
        }
        written
    }
}

fn to_stereo(frame: &[f32]) -> [f32; 2] {
    match frame {
        [mono] => [*mono, *mono],
        [left, right, ..] => [*left, *right],
        [] => [0.0, 0.0],
    }
}
