use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A pull-based producer of interleaved stereo samples at the output rate.
///
/// `stream` fills as much of `out` as it can and returns the number of samples
/// written. A short count means the streamer is drained and every later call
/// returns zero.
pub trait Streamer: Send {
    fn stream(&mut self, out: &mut [f32]) -> usize;
}

impl<S: Streamer + ?Sized> Streamer for Box<S> {
    fn stream(&mut self, out: &mut [f32]) -> usize {
        (**self).stream(out)
    }
}

/// Streamer behind a shared handle, so several composite streams built over
/// time keep reading from the same position.
pub struct Shared<S>(pub Arc<Mutex<S>>);

impl<S> Clone for Shared<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: Streamer> Streamer for Shared<S> {
    fn stream(&mut self, out: &mut [f32]) -> usize {
        self.0.lock().stream(out)
    }
}

/// Plays its parts back to back.
pub struct Seq {
    parts: VecDeque<Box<dyn Streamer>>,
}

impl Seq {
    pub fn new(parts: impl IntoIterator<Item = Box<dyn Streamer>>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Streamer for Seq {
    fn stream(&mut self, out: &mut [f32]) -> usize {
        let mut filled = 0;
        while filled < out.len() {
            let Some(part) = self.parts.front_mut() else {
                break;
            };
            let wanted = out.len() - filled;
            let written = part.stream(&mut out[filled..]);
            filled += written;
            if written < wanted - wanted % 2 {
                self.parts.pop_front();
            } else if written < wanted {
                // A dangling half frame is not room for another frame.
                break;
            }
        }
        filled
    }
}

/// Produces no samples; runs its action the first time it is reached.
pub struct Callback {
    action: Option<Box<dyn FnOnce() + Send>>,
}

impl Callback {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }
}

impl Streamer for Callback {
    fn stream(&mut self, _out: &mut [f32]) -> usize {
        if let Some(action) = self.action.take() {
            action();
        }
        0
    }
}

#[cfg(test)]
pub(crate) struct Constant {
    pub value: f32,
    pub remaining: usize,
}

#[cfg(test)]
impl Streamer for Constant {
    fn stream(&mut self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.remaining);
        out[..count].fill(self.value);
        self.remaining -= count;
        count
    }
}
