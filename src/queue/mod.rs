//! The playback queue: the ordered tracks, the cursor, the gain stage and the
//! composite stream installed into the sink.

pub mod gain;
pub mod navigation;
pub mod track;

use crate::audio::AudioSink;
use crate::audio::stream::{Callback, Seq, Streamer};
use gain::Gain;
use navigation::{Command, Effect};
use std::path::Path;
use std::sync::mpsc::Sender;
use tracing::{debug, warn};

pub use track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// A track's samples ran out. `generation` identifies the composite stream
    /// that produced the event.
    TrackFinished { generation: u64 },
}

pub struct TrackQueue {
    tracks: Vec<Track>,
    current: usize,
    gain: Gain,
    generation: u64,
    sink: Box<dyn AudioSink>,
    events: Sender<QueueEvent>,
}

impl TrackQueue {
    pub fn new(sink: Box<dyn AudioSink>, events: Sender<QueueEvent>) -> Self {
        Self {
            tracks: Vec::new(),
            current: 0,
            gain: Gain::default(),
            generation: 0,
            sink,
            events,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn has(&self, path: &Path) -> bool {
        self.tracks.iter().any(|track| track.path() == path)
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn output_name(&self) -> String {
        self.sink.output_name()
    }

    /// Appends and reinstalls the stream. Callers check `has` first.
    pub fn add(&mut self, track: Track) {
        self.tracks.push(track);
        self.rebuild();
    }

    /// Drops the first track whose file name is `name` and moves the cursor to
    /// the slot before it. The installed stream is left alone until the next
    /// rebuild, so a removed track that is playing keeps playing until then.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(found) = self.tracks.iter().position(|track| track.name() == name) else {
            return false;
        };
        self.current = found.saturating_sub(1);
        let removed = self.tracks.remove(found);
        debug!(path = %removed.path().display(), index = found, "removed track");
        true
    }

    pub fn next(&mut self) {
        self.step(Command::Next, true);
    }

    pub fn previous(&mut self) {
        self.step(Command::Previous, true);
    }

    /// Replays a track that already finished. A track that is still somewhere
    /// in the middle only gets its ended flag cleared.
    pub fn restart(&mut self, index: usize) {
        self.step(Command::Restart(index), true);
    }

    pub fn restart_current(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        self.restart(self.current);
    }

    pub fn restart_all(&mut self) {
        for index in 0..self.tracks.len() {
            self.restart(index);
        }
        self.current = 0;
        self.rebuild();
    }

    /// Applies one navigation command. With `flush` unset the device keeps
    /// what it already buffered, which is how a finished track hands over.
    fn step(&mut self, command: Command, flush: bool) {
        let step = navigation::plan(command, self.current, self.tracks.len());
        if let Some(mark) = step.mark
            && let Some(track) = self.tracks.get_mut(mark.track)
        {
            track.set_ended(mark.ended);
        }
        self.current = step.index;

        match step.effect {
            Effect::Stay => {}
            Effect::Replay => {
                self.rebuild();
                if flush {
                    self.play();
                }
            }
            Effect::Rewind(index) => {
                let Some(track) = self.tracks.get_mut(index) else {
                    return;
                };
                if !track.at_end() {
                    return;
                }
                match track.rewind() {
                    Ok(()) => {
                        self.rebuild();
                        self.play();
                    }
                    Err(err) => {
                        warn!("restart failed: {err}");
                        track.set_ended(true);
                    }
                }
            }
        }
    }

    /// Installs a fresh composite of every track that has not ended, each
    /// followed by a one-shot end-of-track event.
    pub fn rebuild(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        let mut parts: Vec<Box<dyn Streamer>> = Vec::new();
        for track in self.tracks.iter().filter(|track| !track.is_ended()) {
            parts.push(track.playable());
            let events = self.events.clone();
            parts.push(Box::new(Callback::new(move || {
                let _ = events.send(QueueEvent::TrackFinished { generation });
            })));
        }
        let queued = parts.len() / 2;

        let replaced = self.sink.lock().install(Some(Box::new(Seq::new(parts))));
        drop(replaced);
        debug!(generation, queued, "composite stream installed");
    }

    pub fn play(&self) {
        self.sink.clear();
        if !self.tracks.is_empty() {
            self.sink.play();
        }
    }

    pub fn pause(&self) {
        self.sink.lock().set_paused(true);
    }

    pub fn unpause(&self) {
        self.sink.lock().set_paused(false);
    }

    pub fn toggle_pause(&self) {
        let mut transport = self.sink.lock();
        let paused = transport.is_paused();
        transport.set_paused(!paused);
    }

    pub fn paused(&self) -> bool {
        self.sink.lock().is_paused()
    }

    /// Moves the volume by `delta` percent. Returns false when the change
    /// would go below mute.
    pub fn change(&mut self, delta: i32) -> bool {
        if !self.gain.change(delta) {
            debug!(delta, deviation = self.gain.deviation(), "volume change rejected");
            return false;
        }
        let factor = self.gain.factor();
        self.sink.lock().set_gain(factor);
        self.sink.clear();
        self.sink.play();
        true
    }

    pub fn percent(&self) -> i32 {
        self.gain.percent()
    }

    pub fn muted(&self) -> bool {
        self.gain.is_muted()
    }

    pub fn gain(&self) -> &Gain {
        &self.gain
    }

    /// Closes every decoder and installs an empty stream.
    pub fn clear(&mut self) {
        for track in &self.tracks {
            track.close();
        }
        self.generation = self.generation.wrapping_add(1);
        let replaced = self.sink.lock().install(None);
        drop(replaced);
        self.current = 0;
        self.tracks.clear();
    }

    pub fn handle(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::TrackFinished { generation } => {
                if generation != self.generation {
                    debug!(
                        generation,
                        current = self.generation,
                        "dropping stale end-of-track event"
                    );
                    return;
                }
                self.step(Command::Next, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::MemorySource;
    use crate::audio::{ManualSink, OUTPUT_SAMPLE_RATE};
    use std::sync::mpsc::{self, Receiver};

    // Each fixture track is a constant level, so pulled audio shows which
    // track it came from.
    fn fixture(name: &str, level: f32, frames: usize) -> Track {
        Track::from_source(
            format!("/music/{name}"),
            Box::new(MemorySource::new(
                2,
                OUTPUT_SAMPLE_RATE,
                vec![level; frames * 2],
            )),
            1,
        )
    }

    fn queue_with(tracks: &[(&str, f32)]) -> (TrackQueue, ManualSink, Receiver<QueueEvent>) {
        let sink = ManualSink::new();
        let (tx, rx) = mpsc::channel();
        let mut queue = TrackQueue::new(Box::new(sink.clone()), tx);
        for (name, level) in tracks {
            queue.add(fixture(name, *level, 4));
            queue.play();
        }
        (queue, sink, rx)
    }

    fn ended(queue: &TrackQueue) -> Vec<bool> {
        queue.tracks().iter().map(Track::is_ended).collect()
    }

    fn levels(samples: &[f32]) -> Vec<f32> {
        let mut out: Vec<f32> = Vec::new();
        for sample in samples {
            if *sample != 0.0 && out.last() != Some(sample) {
                out.push(*sample);
            }
        }
        out
    }

    #[test]
    fn new_queue_is_empty_at_unity() {
        let (queue, _sink, _rx) = queue_with(&[]);
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
        assert_eq!(queue.current_index(), 0);
        assert_eq!(queue.percent(), 100);
        assert!(!queue.paused());
        assert_eq!(queue.output_name(), "Manual sink");
    }

    #[test]
    fn composite_plays_tracks_in_insertion_order() {
        let (_queue, sink, rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2), ("c.mp3", 0.3)]);
        let out = sink.pull(64);
        assert_eq!(levels(&out), vec![0.1, 0.2, 0.3]);
        assert_eq!(rx.try_iter().count(), 3);
    }

    #[test]
    fn has_matches_full_path() {
        let (queue, _sink, _rx) = queue_with(&[("a.mp3", 0.1)]);
        assert!(queue.has(Path::new("/music/a.mp3")));
        assert!(!queue.has(Path::new("a.mp3")));
    }

    #[test]
    fn next_at_tail_only_marks_ended() {
        let (mut queue, _sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        queue.next();
        assert_eq!(queue.current_index(), 1);
        queue.next();
        assert_eq!(queue.current_index(), 1);
        assert_eq!(ended(&queue), vec![true, true]);
    }

    #[test]
    fn next_on_empty_queue_is_a_no_op() {
        let (mut queue, _sink, _rx) = queue_with(&[]);
        queue.next();
        queue.previous();
        queue.restart_current();
        assert_eq!(queue.current_index(), 0);
    }

    #[test]
    fn two_nexts_leave_only_the_last_track_in_the_stream() {
        let (mut queue, sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2), ("c.mp3", 0.3)]);
        queue.next();
        queue.next();
        assert_eq!(queue.current_index(), 2);
        assert_eq!(ended(&queue), vec![true, true, false]);
        assert_eq!(levels(&sink.pull(64)), vec![0.3]);
    }

    #[test]
    fn previous_readmits_the_track_it_lands_on() {
        let (mut queue, sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2), ("c.mp3", 0.3)]);
        queue.next();
        queue.next();
        queue.previous();
        assert_eq!(queue.current_index(), 1);
        assert_eq!(ended(&queue), vec![true, false, false]);
        assert_eq!(levels(&sink.pull(64)), vec![0.2, 0.3]);
    }

    #[test]
    fn previous_at_head_is_a_no_op() {
        let (mut queue, _sink, _rx) = queue_with(&[("a.mp3", 0.1)]);
        let generation = queue.generation();
        queue.previous();
        assert_eq!(queue.current_index(), 0);
        assert_eq!(queue.generation(), generation);
    }

    #[test]
    fn restart_mid_track_only_clears_the_flag() {
        let (mut queue, _sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        queue.next();
        let generation = queue.generation();
        queue.restart(0);
        assert_eq!(ended(&queue), vec![false, false]);
        assert_eq!(queue.generation(), generation);
        assert_eq!(queue.tracks()[0].position(), 0);
    }

    #[test]
    fn restart_of_a_finished_track_replays_it() {
        let (mut queue, sink, rx) = queue_with(&[("a.mp3", 0.1)]);
        sink.pull(64);
        for event in rx.try_iter().collect::<Vec<_>>() {
            queue.handle(event);
        }
        assert_eq!(ended(&queue), vec![true]);
        assert!(queue.tracks()[0].at_end());

        queue.restart_current();
        assert_eq!(ended(&queue), vec![false]);
        assert_eq!(queue.tracks()[0].position(), 0);
        assert_eq!(levels(&sink.pull(64)), vec![0.1]);
    }

    #[test]
    fn restart_all_rewinds_and_returns_to_the_head() {
        let (mut queue, sink, rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        sink.pull(64);
        for event in rx.try_iter().collect::<Vec<_>>() {
            queue.handle(event);
        }
        assert_eq!(queue.current_index(), 1);

        queue.restart_all();
        assert_eq!(queue.current_index(), 0);
        assert_eq!(ended(&queue), vec![false, false]);
        assert_eq!(levels(&sink.pull(64)), vec![0.1, 0.2]);
    }

    #[test]
    fn remove_reanchors_to_predecessor_without_rebuilding() {
        let (mut queue, _sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2), ("c.mp3", 0.3)]);
        queue.next();
        queue.next();
        let generation = queue.generation();

        assert!(!queue.remove("missing.mp3"));
        assert_eq!(queue.current_index(), 2);

        assert!(queue.remove("b.mp3"));
        assert_eq!(queue.current_index(), 0);
        assert_eq!(queue.len(), 2);
        assert!(!queue.has(Path::new("/music/b.mp3")));
        assert_eq!(queue.generation(), generation);

        assert!(queue.remove("a.mp3"));
        assert_eq!(queue.current_index(), 0);
    }

    #[test]
    fn removed_track_keeps_sounding_until_next_rebuild() {
        let (mut queue, sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        queue.remove("a.mp3");
        assert_eq!(levels(&sink.pull(64)), vec![0.1, 0.2]);
    }

    #[test]
    fn stale_finish_event_is_ignored() {
        let (mut queue, sink, rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2), ("c.mp3", 0.3)]);
        sink.pull(10);
        let finished = rx.try_recv().expect("a finished");

        queue.next();
        assert_eq!(queue.current_index(), 1);
        queue.handle(finished);
        assert_eq!(queue.current_index(), 1);
    }

    #[test]
    fn finish_event_from_current_stream_advances() {
        let (mut queue, sink, rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        sink.pull(10);
        queue.handle(rx.try_recv().expect("a finished"));
        assert_eq!(queue.current_index(), 1);
        assert_eq!(ended(&queue), vec![true, false]);
    }

    #[test]
    fn natural_advance_keeps_the_device_buffer() {
        let (mut queue, sink, rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        let head = sink.pull(10);
        assert_eq!(&head[8..], &[0.2, 0.2]);
        let cleared = sink.lock().cleared();

        queue.handle(rx.try_recv().expect("a finished"));
        assert_eq!(queue.current_index(), 1);
        assert_eq!(sink.lock().cleared(), cleared);
        assert!(sink.lock().is_playing());
        assert_eq!(sink.pull(6), vec![0.2; 6]);
    }

    #[test]
    fn user_next_flushes_the_device_buffer() {
        let (mut queue, sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        let cleared = sink.lock().cleared();
        queue.next();
        assert_eq!(sink.lock().cleared(), cleared + 1);
        assert!(sink.lock().is_playing());
    }

    #[test]
    fn odd_pull_does_not_finish_a_track_early() {
        let sink = ManualSink::new();
        let (tx, rx) = mpsc::channel();
        let mut queue = TrackQueue::new(Box::new(sink.clone()), tx);
        queue.add(fixture("long.mp3", 0.5, 8));
        queue.play();

        assert_eq!(&sink.pull(5)[..4], &[0.5; 4]);
        assert!(rx.try_recv().is_err());
        assert_eq!(sink.pull(12), vec![0.5; 12]);
        assert!(rx.try_recv().is_err());
        sink.pull(2);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn pause_holds_the_stream_in_place() {
        let (queue, sink, _rx) = queue_with(&[("a.mp3", 0.1)]);
        queue.pause();
        assert!(queue.paused());
        assert_eq!(sink.pull(8), vec![0.0; 8]);
        queue.toggle_pause();
        assert!(!queue.paused());
        assert_eq!(sink.pull(8), vec![0.1; 8]);
        queue.pause();
        queue.unpause();
        assert!(!queue.paused());
    }

    #[test]
    fn volume_change_reaches_the_transport() {
        let (mut queue, sink, _rx) = queue_with(&[("a.mp3", 0.5)]);
        assert!(!queue.change(-110));
        assert_eq!(queue.percent(), 100);

        assert!(queue.change(-100));
        assert_eq!(queue.percent(), 0);
        assert!(queue.muted());
        assert_eq!(sink.pull(4), vec![0.0; 4]);

        assert!(queue.change(50));
        assert_eq!(queue.percent(), 50);
        let out = sink.pull(2);
        assert!((out[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn clear_closes_decoders_and_empties_the_transport() {
        let (mut queue, sink, _rx) = queue_with(&[("a.mp3", 0.1), ("b.mp3", 0.2)]);
        queue.next();
        let mut view = queue.tracks()[1].playable();
        queue.clear();
        let mut buf = [0.0; 8];
        assert_eq!(view.stream(&mut buf), 0);
        assert!(queue.is_empty());
        assert_eq!(queue.current_index(), 0);
        assert!(!sink.lock().has_stream());
        assert_eq!(sink.pull(8), vec![0.0; 8]);
    }
}
