#![no_main]

use libfuzzer_sys::fuzz_target;
use std::sync::mpsc;
use termdeck::audio::ManualSink;
use termdeck::audio::decode::MemorySource;
use termdeck::queue::{Track, TrackQueue};

fuzz_target!(|data: &[u8]| {
    let sink = ManualSink::new();
    let (tx, rx) = mpsc::channel();
    let mut queue = TrackQueue::new(Box::new(sink.clone()), tx);

    for byte in data {
        match byte % 12 {
            0 => {
                let index = queue.len();
                let frames = usize::from(byte / 12) + 1;
                queue.add(Track::from_source(
                    format!("track_{index}.mp3"),
                    Box::new(MemorySource::new(1, 22_050, vec![0.5; frames])),
                    usize::from(byte % 5) + 1,
                ));
                queue.play();
            }
            1 => queue.next(),
            2 => queue.previous(),
            3 => queue.restart_current(),
            4 => queue.restart_all(),
            5 => {
                let _ = queue.remove(&format!("track_{}.mp3", byte / 12));
            }
            6 => {
                let _ = queue.change(i32::from(*byte) - 128);
            }
            7 => queue.toggle_pause(),
            8 => queue.clear(),
            9 => queue.restart(usize::from(byte / 12)),
            _ => {
                sink.pull(usize::from(*byte) * 2);
                for event in rx.try_iter().collect::<Vec<_>>() {
                    queue.handle(event);
                }
            }
        }

        assert!(queue.is_empty() || queue.current_index() < queue.len());
        assert!(queue.percent() >= 0);
    }
});
