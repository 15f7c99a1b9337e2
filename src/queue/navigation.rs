//! Navigation as a transition table over `(current index, ended flags)`.
//!
//! `plan` is pure: it says where the cursor goes, which ended flag to write and
//! what the queue has to do to the stream. `Next` retires the track it leaves;
//! `Previous` re-admits the track it lands on and leaves the one it left alone.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    Restart(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub track: usize,
    pub ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Stay,
    /// Rebuild the composite stream, clear the transport, play.
    Replay,
    /// Rewind the track if its source is at end, then rebuild and play.
    Rewind(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub mark: Option<Mark>,
    pub effect: Effect,
}

impl Step {
    fn stay(index: usize) -> Self {
        Self {
            index,
            mark: None,
            effect: Effect::Stay,
        }
    }
}

pub fn plan(command: Command, index: usize, len: usize) -> Step {
    match command {
        Command::Next => {
            if len == 0 {
                return Step::stay(index);
            }
            let mark = Some(Mark {
                track: index,
                ended: true,
            });
            if index + 1 >= len {
                return Step {
                    index,
                    mark,
                    effect: Effect::Stay,
                };
            }
            Step {
                index: index + 1,
                mark,
                effect: Effect::Replay,
            }
        }
        Command::Previous => {
            if index == 0 || index > len {
                return Step::stay(index);
            }
            Step {
                index: index - 1,
                mark: Some(Mark {
                    track: index - 1,
                    ended: false,
                }),
                effect: Effect::Replay,
            }
        }
        Command::Restart(track) => {
            if track >= len {
                return Step::stay(index);
            }
            Step {
                index,
                mark: Some(Mark {
                    track,
                    ended: false,
                }),
                effect: Effect::Rewind(track),
            }
        }
    }
}
