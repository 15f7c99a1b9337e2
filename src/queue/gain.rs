/// Logarithm base of the volume stage.
pub const BASE: f64 = 10.0;
/// Deviation at which output is hard-muted. Nothing below it is accepted.
pub const MUTE_DEVIATION: i32 = -100;

/// Volume as a percent deviation `d` from unity (0 means 100%).
///
/// The stage multiplies samples by `BASE^volume` where
/// `volume = log10(100 + d) - 2`, so `d = 0` is unity gain. `d = -100` would
/// put `volume` at negative infinity; it is tracked as an explicit mute flag
/// instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    deviation: i32,
    volume: f64,
    silent: bool,
}

impl Default for Gain {
    fn default() -> Self {
        Self {
            deviation: 0,
            volume: 0.0,
            silent: false,
        }
    }
}

impl Gain {
    /// Applies `delta` unless it would take the deviation below the mute
    /// floor. Returns whether the change was accepted.
    pub fn change(&mut self, delta: i32) -> bool {
        let Some(next) = self.deviation.checked_add(delta) else {
            return false;
        };
        if next < MUTE_DEVIATION {
            return false;
        }

        self.deviation = next;
        self.silent = next == MUTE_DEVIATION;
        self.volume = (100.0 + f64::from(next)).log10() - 2.0;
        true
    }

    pub fn deviation(&self) -> i32 {
        self.deviation
    }

    pub fn is_muted(&self) -> bool {
        self.silent
    }

    /// Multiplier handed to the transport.
    pub fn factor(&self) -> f32 {
        if self.silent {
            0.0
        } else {
            BASE.powf(self.volume) as f32
        }
    }

    pub fn percent(&self) -> i32 {
        (100.0 * BASE.powf(self.volume)).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_unity() {
        let gain = Gain::default();
        assert_eq!(gain.percent(), 100);
        assert_eq!(gain.factor(), 1.0);
        assert!(!gain.is_muted());
    }

    #[test]
    fn underflow_is_rejected_without_clamping() {
        let mut gain = Gain::default();
        assert!(!gain.change(-110));
        assert_eq!(gain.deviation(), 0);
        assert_eq!(gain.percent(), 100);
    }

    #[test]
    fn exact_floor_mutes() {
        let mut gain = Gain::default();
        assert!(gain.change(-100));
        assert!(gain.is_muted());
        assert_eq!(gain.percent(), 0);
        assert_eq!(gain.factor(), 0.0);

        assert!(!gain.change(-10));
        assert!(gain.change(10));
        assert!(!gain.is_muted());
        assert_eq!(gain.percent(), 10);
    }

    #[test]
    fn above_unity_is_unclamped() {
        let mut gain = Gain::default();
        for _ in 0..15 {
            assert!(gain.change(10));
        }
        assert_eq!(gain.percent(), 250);
        assert!((gain.factor() - 2.5).abs() < 1e-5);
    }

    #[test]
    fn overflowing_delta_is_rejected() {
        let mut gain = Gain::default();
        assert!(gain.change(i32::MAX - 1));
        assert!(!gain.change(10));
    }

    proptest::proptest! {
        #[test]
        fn percent_inverts_every_accepted_change(deltas in proptest::collection::vec(-40i32..40, 1..60)) {
            let mut gain = Gain::default();
            let mut expected = 0;
            for delta in deltas {
                let accepted = gain.change(delta);
                proptest::prop_assert_eq!(accepted, expected + delta >= MUTE_DEVIATION);
                if accepted {
                    expected += delta;
                }
                proptest::prop_assert_eq!(gain.deviation(), expected);
                let formula = (100.0 * BASE.powf((100.0 + f64::from(expected)).log10() - 2.0)).round() as i32;
                proptest::prop_assert_eq!(gain.percent(), formula);
                proptest::prop_assert_eq!(gain.percent(), 100 + expected);
                proptest::prop_assert_eq!(gain.is_muted(), expected == MUTE_DEVIATION);
            }
        }
    }
}
