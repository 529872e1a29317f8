//! # Beat Detection
//!
//! A deliberately crude heartbeat counter over the first difference of the
//! signal. A sharp fall (the downstroke after an R peak) counts a beat and
//! arms the `Low` state; a moderate rise re-arms `Normal`. The machine is
//! rebuilt from scratch for every window, so nothing carries across calls.
//!
//! Decent on regular rhythms. On fibrillation it tends to read high, which
//! for an alarm is the safe direction to be wrong in.

/// A fall steeper than this (per sample) counts a beat.
pub const BEAT_DROP: i32 = -50;
/// A rise steeper than this (per sample) ends the low phase.
pub const RECOVERY_RISE: i32 = 25;

/// The two states of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeatState {
    /// Waiting for a downstroke.
    #[default]
    Normal,
    /// A beat was counted; waiting for the signal to recover.
    Low,
}

impl BeatState {
    /// Advances on one first-difference value. Returns the new state and
    /// whether a beat was counted on this step.
    pub fn step(self, delta: i32) -> (BeatState, bool) {
        match self {
            BeatState::Normal if delta < BEAT_DROP => (BeatState::Low, true),
            BeatState::Low if delta > RECOVERY_RISE => (BeatState::Normal, false),
            state => (state, false),
        }
    }
}

/// Counts heartbeats across `samples`, starting in `Normal`.
pub fn detect_heartbeats(samples: &[u16]) -> usize {
    let mut state = BeatState::Normal;
    let mut beats = 0;

    for pair in samples.windows(2) {
        let delta = i32::from(pair[1]) - i32::from(pair[0]);
        let (next, beat) = state.step(delta);
        if beat {
            beats += 1;
        }
        state = next;
    }
    beats
}

/// Scales a beat count over a window of `window_secs` seconds to a
/// per-minute rate.
pub fn beats_per_minute(beats: usize, window_secs: u32) -> u32 {
    let window_secs = u64::from(window_secs.max(1));
    ((beats as u64 * 60) / window_secs).min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_sawtooth_drops_count_two_beats() {
        assert_eq!(detect_heartbeats(&[500, 500, 440, 450, 500, 500, 440, 450]), 2);
    }

    #[test]
    fn test_no_recovery_means_no_second_beat() {
        // The rise of 20 never clears the recovery threshold.
        assert_eq!(detect_heartbeats(&[600, 540, 560, 500, 520, 460]), 1);
    }

    #[test]
    fn test_exact_thresholds_do_not_trigger() {
        assert_eq!(detect_heartbeats(&[500, 450]), 0);
        assert_eq!(BeatState::Low.step(25), (BeatState::Low, false));
        assert_eq!(BeatState::Low.step(26), (BeatState::Normal, false));
    }

    #[test]
    fn test_short_inputs() {
        assert_eq!(detect_heartbeats(&[]), 0);
        assert_eq!(detect_heartbeats(&[1023]), 0);
    }

    #[test]
    fn test_wide_values_do_not_overflow() {
        assert_eq!(detect_heartbeats(&[u16::MAX, 0, u16::MAX, 0]), 2);
    }

    #[test]
    fn test_bpm_scaling() {
        assert_eq!(beats_per_minute(72, 60), 72);
        assert_eq!(beats_per_minute(36, 30), 72);
        assert_eq!(beats_per_minute(5, 0), 300);
    }
}
