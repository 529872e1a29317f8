//! Dwell-time gate between BPM readings and the alarm.

/// What the alarm should be doing after a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// Enough consecutive high readings: the alarm should sound.
    Sound,
    /// The alarm should be quiet.
    Silence,
}

/// # Alert Policy
///
/// Counts consecutive readings above `limit`. Any reading at or below the
/// limit resets the count. The alarm sounds only while the count is above
/// `threshold`, so one noisy window never fires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPolicy {
    limit: u32,
    threshold: u32,
    consecutive_bad: u32,
}

impl AlertPolicy {
    /// A policy alarming above `limit` BPM once more than `threshold`
    /// consecutive windows exceed it.
    pub fn new(limit: u32, threshold: u32) -> Self {
        Self {
            limit,
            threshold,
            consecutive_bad: 0,
        }
    }

    /// Feeds one BPM reading.
    pub fn observe(&mut self, bpm: u32) -> AlertDecision {
        if bpm > self.limit {
            self.consecutive_bad = self.consecutive_bad.saturating_add(1);
        } else {
            self.consecutive_bad = 0;
        }

        if self.consecutive_bad > self.threshold {
            AlertDecision::Sound
        } else {
            AlertDecision::Silence
        }
    }

    /// Consecutive over-limit readings so far.
    pub fn consecutive_bad(&self) -> u32 {
        self.consecutive_bad
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(90, 20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twenty_first_high_window_sounds() {
        let mut policy = AlertPolicy::default();
        for _ in 0..20 {
            assert_eq!(policy.observe(91), AlertDecision::Silence);
        }
        assert_eq!(policy.observe(91), AlertDecision::Sound);
        assert_eq!(policy.observe(91), AlertDecision::Sound);

        assert_eq!(policy.observe(50), AlertDecision::Silence);
        assert_eq!(policy.consecutive_bad(), 0);
    }

    #[test]
    fn test_limit_itself_is_not_high() {
        let mut policy = AlertPolicy::new(90, 0);
        assert_eq!(policy.observe(90), AlertDecision::Silence);
        assert_eq!(policy.observe(91), AlertDecision::Sound);
    }

    #[test]
    fn test_interruption_restarts_the_count() {
        let mut policy = AlertPolicy::new(90, 2);
        policy.observe(120);
        policy.observe(120);
        policy.observe(80);
        assert_eq!(policy.observe(120), AlertDecision::Silence);
        assert_eq!(policy.consecutive_bad(), 1);
    }
}
