//! Advisory time-remaining countdown shown while audio is processed

use std::time::Duration;

/// Shown once the countdown has reached zero
pub const FINISHING_UP: &str = "Finishing up...";
/// Shown when processing completes
pub const READY: &str = "Ready!";
/// Shown when the audio duration could not be read
pub const ESTIMATING: &str = "Estimating time remaining...";

/// Seconds-remaining estimate, decremented once per poll tick
///
/// The countdown is purely timer driven and never looks at server status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EstimateCountdown {
    remaining: Option<u64>,
}

impl EstimateCountdown {
    /// `ceil(duration / divisor + overhead)` seconds
    pub fn from_duration(duration: Duration, divisor: u64, overhead_secs: u64) -> Self {
        let secs = duration.as_secs_f64() / divisor.max(1) as f64 + overhead_secs as f64;
        Self {
            remaining: Some(secs.ceil() as u64),
        }
    }

    pub fn indeterminate() -> Self {
        Self { remaining: None }
    }

    pub fn remaining_secs(&self) -> Option<u64> {
        self.remaining
    }

    /// Count down one second; stays at zero
    pub fn tick(&mut self) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    pub fn display(&self) -> String {
        match self.remaining {
            None => ESTIMATING.to_string(),
            Some(0) => FINISHING_UP.to_string(),
            Some(secs) if secs < 60 => format!("~{}s remaining", secs),
            Some(secs) => format!("~{}m {:02}s remaining", secs / 60, secs % 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_estimate() {
        // 160s of audio: 160/80 + 20 = 22
        let countdown = EstimateCountdown::from_duration(Duration::from_secs(160), 80, 20);
        assert_eq!(countdown.remaining_secs(), Some(22));

        // 1s of audio rounds up: 1/80 + 20 = 20.0125 -> 21
        let countdown = EstimateCountdown::from_duration(Duration::from_secs(1), 80, 20);
        assert_eq!(countdown.remaining_secs(), Some(21));
    }

    #[test]
    fn test_display_formats() {
        let countdown = EstimateCountdown::from_duration(Duration::from_secs(0), 80, 45);
        assert_eq!(countdown.display(), "~45s remaining");

        let countdown = EstimateCountdown::from_duration(Duration::from_secs(8000), 80, 25);
        assert_eq!(countdown.display(), "~2m 05s remaining");

        assert_eq!(EstimateCountdown::indeterminate().display(), ESTIMATING);
    }

    #[test]
    fn test_never_goes_negative() {
        let mut countdown = EstimateCountdown::from_duration(Duration::from_secs(0), 80, 2);
        countdown.tick();
        assert_eq!(countdown.display(), "~1s remaining");
        for _ in 0..5 {
            countdown.tick();
            assert_eq!(countdown.remaining_secs(), Some(0));
            assert_eq!(countdown.display(), FINISHING_UP);
        }
    }

    #[test]
    fn test_indeterminate_tick_is_noop() {
        let mut countdown = EstimateCountdown::indeterminate();
        countdown.tick();
        assert_eq!(countdown.remaining_secs(), None);
    }
}
