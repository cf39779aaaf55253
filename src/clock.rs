//! Simulation clock.
//!
//! The clock is the sole authority over the current date. It advances in
//! fixed one-year ticks and carries the play/pause lifecycle used by the
//! background runner. Everything temporal in the engine derives from the
//! date it holds; nothing else may move time.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::SimulationError;

/// Fixed tick size, in years.
pub const TICK_YEARS: i32 = 1;

/// Upper bound for the real-time speed multiplier.
pub const MAX_SPEED: f64 = 10.0;

/// Lifecycle state of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    Stopped,
    Running,
    Paused,
}

/// Year-resolution simulation clock.
///
/// `advance` is the only mutation path for the date. State transitions are
/// validated; `stop` is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    current_date: NaiveDate,
    state: ClockState,
    speed: f64,
}

/// Shift a date by whole years, pinning Feb 29 starts to Feb 28 so the
/// arithmetic is total.
pub fn add_years(date: NaiveDate, years: i32) -> NaiveDate {
    let year = date.year() + years;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(date)
}

/// Whole years elapsed from `from` to `to` (0 when `to` precedes `from`).
pub fn years_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to < from {
        return 0;
    }
    let mut years = to.year() - from.year();
    if (to.month(), to.day()) < (from.month(), from.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

impl Clock {
    /// A stopped clock at the given date. Feb 29 is normalized to Feb 28 so
    /// every later anniversary exists.
    pub fn new(start: NaiveDate) -> Self {
        let start = if start.month() == 2 && start.day() == 29 {
            NaiveDate::from_ymd_opt(start.year(), 2, 28).unwrap_or(start)
        } else {
            start
        };
        Clock {
            current_date: start,
            state: ClockState::Stopped,
            speed: 1.0,
        }
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn start(&mut self) -> Result<(), SimulationError> {
        match self.state {
            ClockState::Stopped => {
                self.state = ClockState::Running;
                Ok(())
            }
            state => Err(SimulationError::IllegalStateTransition { op: "start", state }),
        }
    }

    pub fn pause(&mut self) -> Result<(), SimulationError> {
        match self.state {
            ClockState::Running => {
                self.state = ClockState::Paused;
                Ok(())
            }
            state => Err(SimulationError::IllegalStateTransition { op: "pause", state }),
        }
    }

    pub fn resume(&mut self) -> Result<(), SimulationError> {
        match self.state {
            ClockState::Paused => {
                self.state = ClockState::Running;
                Ok(())
            }
            state => Err(SimulationError::IllegalStateTransition { op: "resume", state }),
        }
    }

    /// Stop from any state. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    /// Real-time multiplier for the background runner. Only meaningful
    /// while running; must lie in (0, `MAX_SPEED`].
    pub fn set_speed(&mut self, speed: f64) -> Result<(), SimulationError> {
        if !(speed > 0.0 && speed <= MAX_SPEED) {
            return Err(SimulationError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(())
    }

    /// Advance exactly one tick. Returns `(old_date, new_date)` for the
    /// tick event. Works in any state: `step` is synchronous and ignores
    /// the play lifecycle.
    pub fn advance(&mut self) -> (NaiveDate, NaiveDate) {
        let old = self.current_date;
        self.current_date = add_years(old, TICK_YEARS);
        (old, self.current_date)
    }

    /// Validate a seek target and return the number of ticks needed to
    /// reach it. The gap is filled by normal tick processing, which the
    /// engine drives; the clock only authorizes the move.
    pub fn seek_gap(&self, target: NaiveDate) -> Result<u32, SimulationError> {
        match self.state {
            ClockState::Stopped | ClockState::Paused => {}
            state => {
                return Err(SimulationError::IllegalStateTransition { op: "seek", state });
            }
        }
        if target < self.current_date {
            return Err(SimulationError::TimeReversal {
                current: self.current_date,
                requested: target,
            });
        }
        Ok(years_between(self.current_date, target))
    }

    /// Restore clock position from a snapshot. The restored clock is
    /// always stopped.
    pub(crate) fn restore(date: NaiveDate) -> Self {
        Clock::new(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn advance_moves_one_year() {
        let mut clock = Clock::new(date(2000, 1, 1));
        let (old, new) = clock.advance();
        assert_eq!(old, date(2000, 1, 1));
        assert_eq!(new, date(2001, 1, 1));
        assert_eq!(clock.current_date(), new);
    }

    #[test]
    fn leap_day_start_is_normalized() {
        let clock = Clock::new(date(2000, 2, 29));
        assert_eq!(clock.current_date(), date(2000, 2, 28));
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut clock = Clock::new(date(2000, 1, 1));
        clock.start().unwrap();
        let err = clock.start().unwrap_err();
        assert!(matches!(
            err,
            SimulationError::IllegalStateTransition { op: "start", .. }
        ));
    }

    #[test]
    fn pause_resume_cycle() {
        let mut clock = Clock::new(date(2000, 1, 1));
        assert!(clock.pause().is_err());
        clock.start().unwrap();
        clock.pause().unwrap();
        assert_eq!(clock.state(), ClockState::Paused);
        clock.resume().unwrap();
        assert_eq!(clock.state(), ClockState::Running);
        clock.stop();
        clock.stop(); // idempotent
        assert_eq!(clock.state(), ClockState::Stopped);
    }

    #[test]
    fn seek_backwards_is_time_reversal() {
        let clock = Clock::new(date(2050, 1, 1));
        let err = clock.seek_gap(date(2040, 1, 1)).unwrap_err();
        assert!(matches!(err, SimulationError::TimeReversal { .. }));
    }

    #[test]
    fn seek_gap_counts_ticks() {
        let clock = Clock::new(date(2000, 1, 1));
        assert_eq!(clock.seek_gap(date(2007, 1, 1)).unwrap(), 7);
        assert_eq!(clock.seek_gap(date(2000, 1, 1)).unwrap(), 0);
    }

    #[test]
    fn seek_while_running_is_rejected() {
        let mut clock = Clock::new(date(2000, 1, 1));
        clock.start().unwrap();
        assert!(clock.seek_gap(date(2010, 1, 1)).is_err());
    }

    #[test]
    fn speed_bounds() {
        let mut clock = Clock::new(date(2000, 1, 1));
        clock.set_speed(2.5).unwrap();
        assert!((clock.speed() - 2.5).abs() < f64::EPSILON);
        assert!(clock.set_speed(0.0).is_err());
        assert!(clock.set_speed(10.5).is_err());
        assert!(clock.set_speed(f64::NAN).is_err());
    }

    #[test]
    fn years_between_respects_anniversaries() {
        let born = date(2000, 6, 15);
        assert_eq!(years_between(born, date(2001, 6, 14)), 0);
        assert_eq!(years_between(born, date(2001, 6, 15)), 1);
        assert_eq!(years_between(born, date(2030, 1, 1)), 29);
        assert_eq!(years_between(born, date(1999, 1, 1)), 0);
    }
}
