// ==============================================================================
// countdown.rs - START COUNTDOWN
// ------------------------------------------------------------------------------
// Announces the whole seconds left before the start signal ("3", "2", "1")
// and then "Go!", driven by the simulated race clock so it stays in step
// with the cars no matter the tick rate.
// ==============================================================================

use std::fmt;

use serde::Serialize;

use crate::autopilot::Real;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Announcement {
    Count(u32),
    Go,
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Announcement::Count(n) => write!(f, "{}", n),
            Announcement::Go => write!(f, "Go!"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Countdown {
    race_start: Real,
    last: Option<Announcement>,
}

impl Countdown {
    pub fn new(race_start: Real) -> Self {
        Self { race_start, last: None }
    }

    /// The announcement due at `elapsed`, once per change.
    pub fn update(&mut self, elapsed: Real) -> Option<Announcement> {
        let remaining = self.race_start - elapsed;
        let now = if remaining > 0.0 {
            Announcement::Count(remaining.ceil() as u32)
        } else {
            Announcement::Go
        };

        if self.last == Some(now) {
            return None;
        }
        self.last = Some(now);
        Some(now)
    }

    pub fn current(&self) -> Option<Announcement> {
        self.last
    }
}
