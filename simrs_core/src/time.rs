use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A point in virtual (simulation) time, in seconds since the `Environment`'s origin.
///
/// Unlike [`std::time::Duration`], virtual time is a plain `f64`: models routinely need
/// fractional delays (`env.timeout(0.1)`) and the kernel never touches the wall clock, so there
/// is no reason to pay for `Duration`'s nanosecond-integer representation. `NaN` is never
/// produced by any operation in this crate; [`VirtualTime::cmp`] panics if it ever sees one,
/// which would indicate a model constructed a delay from a NaN source.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(transparent)]
pub struct VirtualTime(f64);

impl VirtualTime {
    pub const ZERO: Self = Self(0.0);
    pub const INFINITE: Self = Self(f64::INFINITY);

    pub fn new(seconds: f64) -> Self {
        Self(seconds)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0
    }

    pub fn checked_duration_since(&self, earlier: Self) -> Option<f64> {
        let delta = self.0 - earlier.0;
        (delta >= 0.0).then_some(delta)
    }
}

impl Eq for VirtualTime {}

impl PartialOrd for VirtualTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VirtualTime {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .partial_cmp(&other.0)
            .expect("virtual time must never be NaN")
    }
}

impl Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<f64> for VirtualTime {
    fn from(seconds: f64) -> Self {
        Self(seconds)
    }
}

impl From<VirtualTime> for f64 {
    fn from(time: VirtualTime) -> Self {
        time.0
    }
}

impl std::ops::Add<f64> for VirtualTime {
    type Output = Self;

    fn add(self, rhs: f64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::ops::Sub for VirtualTime {
    type Output = f64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Scheduling priority. Lower variants run first among events due at the same [`VirtualTime`].
///
/// Only two levels are exposed, matching every primitive in this crate: `Normal` is what
/// `succeed`/`fail`/`schedule` use by default, and what every primitive in this crate actually
/// schedules at. `Urgent` exists so a model can still express "observe this before ordinary
/// events at the same instant" via `Environment::schedule` directly; nothing in this crate's own
/// trigger cycles (resource release, container put/get) uses it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Urgent,
    #[default]
    Normal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_time_ord() {
        assert!(VirtualTime::new(1.0) < VirtualTime::new(2.0));
        assert!(VirtualTime::new(5.1) < VirtualTime::new(9.1));
    }

    #[test]
    fn priority_ord() {
        assert!(Priority::Urgent < Priority::Normal);
    }
}
