use core::{fmt, time::Duration};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{SyncError, SyncResult};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// An absolute point on the wall clock, `secs` and `nanos` since the Unix
/// epoch.
///
/// `nanos` is always in `[0, 1_000_000_000)`. Timed operations compare the
/// deadline with [`SystemTime::now`], so a deadline in the past makes them
/// fail with [`SyncError::TimedOut`] without waiting.
///
/// # Examples
///
/// ```
/// use dt_os::time::{Deadline, Duration};
///
/// let soon = Deadline::after(Duration::from_millis(10));
/// assert!(!soon.has_passed() || soon.remaining() == Duration::ZERO);
///
/// assert!(Deadline::new(1, 1_000_000_000).is_err());
/// assert!(Deadline::new(1, 999_999_999).is_ok());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline {
    secs: i64,
    nanos: u32,
}

impl Deadline {
    /// Creates a deadline from its raw parts.
    ///
    /// Fails with [`SyncError::Error`] if `nanos` is not below one second.
    #[inline]
    pub const fn new(secs: i64, nanos: u32) -> SyncResult<Deadline> {
        if nanos >= NANOS_PER_SEC {
            Err(SyncError::Error)
        } else {
            Ok(Deadline { secs, nanos })
        }
    }

    /// The current wall-clock time.
    #[inline]
    pub fn now() -> Deadline {
        Deadline::from_system_time(SystemTime::now())
    }

    /// The wall-clock time `dur` from now, saturating on overflow.
    #[inline]
    pub fn after(dur: Duration) -> Deadline {
        Deadline::now().saturating_add(dur)
    }

    /// The wall-clock time `dur` before now.
    #[inline]
    pub fn before(dur: Duration) -> Deadline {
        Deadline::now().saturating_sub(dur)
    }

    /// Converts a [`SystemTime`], including times before the epoch.
    pub fn from_system_time(time: SystemTime) -> Deadline {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Deadline {
                secs: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
                nanos: d.subsec_nanos(),
            },
            Err(e) => Deadline::default().saturating_sub(e.duration()),
        }
    }

    /// Whole seconds since the epoch.
    #[inline]
    pub const fn secs(&self) -> i64 {
        self.secs
    }

    /// Nanoseconds past [`secs`](Self::secs), below one second.
    #[inline]
    pub const fn nanos(&self) -> u32 {
        self.nanos
    }

    /// Returns `true` once the wall clock has reached this deadline.
    #[inline]
    pub fn has_passed(&self) -> bool {
        *self <= Deadline::now()
    }

    /// Time left until the deadline, zero if it has passed.
    #[inline]
    pub fn remaining(&self) -> Duration {
        self.duration_since(Deadline::now())
    }

    /// Time from `earlier` to `self`, zero if `earlier` is not earlier.
    pub fn duration_since(&self, earlier: Deadline) -> Duration {
        if *self <= earlier {
            return Duration::ZERO;
        }
        let (secs, nanos) = if self.nanos >= earlier.nanos {
            (self.secs.wrapping_sub(earlier.secs), self.nanos - earlier.nanos)
        } else {
            (
                self.secs.wrapping_sub(earlier.secs).wrapping_sub(1),
                self.nanos + NANOS_PER_SEC - earlier.nanos,
            )
        };
        // `self > earlier` so the difference is non-negative as an unsigned value.
        Duration::new(secs as u64, nanos)
    }

    /// Moves the deadline later by `dur`, clamping at the largest value.
    pub fn saturating_add(self, dur: Duration) -> Deadline {
        let add = i64::try_from(dur.as_secs()).unwrap_or(i64::MAX);
        let Some(mut secs) = self.secs.checked_add(add) else {
            return Deadline::MAX;
        };
        let mut nanos = self.nanos + dur.subsec_nanos();
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            let Some(s) = secs.checked_add(1) else {
                return Deadline::MAX;
            };
            secs = s;
        }
        Deadline { secs, nanos }
    }

    /// Moves the deadline earlier by `dur`, clamping at the smallest value.
    pub fn saturating_sub(self, dur: Duration) -> Deadline {
        let sub = i64::try_from(dur.as_secs()).unwrap_or(i64::MAX);
        let Some(mut secs) = self.secs.checked_sub(sub) else {
            return Deadline::MIN;
        };
        let nanos = if self.nanos >= dur.subsec_nanos() {
            self.nanos - dur.subsec_nanos()
        } else {
            let Some(s) = secs.checked_sub(1) else {
                return Deadline::MIN;
            };
            secs = s;
            self.nanos + NANOS_PER_SEC - dur.subsec_nanos()
        };
        Deadline { secs, nanos }
    }

    /// The latest representable deadline.
    pub const MAX: Deadline = Deadline {
        secs: i64::MAX,
        nanos: NANOS_PER_SEC - 1,
    };

    /// The earliest representable deadline.
    pub const MIN: Deadline = Deadline {
        secs: i64::MIN,
        nanos: 0,
    };
}

impl Default for Deadline {
    /// The Unix epoch.
    #[inline]
    fn default() -> Self {
        Deadline { secs: 0, nanos: 0 }
    }
}

impl From<SystemTime> for Deadline {
    #[inline]
    fn from(time: SystemTime) -> Self {
        Deadline::from_system_time(time)
    }
}

impl fmt::Debug for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deadline({}.{:09})", self.secs, self.nanos)
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::Deadline;

    #[test]
    fn rejects_out_of_range_nanos() {
        assert!(Deadline::new(0, 1_000_000_000).is_err());
        let d = Deadline::new(-3, 5).unwrap();
        assert_eq!((d.secs(), d.nanos()), (-3, 5));
    }

    #[test]
    fn add_and_sub_carry() {
        let d = Deadline::new(10, 900_000_000).unwrap();
        let later = d.saturating_add(Duration::from_millis(200));
        assert_eq!((later.secs(), later.nanos()), (11, 100_000_000));

        let earlier = later.saturating_sub(Duration::from_millis(300));
        assert_eq!((earlier.secs(), earlier.nanos()), (10, 800_000_000));

        assert_eq!(later.duration_since(d), Duration::from_millis(200));
        assert_eq!(d.duration_since(later), Duration::ZERO);
    }

    #[test]
    fn saturates_at_the_ends() {
        assert_eq!(Deadline::MAX.saturating_add(Duration::from_secs(1)), Deadline::MAX);
        assert_eq!(Deadline::MIN.saturating_sub(Duration::from_secs(1)), Deadline::MIN);
    }

    #[test]
    fn before_epoch() {
        let t = UNIX_EPOCH - Duration::from_millis(1500);
        let d = Deadline::from_system_time(t);
        assert_eq!((d.secs(), d.nanos()), (-2, 500_000_000));
    }

    #[test]
    fn past_and_future() {
        assert!(Deadline::before(Duration::from_millis(50)).has_passed());
        assert_eq!(Deadline::before(Duration::from_secs(1)).remaining(), Duration::ZERO);

        let future = Deadline::after(Duration::from_secs(60));
        assert!(!future.has_passed());
        assert!(future.remaining() > Duration::from_secs(50));

        let now = Deadline::from(SystemTime::now());
        assert!(now.secs() > 0);
    }
}
