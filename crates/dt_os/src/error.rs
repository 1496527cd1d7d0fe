use thiserror::Error;

// -----------------------------------------------------------------------------
// SyncError

/// The ways a synchronization call can fail.
///
/// Together with success this forms the closed result domain every operation
/// of this crate reports. See [`Status`] for the integer view.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncError {
    /// The platform call failed in an unexpected way.
    #[error("the underlying platform call failed")]
    Error,

    /// A non-blocking attempt found the resource held.
    #[error("the resource is held by another owner")]
    Busy,

    /// A bounded wait reached its deadline first.
    #[error("the deadline passed before the operation completed")]
    TimedOut,

    /// Memory or another platform resource was exhausted.
    #[error("out of memory")]
    NoMem,
}

/// Result of a synchronization call.
pub type SyncResult<T = ()> = Result<T, SyncError>;

impl SyncError {
    /// Returns the integer status of this error.
    #[inline]
    pub const fn status(self) -> Status {
        match self {
            SyncError::Error => Status::Error,
            SyncError::Busy => Status::Busy,
            SyncError::TimedOut => Status::TimedOut,
            SyncError::NoMem => Status::NoMem,
        }
    }
}

// -----------------------------------------------------------------------------
// Status

/// Integer status codes of the result contract.
///
/// `Success` is `0`; the failure codes are distinct and stable across
/// backends.
///
/// # Examples
///
/// ```
/// use dt_os::{Status, SyncError};
///
/// let res: Result<(), SyncError> = Err(SyncError::Busy);
/// assert_eq!(Status::of(&res), Status::Busy);
/// assert_eq!(Status::Busy.into_result(), Err(SyncError::Busy));
/// assert_eq!(Status::from_code(0), Some(Status::Success));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    Success = 0,
    Error = 1,
    Busy = 2,
    TimedOut = 3,
    NoMem = 4,
}

impl Status {
    /// Returns the status describing `res`.
    #[inline]
    pub fn of<T>(res: &SyncResult<T>) -> Status {
        match res {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }

    /// Returns the integer code.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Parses an integer code, `None` if it is outside the domain.
    pub const fn from_code(code: i32) -> Option<Status> {
        match code {
            0 => Some(Status::Success),
            1 => Some(Status::Error),
            2 => Some(Status::Busy),
            3 => Some(Status::TimedOut),
            4 => Some(Status::NoMem),
            _ => None,
        }
    }

    /// Converts back into a [`SyncResult`].
    #[inline]
    pub const fn into_result(self) -> SyncResult {
        match self {
            Status::Success => Ok(()),
            Status::Error => Err(SyncError::Error),
            Status::Busy => Err(SyncError::Busy),
            Status::TimedOut => Err(SyncError::TimedOut),
            Status::NoMem => Err(SyncError::NoMem),
        }
    }
}

impl<T> From<&SyncResult<T>> for Status {
    #[inline]
    fn from(res: &SyncResult<T>) -> Self {
        Status::of(res)
    }
}
