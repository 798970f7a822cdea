//! Timers that deliver their expirations through a file descriptor
//!
//! Each event read from a [`Timerfd`] is the number of times the timer
//! expired since the last read.

use std::{
    mem,
    os::raw::c_int,
    time::Duration,
};

use libc::{itimerspec, time_t, timespec};
use log::debug;

use crate::{
    error::{Error, ErrorKind, Result},
    eventfd::decode_counters,
    source::{EventSource, Source},
    sys,
};


const NANOS_PER_SEC: u32 = 1_000_000_000;


/// The clock a timer is measured against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Clock {
    /// Settable wall-clock time
    Realtime,

    /// Monotonic time that doesn't jump, and doesn't count suspend
    #[default]
    Monotonic,

    /// Like [`Clock::Monotonic`], but includes time spent suspended
    Boottime,
}

impl Clock {
    fn raw(self) -> c_int {
        match self {
            Clock::Realtime  => libc::CLOCK_REALTIME,
            Clock::Monotonic => libc::CLOCK_MONOTONIC,
            Clock::Boottime  => libc::CLOCK_BOOTTIME,
        }
    }
}


bitflags! {
    /// Flags for [`Timerfd::open`]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct TimerfdFlags: c_int {
        /// Don't suspend while the timer hasn't expired
        const NONBLOCK = libc::TFD_NONBLOCK;

        /// Close the descriptor on `execve(2)`; always added by
        /// [`Timerfd::open`]
        const CLOEXEC = libc::TFD_CLOEXEC;
    }
}


/// When a timer fires first, and how often it fires after that
///
/// A zero `offset` disarms the timer. A zero `period` makes it fire only
/// once. When read back via [`Timerfd::get_current`], `offset` is the time
/// left until the next expiration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TimerSpec {
    /// Time until the first expiration (or the absolute time of it)
    pub offset: Duration,

    /// Interval between expirations after the first one
    pub period: Duration,
}

impl TimerSpec {
    /// Fires once after `offset`
    pub fn one_off(offset: Duration) -> Self {
        TimerSpec {
            offset,
            period: Duration::ZERO,
        }
    }

    /// Fires every `period`, starting one `period` from now
    pub fn periodic(period: Duration) -> Self {
        TimerSpec {
            offset: period,
            period,
        }
    }

    /// Builds a spec from raw (seconds, nanoseconds) pairs
    ///
    /// Fails with [`ErrorKind::InvalidArgument`] if either nanosecond count
    /// is outside `0..=999_999_999`.
    pub fn from_parts(
        offset_secs : u64,
        offset_nanos: u32,
        period_secs : u64,
        period_nanos: u32,
    )
        -> Result<Self>
    {
        if offset_nanos >= NANOS_PER_SEC || period_nanos >= NANOS_PER_SEC {
            return Err(Error::new(ErrorKind::InvalidArgument, "timer spec"));
        }

        Ok(TimerSpec {
            offset: Duration::new(offset_secs, offset_nanos),
            period: Duration::new(period_secs, period_nanos),
        })
    }

    /// Whether a timer with this spec is armed
    pub fn is_enabled(&self) -> bool {
        !self.offset.is_zero()
    }

    /// Time until the next expiration, `None` if the timer is disarmed
    pub fn next_event(&self) -> Option<Duration> {
        if self.is_enabled() {
            Some(self.offset)
        }
        else {
            None
        }
    }

    fn to_raw(self) -> Result<itimerspec> {
        let mut raw = sys::zeroed_itimerspec();
        raw.it_value    = to_timespec(self.offset)?;
        raw.it_interval = to_timespec(self.period)?;
        Ok(raw)
    }

    fn from_raw(raw: &itimerspec) -> Self {
        TimerSpec {
            offset: from_timespec(&raw.it_value),
            period: from_timespec(&raw.it_interval),
        }
    }
}

fn to_timespec(duration: Duration) -> Result<timespec> {
    let secs = time_t::try_from(duration.as_secs())
        .map_err(|_| Error::new(ErrorKind::InvalidArgument, "timer spec"))?;

    // `timespec` has private padding fields on some targets
    let mut ts: timespec = unsafe { mem::zeroed() };
    ts.tv_sec  = secs;
    ts.tv_nsec = duration.subsec_nanos() as _;
    Ok(ts)
}

fn from_timespec(ts: &timespec) -> Duration {
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec.clamp(0, 999_999_999) as u32)
}


/// Decodes the 8-byte expiration count
#[derive(Debug)]
pub struct TimerfdSource {
    clock: Clock,
}

impl TimerfdSource {
    /// The clock the timer was created with
    pub fn clock(&self) -> Clock {
        self.clock
    }
}

impl Source for TimerfdSource {
    type Event = u64;

    const NAME: &'static str = "timerfd";
    const READ_SIZE: Option<usize> = Some(mem::size_of::<u64>());

    fn decode(&self, buffer: &[u8]) -> Result<Vec<u64>> {
        decode_counters(buffer, "timerfd expirations")
    }
}

/// A timer
///
/// Starts out disarmed.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fdevents::{timerfd::{Clock, TimerfdFlags}, Timerfd};
///
/// let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty())
///     .expect("Failed to create timer");
///
/// timer.set_one_off(Duration::from_millis(10), false)
///     .expect("Failed to arm timer");
/// assert_eq!(timer.read_event().expect("Failed to read timer"), Some(1));
/// ```
pub type Timerfd = EventSource<TimerfdSource>;

impl Timerfd {
    /// Creates a disarmed timer measured against `clock`
    pub fn open(clock: Clock, flags: TimerfdFlags) -> Result<Self> {
        let fd = sys::timerfd_create(clock.raw(), (flags | TimerfdFlags::CLOEXEC).bits())?;
        let blocking = !flags.contains(TimerfdFlags::NONBLOCK);

        Ok(EventSource::from_raw(fd, blocking, TimerfdSource { clock }))
    }

    /// Fires once, `offset` from now
    ///
    /// If `absolute` is set, `offset` is measured from the clock's epoch
    /// instead. A zero `offset` disarms the timer.
    pub fn set_one_off(&mut self, offset: Duration, absolute: bool) -> Result<()> {
        self.update(TimerSpec::one_off(offset), absolute)?;
        Ok(())
    }

    /// Fires every `period`
    ///
    /// The first expiration happens after `offset`, which defaults to
    /// `period`. An explicit zero `offset` with a non-zero `period` would
    /// leave the timer disarmed and is rejected with
    /// [`ErrorKind::InvalidArgument`].
    pub fn set_reoccuring(
        &mut self,
        period  : Duration,
        offset  : Option<Duration>,
        absolute: bool,
    )
        -> Result<()>
    {
        let offset = match offset {
            Some(offset) if offset.is_zero() && !period.is_zero() => {
                return Err(Error::new(ErrorKind::InvalidArgument, "timerfd_settime"));
            }
            Some(offset) => offset,
            None         => period,
        };

        self.update(TimerSpec { offset, period }, absolute)?;
        Ok(())
    }

    /// Disarms the timer
    pub fn disable(&mut self) -> Result<()> {
        self.update(TimerSpec::default(), false)?;
        Ok(())
    }

    /// Replaces the timer's setting, returning the previous one
    ///
    /// Zero values are passed on as zero, so a zero spec always disarms the
    /// timer, no matter what was set before.
    pub fn update(&mut self, spec: TimerSpec, absolute: bool) -> Result<TimerSpec> {
        let fd    = self.fileno()?;
        let flags = if absolute { libc::TFD_TIMER_ABSTIME } else { 0 };

        let old = sys::timerfd_settime(fd, flags, &spec.to_raw()?)?;
        debug!("timerfd fd {}: set to {:?} (absolute: {})", fd, spec, absolute);

        Ok(TimerSpec::from_raw(&old))
    }

    /// Reads the timer's current setting from the kernel
    pub fn get_current(&self) -> Result<TimerSpec> {
        let current = sys::timerfd_gettime(self.fileno()?)?;
        Ok(TimerSpec::from_raw(&current))
    }

    /// The clock the timer is measured against
    pub fn clock(&self) -> Clock {
        self.source().clock()
    }
}


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::ErrorKind;

    use super::TimerSpec;

    #[test]
    fn from_parts_validates_nanoseconds() {
        let spec = TimerSpec::from_parts(1, 999_999_999, 0, 500).unwrap();
        assert_eq!(spec.offset, Duration::new(1, 999_999_999));
        assert_eq!(spec.period, Duration::from_nanos(500));

        for (offset_nanos, period_nanos) in [(1_000_000_000, 0), (0, 1_000_000_000)] {
            let err = TimerSpec::from_parts(0, offset_nanos, 0, period_nanos)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn zero_offset_means_disarmed() {
        assert!(!TimerSpec::default().is_enabled());
        assert_eq!(TimerSpec::default().next_event(), None);

        let spec = TimerSpec::periodic(Duration::from_secs(2));
        assert!(spec.is_enabled());
        assert_eq!(spec.next_event(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn converts_to_and_from_itimerspec() {
        let spec = TimerSpec::from_parts(3, 25, 1, 7).unwrap();
        let raw  = spec.to_raw().unwrap();

        assert_eq!(raw.it_value.tv_sec, 3);
        assert_eq!(raw.it_value.tv_nsec, 25);
        assert_eq!(raw.it_interval.tv_sec, 1);
        assert_eq!(raw.it_interval.tv_nsec, 7);
        assert_eq!(TimerSpec::from_raw(&raw), spec);
    }

    #[test]
    fn oversized_duration_is_rejected() {
        let spec = TimerSpec::one_off(Duration::from_secs(u64::MAX));
        assert_eq!(spec.to_raw().unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
