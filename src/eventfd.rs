//! A kernel-side counter for event notification
//!
//! Writing to an [`Eventfd`] adds to its counter; reading returns the counter
//! and resets it to zero. In semaphore mode, each read returns `1` and
//! decrements the counter instead.

use std::{
    mem,
    os::raw::c_int,
};

use log::trace;

use crate::{
    error::{Error, Result},
    source::{EventSource, Source},
    sys,
};


bitflags! {
    /// Flags for [`Eventfd::open`]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct EventfdFlags: c_int {
        /// Don't suspend when the counter is zero
        const NONBLOCK = libc::EFD_NONBLOCK;

        /// Read decrements the counter by one instead of resetting it
        const SEMAPHORE = libc::EFD_SEMAPHORE;

        /// Close the descriptor on `execve(2)`; always added by
        /// [`Eventfd::open`]
        const CLOEXEC = libc::EFD_CLOEXEC;
    }
}


/// Decodes the 8-byte counter value
#[derive(Debug, Default)]
pub struct EventfdSource;

impl Source for EventfdSource {
    type Event = u64;

    const NAME: &'static str = "eventfd";
    const READ_SIZE: Option<usize> = Some(mem::size_of::<u64>());

    fn decode(&self, buffer: &[u8]) -> Result<Vec<u64>> {
        decode_counters(buffer, "eventfd counter")
    }
}

/// Decodes native-endian `u64` counters, as read from eventfd and timerfd
pub(crate) fn decode_counters(buffer: &[u8], op: &'static str)
    -> Result<Vec<u64>>
{
    let chunks = buffer.chunks_exact(mem::size_of::<u64>());
    if !chunks.remainder().is_empty() {
        return Err(Error::protocol(op));
    }

    Ok(chunks
        .map(|chunk| {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(chunk);
            u64::from_ne_bytes(bytes)
        })
        .collect())
}

/// An eventfd counter
pub type Eventfd = EventSource<EventfdSource>;

impl Eventfd {
    /// Creates an eventfd with the counter set to `initval`
    pub fn open(initval: u32, flags: EventfdFlags) -> Result<Self> {
        let fd = sys::eventfd(initval, (flags | EventfdFlags::CLOEXEC).bits())?;
        let blocking = !flags.contains(EventfdFlags::NONBLOCK);

        Ok(EventSource::from_raw(fd, blocking, EventfdSource))
    }

    /// Adds `value` to the counter
    ///
    /// Fails with [`ErrorKind::ResourceExhausted`] on a non-blocking eventfd
    /// if the counter would overflow.
    ///
    /// [`ErrorKind::ResourceExhausted`]: crate::ErrorKind::ResourceExhausted
    pub fn increment(&mut self, value: u64) -> Result<()> {
        let fd = self.fileno()?;

        let written = sys::write(fd, &value.to_ne_bytes())?;
        if written != mem::size_of::<u64>() {
            return Err(Error::protocol("eventfd write"));
        }

        trace!("eventfd fd {}: incremented by {}", fd, value);
        Ok(())
    }

    /// Reads the counter
    ///
    /// Same as [`EventSource::read_event`]: blocks while the counter is zero,
    /// unless the eventfd is non-blocking, in which case `None` is returned.
    pub fn read(&mut self) -> Result<Option<u64>> {
        self.read_event()
    }
}
