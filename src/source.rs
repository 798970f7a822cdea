//! The event source shared by every adapter
//!
//! An [`EventSource`] owns one kernel file descriptor and a FIFO of records
//! that were decoded but not yet handed out. All the adapters in this crate
//! are an `EventSource` parameterized with a [`Source`], which contributes
//! only the record decoder and a hint about how to size reads.

use std::{
    collections::VecDeque,
    fmt,
    hash::{Hash, Hasher},
    os::unix::io::RawFd,
    time::Duration,
};

use log::{
    debug,
    trace,
    warn,
};

use crate::error::{Error, Result};
use crate::sys;


/// Decodes the records of one kind of kernel event source
pub trait Source {
    /// A single decoded record
    type Event;

    /// Short name, used in log messages and `Debug` output
    const NAME: &'static str;

    /// Size of the single read performed per refill
    ///
    /// `None` means the descriptor can report its buffered byte count via
    /// `FIONREAD`, and exactly that many bytes are read. Sources that can't
    /// answer `FIONREAD` give a fixed size instead.
    const READ_SIZE: Option<usize> = None;

    /// Decodes everything in `buffer`
    ///
    /// `buffer` holds the bytes returned by exactly one `read`. It has to be
    /// consumed completely; a trailing fragment is a protocol fault.
    fn decode(&self, buffer: &[u8]) -> Result<Vec<Self::Event>>;
}

/// The kernel operations an [`EventSource`] performs on its descriptor
pub trait FdIo {
    /// Number of bytes that can be read without blocking (`FIONREAD`)
    fn bytes_available(&self, fd: RawFd) -> Result<usize>;

    /// A single `read(2)`
    fn read(&self, fd: RawFd, buffer: &mut [u8]) -> Result<usize>;

    /// Waits until `fd` is readable; `false` if `timeout` elapsed first
    fn poll_readable(&self, fd: RawFd, timeout: Option<Duration>)
        -> Result<bool>;

    /// `close(2)`
    fn close(&self, fd: RawFd) -> Result<()>;

    /// Toggles `O_NONBLOCK`
    fn set_nonblocking(&self, fd: RawFd, nonblocking: bool) -> Result<()>;
}

/// [`FdIo`] implementation that talks to the kernel
#[derive(Clone, Copy, Debug, Default)]
pub struct Kernel;

impl FdIo for Kernel {
    fn bytes_available(&self, fd: RawFd) -> Result<usize> {
        sys::fionread(fd)
    }

    fn read(&self, fd: RawFd, buffer: &mut [u8]) -> Result<usize> {
        sys::read(fd, buffer)
    }

    fn poll_readable(&self, fd: RawFd, timeout: Option<Duration>)
        -> Result<bool>
    {
        sys::poll_readable(fd, timeout)
    }

    fn close(&self, fd: RawFd) -> Result<()> {
        sys::close(fd)
    }

    fn set_nonblocking(&self, fd: RawFd, nonblocking: bool) -> Result<()> {
        sys::set_nonblocking(fd, nonblocking)
    }
}


/// A kernel event source with an internal event buffer
///
/// Created by the `open` functions of the adapters, for example
/// [`Inotify::open`] or [`Timerfd::open`]. The descriptor is owned
/// exclusively and closed exactly once, either by [`EventSource::close`] or
/// on drop.
///
/// Whether reads block is decided by the `NONBLOCK` flag passed at open time
/// and can be changed with [`EventSource::set_nonblocking`]. An
/// `EventSource` is meant to be used by one thread at a time.
///
/// # Examples
///
/// ```
/// use fdevents::{Eventfd, EventfdFlags};
///
/// let mut counter = Eventfd::open(0, EventfdFlags::NONBLOCK)
///     .expect("Failed to open eventfd");
///
/// counter.increment(3).expect("Failed to increment");
/// assert_eq!(counter.read_event().expect("Failed to read"), Some(3));
/// assert_eq!(counter.read_event().expect("Failed to read"), None);
/// ```
///
/// [`Inotify::open`]: crate::Inotify::open
/// [`Timerfd::open`]: crate::Timerfd::open
pub struct EventSource<S: Source, I: FdIo = Kernel> {
    fd      : Option<RawFd>,
    pending : VecDeque<S::Event>,
    blocking: bool,
    source  : S,
    io      : I,
}

impl<S: Source> EventSource<S> {
    pub(crate) fn from_raw(fd: RawFd, blocking: bool, source: S) -> Self {
        // The adapters pass descriptors they just created
        unsafe { EventSource::with_io(fd, blocking, source, Kernel) }
    }
}

impl<S: Source, I: FdIo> EventSource<S, I> {
    /// Wraps `fd`, performing all kernel operations through `io`
    ///
    /// The adapters' `open` functions are the usual way to get an
    /// `EventSource`. This is for decoding a descriptor type of your own, or
    /// for running a [`Source`] against a scripted [`FdIo`].
    ///
    /// # Safety
    ///
    /// `fd` must be open and exclusively owned by the returned value, as far
    /// as `io` treats it as a real descriptor. It is closed through `io` on
    /// [`EventSource::close`] or drop.
    pub unsafe fn with_io(fd: RawFd, blocking: bool, source: S, io: I) -> Self {
        debug!("opened {} fd {} (blocking: {})", S::NAME, fd, blocking);

        EventSource {
            fd      : Some(fd),
            pending : VecDeque::new(),
            blocking,
            source,
            io,
        }
    }

    /// Returns the raw file descriptor
    ///
    /// Fails with [`ErrorKind::Closed`] once the source has been closed.
    ///
    /// [`ErrorKind::Closed`]: crate::ErrorKind::Closed
    pub fn fileno(&self) -> Result<RawFd> {
        self.fd.ok_or_else(|| Error::closed("fileno"))
    }

    /// Whether [`EventSource::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.fd.is_none()
    }

    /// Whether reads suspend the calling thread when nothing is available
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Closes the file descriptor
    ///
    /// Any buffered events are dropped. Calling this a second time fails
    /// with [`ErrorKind::Closed`] and doesn't touch the descriptor number
    /// again, since the OS may have handed it out to someone else by then.
    ///
    /// [`ErrorKind::Closed`]: crate::ErrorKind::Closed
    pub fn close(&mut self) -> Result<()> {
        let fd = self.fd.take().ok_or_else(|| Error::closed("close"))?;
        debug!("closing {} fd {}", S::NAME, fd);

        self.pending.clear();
        self.io.close(fd)
    }

    /// Returns one event
    ///
    /// Hands out buffered events first, in the order the kernel produced
    /// them. If the buffer is empty, performs one refill. In blocking mode,
    /// this waits until an event arrives; in non-blocking mode, `None` is
    /// returned if there is nothing to read. A blocking source only returns
    /// `None` if its read hit end of file.
    pub fn read_event(&mut self) -> Result<Option<S::Event>> {
        self.fileno()?;

        if self.pending.is_empty() {
            self.refill()?;
        }

        Ok(self.pending.pop_front())
    }

    /// Returns all buffered events, or the result of one refill
    ///
    /// Never performs more than one kernel read. In non-blocking mode, an
    /// empty `Vec` means nothing was available.
    pub fn read_events(&mut self) -> Result<Vec<S::Event>> {
        self.fileno()?;

        if self.pending.is_empty() {
            self.refill()?;
        }

        Ok(self.pending.drain(..).collect())
    }

    /// Waits until the descriptor is readable, then returns one event
    ///
    /// Buffered events are returned right away. Otherwise this suspends in
    /// `poll(2)` until the descriptor becomes readable or `timeout` elapses,
    /// in which case `None` is returned. No data is consumed on timeout.
    pub fn wait(&mut self, timeout: Option<Duration>) -> Result<Option<S::Event>> {
        let fd = self.fileno()?;

        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        if !self.io.poll_readable(fd, timeout)? {
            return Ok(None);
        }

        self.read_event()
    }

    /// Iterates over events, waiting for each one
    ///
    /// The iterator never ends on its own. It stops once the source is
    /// closed, or if a read hits end of file.
    pub fn iter(&mut self) -> Iter<'_, S, I> {
        Iter { source: self }
    }

    /// Discards all buffered events
    ///
    /// Useful to resynchronize with the kernel after falling behind. Events
    /// still queued inside the kernel are unaffected.
    pub fn truncate(&mut self) {
        self.pending.clear();
    }

    /// Number of events decoded but not handed out yet
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Switches between blocking and non-blocking reads
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        let fd = self.fileno()?;
        self.io.set_nonblocking(fd, nonblocking)?;
        self.blocking = !nonblocking;
        Ok(())
    }

    /// Controls whether the descriptor survives `execve(2)`
    ///
    /// All sources are opened with close-on-exec set.
    pub fn set_cloexec(&self, cloexec: bool) -> Result<()> {
        sys::set_cloexec(self.fileno()?, cloexec)
    }

    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    pub(crate) fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub(crate) fn pop_pending(&mut self) -> Option<S::Event> {
        self.pending.pop_front()
    }

    pub(crate) fn unread(&mut self, event: S::Event) {
        self.pending.push_front(event);
    }

    #[cfg(test)]
    pub(crate) fn io(&self) -> &I {
        &self.io
    }

    /// One refill cycle: at most one read, everything decoded gets buffered
    ///
    /// Returns the number of records added.
    pub(crate) fn refill(&mut self) -> Result<usize> {
        let fd = self.fileno()?;

        let len = match S::READ_SIZE {
            Some(size) => {
                if !self.blocking
                    && !self.io.poll_readable(fd, Some(Duration::ZERO))?
                {
                    return Ok(0);
                }
                size
            }
            None => {
                let mut len = self.io.bytes_available(fd)?;
                if len == 0 {
                    if !self.blocking {
                        return Ok(0);
                    }

                    // The byte count can lag behind the kernel's queue. A
                    // zero-length read waits until an event is queued and then
                    // fails with `EINVAL`, as the event doesn't fit; after that,
                    // the count is accurate.
                    self.read_nothing(fd)?;
                    len = self.io.bytes_available(fd)?;
                }
                len
            }
        };

        if len == 0 {
            return Ok(0);
        }

        let mut buffer = vec![0; len];
        let num_bytes = self.io.read(fd, &mut buffer)?;
        if num_bytes == 0 {
            trace!("{} fd {}: read returned 0 bytes", S::NAME, fd);
            return Ok(0);
        }

        let events = self.source.decode(&buffer[..num_bytes])?;
        trace!(
            "{} fd {}: decoded {} events from {} bytes",
            S::NAME, fd, events.len(), num_bytes,
        );

        let count = events.len();
        self.pending.extend(events);

        Ok(count)
    }

    fn read_nothing(&self, fd: RawFd) -> Result<()> {
        match self.io.read(fd, &mut []) {
            Ok(_) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => {
                debug!("{} fd {}: event arrived during zero-length read", S::NAME, fd);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl<S: Source, I: FdIo> Drop for EventSource<S, I> {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            if let Err(err) = self.io.close(fd) {
                warn!("failed to close {} fd {}: {}", S::NAME, fd, err);
            }
        }
    }
}

impl<S: Source, I: FdIo> fmt::Debug for EventSource<S, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("kind", &S::NAME)
            .field("fd", &self.fd)
            .field("blocking", &self.blocking)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Sources of one kind are equal if they wrap the same descriptor
impl<S: Source, I: FdIo> PartialEq for EventSource<S, I> {
    fn eq(&self, other: &Self) -> bool {
        self.fd == other.fd
    }
}

impl<S: Source, I: FdIo> Eq for EventSource<S, I> {}

impl<S: Source, I: FdIo> Hash for EventSource<S, I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        S::NAME.hash(state);
        self.fd.hash(state);
    }
}

impl<'a, S: Source, I: FdIo> IntoIterator for &'a mut EventSource<S, I> {
    type Item     = Result<S::Event>;
    type IntoIter = Iter<'a, S, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}


/// Unbounded iterator over the events of an [`EventSource`]
///
/// Returned by [`EventSource::iter`].
#[derive(Debug)]
pub struct Iter<'a, S: Source, I: FdIo = Kernel> {
    source: &'a mut EventSource<S, I>,
}

impl<'a, S: Source, I: FdIo> Iterator for Iter<'a, S, I> {
    type Item = Result<S::Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.source.is_closed() {
                return None;
            }

            // Without a timeout, `None` means end of file
            return self.source.wait(None).transpose();
        }
    }
}
