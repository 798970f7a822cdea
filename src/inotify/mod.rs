//! File system events via inotify
//!
//! [`Inotify`] watches paths and reports [`Event`]s for them. Start with
//! [`Inotify::open`], then add watches with [`Inotify::watch`] and read
//! events with the methods shared by every [`EventSource`].
//!
//! [`EventSource`]: crate::EventSource

mod events;
mod watches;

use std::{
    ffi::CString,
    os::{
        raw::c_int,
        unix::ffi::OsStrExt,
    },
    path::Path,
};

use inotify_sys as ffi;
use log::debug;

use crate::{
    error::{Error, ErrorKind, Result},
    source::{EventSource, Source},
    sys,
};

pub use self::events::{
    Event,
    EventKind,
    EventMask,
};
pub use self::watches::{
    WatchDescriptor,
    WatchMask,
};


bitflags! {
    /// Flags for [`Inotify::open`]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct InitFlags: c_int {
        /// Don't suspend when no event is available
        const NONBLOCK = ffi::IN_NONBLOCK;

        /// Close the descriptor on `execve(2)`
        ///
        /// Always added by [`Inotify::open`].
        const CLOEXEC = ffi::IN_CLOEXEC;
    }
}


/// Decodes packed `inotify_event` records
#[derive(Debug, Default)]
pub struct InotifySource;

impl Source for InotifySource {
    type Event = Event;

    const NAME: &'static str = "inotify";

    fn decode(&self, buffer: &[u8]) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut pos    = 0;

        while pos < buffer.len() {
            let (step, event) = Event::from_buffer(&buffer[pos..])?;
            pos += step;
            events.push(event);
        }

        Ok(events)
    }
}

/// An inotify instance
pub type Inotify = EventSource<InotifySource>;

impl Inotify {
    /// Creates an inotify instance
    ///
    /// Close-on-exec is always set. Pass [`InitFlags::NONBLOCK`] to make
    /// reads return instead of suspending when there are no events.
    ///
    /// # Examples
    ///
    /// ```
    /// use fdevents::{inotify::InitFlags, Inotify};
    ///
    /// let inotify = Inotify::open(InitFlags::NONBLOCK)
    ///     .expect("Failed to initialize an inotify instance");
    /// ```
    pub fn open(flags: InitFlags) -> Result<Self> {
        let fd = sys::inotify_init1((flags | InitFlags::CLOEXEC).bits())?;
        let blocking = !flags.contains(InitFlags::NONBLOCK);

        Ok(EventSource::from_raw(fd, blocking, InotifySource))
    }

    /// Adds or updates a watch for the given path
    ///
    /// Returns a watch descriptor that identifies the watch in events and
    /// can be passed to [`Inotify::unwatch`]. Watching a path again, or
    /// another path that links to the same inode, updates the existing watch
    /// and returns the same descriptor.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::NotFound`] if the path doesn't exist,
    /// [`ErrorKind::ResourceExhausted`] once the per-user watch limit is
    /// reached, and the other kinds of `inotify_add_watch(2)`.
    pub fn watch<P>(&mut self, path: P, mask: WatchMask)
        -> Result<WatchDescriptor>
        where P: AsRef<Path>
    {
        let fd   = self.fileno()?;
        let path = path.as_ref();
        let cpath = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::new(ErrorKind::InvalidArgument, "inotify_add_watch"))?;

        let wd = sys::inotify_add_watch(fd, &cpath, mask.bits())?;
        debug!("inotify fd {}: watching {} as {} ({:?})", fd, path.display(), wd, mask);

        Ok(WatchDescriptor(wd))
    }

    /// Stops watching a file
    ///
    /// The kernel queues an [`EventMask::IGNORED`] event for the removed
    /// watch.
    pub fn unwatch(&mut self, wd: WatchDescriptor) -> Result<()> {
        let fd = self.fileno()?;
        sys::inotify_rm_watch(fd, wd.0)?;
        debug!("inotify fd {}: removed watch {}", fd, wd.0);
        Ok(())
    }
}


/// Waits for a single event on `path`
///
/// Opens a blocking inotify instance, watches `path`, returns the first
/// event and closes the instance again.
pub fn watch_once<P>(path: P, mask: WatchMask) -> Result<Event>
    where P: AsRef<Path>
{
    let mut inotify = Inotify::open(InitFlags::empty())?;
    inotify.watch(path, mask)?;

    let event = inotify.read_event()?
        .ok_or_else(|| Error::new(ErrorKind::Unexpected, "inotify read"))?;

    inotify.close()?;
    Ok(event)
}
