use std::os::raw::c_int;

use inotify_sys as ffi;


bitflags! {
    /// Describes a file system watch
    ///
    /// Passed to [`Inotify::watch`], to describe what file system events to
    /// watch for, and how to do that.
    ///
    /// # Examples
    ///
    /// `WatchMask` constants can be combined. Here we add a watch that is
    /// triggered both when files are created or deleted in a directory:
    ///
    /// ``` rust
    /// # use fdevents::{
    /// #     inotify::{InitFlags, WatchMask},
    /// #     Inotify,
    /// # };
    /// #
    /// # let mut inotify = Inotify::open(InitFlags::empty()).unwrap();
    /// inotify.watch("/tmp/", WatchMask::CREATE | WatchMask::DELETE)
    ///    .expect("Error adding watch");
    /// ```
    ///
    /// [`Inotify::watch`]: crate::Inotify::watch
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    pub struct WatchMask: u32 {
        /// File was accessed
        ///
        /// When watching a directory, this event is only triggered for objects
        /// inside the directory, not the directory itself.
        const ACCESS = ffi::IN_ACCESS;

        /// Metadata (permissions, timestamps, ...) changed
        const ATTRIB = ffi::IN_ATTRIB;

        /// File opened for writing was closed
        const CLOSE_WRITE = ffi::IN_CLOSE_WRITE;

        /// File or directory not opened for writing was closed
        const CLOSE_NOWRITE = ffi::IN_CLOSE_NOWRITE;

        /// File/directory created in watched directory
        const CREATE = ffi::IN_CREATE;

        /// File/directory deleted from watched directory
        const DELETE = ffi::IN_DELETE;

        /// Watched file/directory was deleted
        const DELETE_SELF = ffi::IN_DELETE_SELF;

        /// File was modified
        const MODIFY = ffi::IN_MODIFY;

        /// Watched file/directory was moved
        const MOVE_SELF = ffi::IN_MOVE_SELF;

        /// File was renamed/moved; watched directory contained old name
        const MOVED_FROM = ffi::IN_MOVED_FROM;

        /// File was renamed/moved; watched directory contains new name
        const MOVED_TO = ffi::IN_MOVED_TO;

        /// File or directory was opened
        const OPEN = ffi::IN_OPEN;

        /// Watch for all events
        ///
        /// Combination of every event constant above.
        const ALL_EVENTS = ffi::IN_ALL_EVENTS;

        /// [`MOVED_FROM`](Self::MOVED_FROM) and [`MOVED_TO`](Self::MOVED_TO)
        const MOVE = ffi::IN_MOVE;

        /// [`CLOSE_WRITE`](Self::CLOSE_WRITE) and
        /// [`CLOSE_NOWRITE`](Self::CLOSE_NOWRITE)
        const CLOSE = ffi::IN_CLOSE;

        /// Don't dereference the path if it is a symbolic link
        const DONT_FOLLOW = ffi::IN_DONT_FOLLOW;

        /// Filter events for directory entries that have been unlinked
        const EXCL_UNLINK = ffi::IN_EXCL_UNLINK;

        /// If a watch for the inode exists, amend it instead of replacing it
        const MASK_ADD = ffi::IN_MASK_ADD;

        /// Only receive one event, then remove the watch
        const ONESHOT = ffi::IN_ONESHOT;

        /// Only watch path, if it is a directory
        const ONLYDIR = ffi::IN_ONLYDIR;
    }
}


/// Represents a watch on an inode
///
/// Returned by [`Inotify::watch`] and carried by every [`Event`]. Pass it to
/// [`Inotify::unwatch`] to stop watching.
///
/// Watch descriptors are only meaningful for the inotify instance that
/// created them.
///
/// [`Inotify::watch`]: crate::Inotify::watch
/// [`Inotify::unwatch`]: crate::Inotify::unwatch
/// [`Event`]: super::Event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchDescriptor(pub(crate) c_int);

impl WatchDescriptor {
    /// The raw id the kernel assigned to this watch
    pub fn id(&self) -> c_int {
        self.0
    }
}
