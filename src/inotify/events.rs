use std::{
    ffi::{OsStr, OsString},
    mem,
    os::unix::ffi::OsStrExt,
};

use inotify_sys as ffi;

use crate::error::{Error, ErrorKind, Result};

use super::WatchDescriptor;


/// An inotify event
///
/// A file system event that describes a change that the user previously
/// registered interest in via [`Inotify::watch`].
///
/// [`Inotify::watch`]: crate::Inotify::watch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    /// Identifies the watch this event originates from
    ///
    /// Equal to the [`WatchDescriptor`] that [`Inotify::watch`] returned when
    /// interest for this event was registered.
    ///
    /// [`Inotify::watch`]: crate::Inotify::watch
    pub wd: WatchDescriptor,

    /// Indicates what kind of event this is
    pub mask: EventMask,

    /// Connects related events to each other
    ///
    /// When a file is renamed, this results in two events: [`MOVED_FROM`]
    /// and [`MOVED_TO`]. The `cookie` field will be the same for both of
    /// them, thereby making it possible to connect the event pair.
    ///
    /// [`MOVED_FROM`]: EventMask::MOVED_FROM
    /// [`MOVED_TO`]: EventMask::MOVED_TO
    pub cookie: u32,

    /// The name of the file the event originates from
    ///
    /// Only set if the subject of the event is a file or directory inside a
    /// watched directory. Empty if the event concerns a watched file or
    /// directory itself.
    pub name: OsString,
}

impl Event {
    /// Decodes the event at the beginning of `buffer`
    ///
    /// Returns the number of bytes used from the buffer, and the event.
    /// Fails if the buffer doesn't hold a full event, including its name.
    pub(crate) fn from_buffer(buffer: &[u8]) -> Result<(usize, Self)> {
        let event_size = mem::size_of::<ffi::inotify_event>();

        if buffer.len() < event_size {
            return Err(Error::protocol("inotify event header"));
        }

        // The byte buffer has alignment 1, while `inotify_event` has a higher
        // alignment, so the header has to be read unaligned.
        let ffi_event = unsafe {
            (buffer.as_ptr() as *const ffi::inotify_event).read_unaligned()
        };

        let bytes_consumed = event_size + ffi_event.len as usize;
        if buffer.len() < bytes_consumed {
            return Err(Error::protocol("inotify event name"));
        }

        // The name is padded with '\0' up to the alignment boundary
        let name = &buffer[event_size..bytes_consumed];
        let name = match name.iter().position(|b| *b == 0) {
            Some(end) => &name[..end],
            None      => name,
        };

        let event = Event {
            wd    : WatchDescriptor(ffi_event.wd),
            mask  : EventMask::from_bits_retain(ffi_event.mask),
            cookie: ffi_event.cookie,
            name  : OsStr::from_bytes(name).to_os_string(),
        };

        Ok((bytes_consumed, event))
    }

    /// The name of the file the event originates from, if there is one
    pub fn name(&self) -> Option<&OsStr> {
        if self.name.is_empty() {
            None
        }
        else {
            Some(&self.name)
        }
    }

    /// The subject of the event is a directory
    pub fn is_dir(&self) -> bool {
        self.mask.contains(EventMask::ISDIR)
    }

    /// File or directory was created in a watched directory
    pub fn is_create(&self) -> bool {
        self.mask.contains(EventMask::CREATE)
    }

    /// File or directory was deleted from a watched directory
    pub fn is_delete(&self) -> bool {
        self.mask.contains(EventMask::DELETE)
    }

    /// File was modified
    pub fn is_modify(&self) -> bool {
        self.mask.contains(EventMask::MODIFY)
    }

    /// File was closed, after writing or not
    pub fn is_close(&self) -> bool {
        self.mask.intersects(EventMask::CLOSE_WRITE | EventMask::CLOSE_NOWRITE)
    }

    /// Either half of a rename; pair them up via `cookie`
    pub fn is_move(&self) -> bool {
        self.mask.intersects(EventMask::MOVED_FROM | EventMask::MOVED_TO)
    }

    /// The watch was removed, explicitly or because its target went away
    pub fn is_ignored(&self) -> bool {
        self.mask.contains(EventMask::IGNORED)
    }

    /// The kernel's event queue overflowed and events were lost
    pub fn is_overflow(&self) -> bool {
        self.mask.contains(EventMask::Q_OVERFLOW)
    }
}


bitflags! {
    /// Indicates the type of an event
    ///
    /// This struct can be retrieved from an [`Event`] via its `mask` field.
    /// You can determine the [`Event`]'s type by comparing the `EventMask` to
    /// its associated constants, or by calling [`EventMask::kind`].
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    pub struct EventMask: u32 {
        /// File was accessed
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

        /// Watch was removed
        ///
        /// Generated if the watch was removed explicitly (via
        /// [`Inotify::unwatch`]), or automatically (because the file was
        /// deleted or the file system was unmounted).
        ///
        /// [`Inotify::unwatch`]: crate::Inotify::unwatch
        const IGNORED = ffi::IN_IGNORED;

        /// The subject of the event is a directory
        const ISDIR = ffi::IN_ISDIR;

        /// Event queue overflowed
        ///
        /// The event queue has overflowed and events have presumably been
        /// lost.
        const Q_OVERFLOW = ffi::IN_Q_OVERFLOW;

        /// File system containing watched object was unmounted
        ///
        /// An event with [`EventMask::IGNORED`] will subsequently be
        /// generated for the same watch descriptor.
        const UNMOUNT = ffi::IN_UNMOUNT;
    }
}

impl EventMask {
    /// Classifies the event
    ///
    /// Returns `None` for masks that carry no event type, like
    /// [`IGNORED`](Self::IGNORED) or [`Q_OVERFLOW`](Self::Q_OVERFLOW) on
    /// their own. More than one event type bit is a protocol fault.
    pub fn kind(self) -> Result<Option<EventKind>> {
        let mut kinds = EventKind::BITFLAG_ENUM_MAP
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, kind)| *kind);

        let kind = kinds.next();
        if kinds.next().is_some() {
            return Err(Error::new(ErrorKind::Protocol, "inotify event mask"));
        }

        Ok(kind)
    }
}


/// The type of an inotify event
///
/// At most one of these is set in an event mask read from an inotify fd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// File was accessed (e.g., `read(2)`, `execve(2)`)
    Access,

    /// Metadata changed: permissions, timestamps, extended attributes, link
    /// count or user/group ID
    Attrib,

    /// File opened for writing was closed
    CloseWrite,

    /// File or directory not opened for writing was closed
    CloseNowrite,

    /// File/directory created in watched directory
    Create,

    /// File/directory deleted from watched directory
    Delete,

    /// Watched file/directory was itself deleted
    DeleteSelf,

    /// File was modified (e.g., `write(2)`, `truncate(2)`)
    Modify,

    /// Watched file/directory was itself moved
    MoveSelf,

    /// Generated for the directory containing the old filename when a file is
    /// renamed
    MovedFrom,

    /// Generated for the directory containing the new filename when a file is
    /// renamed
    MovedTo,

    /// File or directory was opened
    Open,
}

impl EventKind {
    const BITFLAG_ENUM_MAP: &'static [(EventMask, EventKind)] = &[
        (EventMask::ACCESS,        EventKind::Access),
        (EventMask::ATTRIB,        EventKind::Attrib),
        (EventMask::CLOSE_WRITE,   EventKind::CloseWrite),
        (EventMask::CLOSE_NOWRITE, EventKind::CloseNowrite),
        (EventMask::CREATE,        EventKind::Create),
        (EventMask::DELETE,        EventKind::Delete),
        (EventMask::DELETE_SELF,   EventKind::DeleteSelf),
        (EventMask::MODIFY,        EventKind::Modify),
        (EventMask::MOVE_SELF,     EventKind::MoveSelf),
        (EventMask::MOVED_FROM,    EventKind::MovedFrom),
        (EventMask::MOVED_TO,      EventKind::MovedTo),
        (EventMask::OPEN,          EventKind::Open),
    ];
}


#[cfg(test)]
mod tests {
    use std::{
        io::prelude::*,
        mem,
        slice,
    };

    use inotify_sys as ffi;

    use crate::ErrorKind;

    use super::{Event, EventKind, EventMask};

    fn write_event(buffer: &mut Vec<u8>, wd: i32, mask: u32, name: &[u8]) {
        // Names are NUL-padded to a multiple of the header alignment
        let len = if name.is_empty() { 0 } else { (name.len() + 1 + 15) / 16 * 16 };

        let event = ffi::inotify_event {
            wd,
            mask,
            cookie: 7,
            len: len as u32,
        };
        let event = unsafe {
            slice::from_raw_parts(
                &event as *const _ as *const u8,
                mem::size_of_val(&event),
            )
        };

        buffer.write_all(event).expect("Failed to write into buffer");
        buffer.write_all(name).expect("Failed to write into buffer");
        buffer.resize(buffer.len() + len - name.len(), 0);
    }

    #[test]
    fn from_buffer_decodes_two_packed_events_in_order() {
        let mut buffer = Vec::new();
        write_event(&mut buffer, 1, ffi::IN_CREATE, b"foo");
        write_event(&mut buffer, 2, ffi::IN_DELETE_SELF, b"");

        let (step, first) = Event::from_buffer(&buffer).unwrap();
        let (rest, second) = Event::from_buffer(&buffer[step..]).unwrap();

        assert_eq!(step + rest, buffer.len());
        assert_eq!(first.wd.id(), 1);
        assert_eq!(first.name, "foo");
        assert!(first.is_create());
        assert_eq!(first.cookie, 7);
        assert_eq!(second.wd.id(), 2);
        assert_eq!(second.name, "");
        assert_eq!(second.name(), None);
    }

    #[test]
    fn from_buffer_should_not_mistake_next_event_for_name_of_previous_event() {
        let mut buffer = Vec::new();
        write_event(&mut buffer, 0, 0, b"");

        // Simulate an event after that, starting with a non-zero byte
        buffer.push(1);

        let (_, event) = Event::from_buffer(&buffer).unwrap();
        assert_eq!(event.name(), None);
    }

    #[test]
    fn from_buffer_rejects_truncated_records() {
        let mut buffer = Vec::new();
        write_event(&mut buffer, 1, ffi::IN_CREATE, b"foo");

        let header = mem::size_of::<ffi::inotify_event>();
        for len in [header - 1, header + 3] {
            let err = Event::from_buffer(&buffer[..len]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol);
        }
    }

    #[test]
    fn classify_event_kinds() {
        for (flag, kind) in EventKind::BITFLAG_ENUM_MAP {
            assert_eq!(flag.kind().unwrap(), Some(*kind));
            assert_eq!((*flag | EventMask::ISDIR).kind().unwrap(), Some(*kind));
        }

        assert_eq!(EventMask::IGNORED.kind().unwrap(), None);
        assert_eq!(EventMask::Q_OVERFLOW.kind().unwrap(), None);

        let mask = EventMask::ATTRIB | EventMask::ACCESS;
        assert_eq!(mask.kind().unwrap_err().kind(), ErrorKind::Protocol);
    }
}
