//! File access notification and permission decisions via fanotify
//!
//! Unlike inotify, every fanotify event carries an open file descriptor for
//! the file that was touched, and can watch whole mounts or filesystems.
//! Opening a [`Fanotify`] instance requires `CAP_SYS_ADMIN`.

use std::{
    cell::OnceCell,
    ffi::CString,
    os::{
        raw::{c_int, c_uint},
        unix::{
            ffi::OsStrExt,
            io::{AsRawFd, FromRawFd, OwnedFd, RawFd},
        },
    },
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    error::{Error, ErrorKind, Result},
    source::{EventSource, Source},
    sys,
};


/// Size of `struct fanotify_event_metadata`
const METADATA_SIZE: usize = 24;

/// The metadata layout this crate understands
pub const METADATA_VERSION: u8 = 3;

/// Event file descriptor of records that don't refer to a file
const FAN_NOFD: i32 = -1;


bitflags! {
    /// Flags for [`Fanotify::open`]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct InitFlags: c_uint {
        /// Close the descriptor on `execve(2)`; always added by
        /// [`Fanotify::open`]
        const CLOEXEC = 0x0000_0001;

        /// Don't suspend when no event is available
        const NONBLOCK = 0x0000_0002;

        /// Notification only; the default class
        const CLASS_NOTIF = 0x0000_0000;

        /// Permission decisions, after the file content is final
        const CLASS_CONTENT = 0x0000_0004;

        /// Permission decisions, before the file content is final
        const CLASS_PRE_CONTENT = 0x0000_0008;

        /// No limit on the event queue length
        const UNLIMITED_QUEUE = 0x0000_0010;

        /// No limit on the number of marks
        const UNLIMITED_MARKS = 0x0000_0020;
    }
}

bitflags! {
    /// How [`Fanotify::watch`] and friends interpret their arguments
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct MarkFlags: c_uint {
        /// Add to the mark; implied by [`Fanotify::watch`]
        const ADD = 0x0000_0001;

        /// Remove from the mark; implied by [`Fanotify::unwatch`]
        const REMOVE = 0x0000_0002;

        /// Don't dereference the path if it is a symbolic link
        const DONT_FOLLOW = 0x0000_0004;

        /// Fail unless the path is a directory
        const ONLYDIR = 0x0000_0008;

        /// Mark the whole mount containing the path
        const MOUNT = 0x0000_0010;

        /// Events in the mask are ignored instead of reported
        const IGNORED_MASK = 0x0000_0020;

        /// The ignore mask survives modify events
        const IGNORED_SURV_MODIFY = 0x0000_0040;

        /// Remove all marks of a kind; implied by [`Fanotify::flush`]
        const FLUSH = 0x0000_0080;

        /// Mark the whole filesystem containing the path
        const FILESYSTEM = 0x0000_0100;
    }
}

bitflags! {
    /// Event types, in marks and in events
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    pub struct FanMask: u64 {
        /// File was accessed
        const ACCESS = 0x0000_0001;

        /// File was modified
        const MODIFY = 0x0000_0002;

        /// File opened for writing was closed
        const CLOSE_WRITE = 0x0000_0008;

        /// File not opened for writing was closed
        const CLOSE_NOWRITE = 0x0000_0010;

        /// File was opened
        const OPEN = 0x0000_0020;

        /// File was opened for execution
        const OPEN_EXEC = 0x0000_1000;

        /// The event queue overflowed
        const Q_OVERFLOW = 0x0000_4000;

        /// Permission to open a file is requested
        const OPEN_PERM = 0x0001_0000;

        /// Permission to read a file is requested
        const ACCESS_PERM = 0x0002_0000;

        /// Permission to open a file for execution is requested
        const OPEN_EXEC_PERM = 0x0004_0000;

        /// Report events for the direct children of a marked directory
        const EVENT_ON_CHILD = 0x0800_0000;

        /// The subject of the event is a directory
        const ONDIR = 0x4000_0000;

        /// [`CLOSE_WRITE`](Self::CLOSE_WRITE) and
        /// [`CLOSE_NOWRITE`](Self::CLOSE_NOWRITE)
        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
    }
}

impl FanMask {
    /// Every event that waits for a [`Response`]
    pub const PERMISSION: FanMask = FanMask::OPEN_PERM
        .union(FanMask::ACCESS_PERM)
        .union(FanMask::OPEN_EXEC_PERM);
}


/// A decision about a permission event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Response {
    /// Let the operation proceed
    Allow,

    /// Fail the operation with `EPERM`
    Deny,
}

impl Response {
    fn raw(self) -> u32 {
        match self {
            Response::Allow => 1,
            Response::Deny  => 2,
        }
    }
}


/// A fanotify event
///
/// Owns the file descriptor the kernel opened for the touched file; it is
/// closed when the event is dropped. Overflow events carry no descriptor.
#[derive(Debug)]
pub struct FanotifyEvent {
    /// Metadata version, always [`METADATA_VERSION`]
    pub version: u8,

    /// What happened
    pub mask: FanMask,

    /// Process that caused the event
    pub pid: i32,

    fd      : Option<OwnedFd>,
    filename: OnceCell<PathBuf>,
}

impl FanotifyEvent {
    /// Decodes the event at the beginning of `buffer`
    ///
    /// Returns the number of bytes used, as given by the record's `event_len`.
    fn from_buffer(buffer: &[u8]) -> Result<(usize, Self)> {
        if buffer.len() < METADATA_SIZE {
            return Err(Error::protocol("fanotify event metadata"));
        }

        // Owned before any check, so a rejected record doesn't leak it
        let fd        = take_fd(buffer);
        let version   = buffer[4];
        let mask      = u64::from_ne_bytes(field(buffer, 8));
        let pid       = i32::from_ne_bytes(field(buffer, 20));

        if version != METADATA_VERSION {
            return Err(Error::protocol("fanotify metadata version"));
        }
        let event_len = record_len(buffer)
            .ok_or_else(|| Error::protocol("fanotify event length"))?;

        let event = FanotifyEvent {
            version,
            mask: FanMask::from_bits_retain(mask),
            pid,
            fd,
            filename: OnceCell::new(),
        };

        Ok((event_len, event))
    }

    /// The descriptor for the touched file, if there is one
    pub fn fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Takes ownership of the descriptor for the touched file
    pub fn into_fd(self) -> Option<OwnedFd> {
        self.fd
    }

    /// Path of the touched file
    ///
    /// Looked up through `/proc/self/fd` on first use, then cached. Fails
    /// with [`ErrorKind::NotFound`] for events without a file descriptor.
    pub fn filename(&self) -> Result<&Path> {
        if let Some(filename) = self.filename.get() {
            return Ok(filename);
        }

        let fd = self.fd()
            .ok_or_else(|| Error::new(ErrorKind::NotFound, "fanotify event filename"))?;
        let filename = sys::readlink(Path::new(&format!("/proc/self/fd/{}", fd)))?;

        Ok(self.filename.get_or_init(|| filename))
    }

    /// File was read
    pub fn is_access(&self) -> bool {
        self.mask.contains(FanMask::ACCESS)
    }

    /// File was written
    pub fn is_modify(&self) -> bool {
        self.mask.contains(FanMask::MODIFY)
    }

    /// File was opened
    pub fn is_open(&self) -> bool {
        self.mask.contains(FanMask::OPEN)
    }

    /// File was closed
    pub fn is_close(&self) -> bool {
        self.mask.intersects(FanMask::CLOSE)
    }

    /// The subject is a directory
    pub fn is_dir(&self) -> bool {
        self.mask.contains(FanMask::ONDIR)
    }

    /// The kernel waits for a [`Response`] to this event
    pub fn is_permission(&self) -> bool {
        self.mask.intersects(FanMask::PERMISSION)
    }

    /// Events were lost because the queue overflowed
    pub fn is_overflow(&self) -> bool {
        self.mask.contains(FanMask::Q_OVERFLOW)
    }
}

/// Length of the record at the start of `buffer`, if it is plausible
fn record_len(buffer: &[u8]) -> Option<usize> {
    if buffer.len() < METADATA_SIZE {
        return None;
    }

    let event_len = u32::from_ne_bytes(field(buffer, 0)) as usize;
    if event_len < METADATA_SIZE || event_len > buffer.len() {
        return None;
    }
    Some(event_len)
}

/// Takes ownership of the descriptor of the record at the start of `buffer`
fn take_fd(buffer: &[u8]) -> Option<OwnedFd> {
    let fd = i32::from_ne_bytes(field(buffer, 16));
    // `FAN_NOFD`, or an errno on kernels that report failed opens
    if fd == FAN_NOFD || fd < 0 {
        return None;
    }

    // The kernel installed this descriptor for us, and nothing else refers
    // to it.
    Some(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Closes the descriptors of all records in `buffer`, as far as they can be
/// located
fn release_fds(mut buffer: &[u8]) {
    while let Some(event_len) = record_len(buffer) {
        drop(take_fd(buffer));
        buffer = &buffer[event_len..];
    }
}

fn field<const N: usize>(buffer: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0; N];
    bytes.copy_from_slice(&buffer[offset..offset + N]);
    bytes
}


/// Decodes packed `fanotify_event_metadata` records
#[derive(Debug, Default)]
pub struct FanotifySource;

impl Source for FanotifySource {
    type Event = FanotifyEvent;

    const NAME: &'static str = "fanotify";

    fn decode(&self, buffer: &[u8]) -> Result<Vec<FanotifyEvent>> {
        let mut events = Vec::new();
        let mut pos    = 0;

        while pos < buffer.len() {
            let rest = &buffer[pos..];

            match FanotifyEvent::from_buffer(rest) {
                Ok((step, event)) => {
                    pos += step;
                    events.push(event);
                }
                Err(err) => {
                    // The faulty record's own descriptor is closed already
                    if let Some(event_len) = record_len(rest) {
                        release_fds(&rest[event_len..]);
                    }
                    debug!("fanotify: dropping {} decoded events after {}", events.len(), err);
                    return Err(err);
                }
            }
        }

        Ok(events)
    }
}

/// A fanotify instance
pub type Fanotify = EventSource<FanotifySource>;

impl Fanotify {
    /// Creates a fanotify instance
    ///
    /// `event_flags` are the `open(2)` flags used for the descriptors that
    /// come with each event, usually `libc::O_RDONLY`.
    ///
    /// Fails with [`ErrorKind::PermissionDenied`] without `CAP_SYS_ADMIN`.
    pub fn open(flags: InitFlags, event_flags: c_int) -> Result<Self> {
        let fd = sys::fanotify_init((flags | InitFlags::CLOEXEC).bits(), event_flags as c_uint)?;
        let blocking = !flags.contains(InitFlags::NONBLOCK);

        Ok(EventSource::from_raw(fd, blocking, FanotifySource))
    }

    /// Adds the events in `mask` to the mark on `path`
    ///
    /// `flags` select what is marked ([`MarkFlags::MOUNT`],
    /// [`MarkFlags::FILESYSTEM`], or by default the inode itself) and how;
    /// [`MarkFlags::ADD`] is implied.
    pub fn watch<P>(&mut self, flags: MarkFlags, mask: FanMask, path: P)
        -> Result<()>
        where P: AsRef<Path>
    {
        self.mark(flags | MarkFlags::ADD, mask, Some(path.as_ref()))
    }

    /// Removes the events in `mask` from the mark on `path`
    pub fn unwatch<P>(&mut self, flags: MarkFlags, mask: FanMask, path: P)
        -> Result<()>
        where P: AsRef<Path>
    {
        self.mark(flags | MarkFlags::REMOVE, mask, Some(path.as_ref()))
    }

    /// Removes all marks of one kind
    ///
    /// Inode marks by default; pass [`MarkFlags::MOUNT`] or
    /// [`MarkFlags::FILESYSTEM`] to flush those instead.
    pub fn flush(&mut self, flags: MarkFlags) -> Result<()> {
        self.mark(flags | MarkFlags::FLUSH, FanMask::empty(), None)
    }

    /// Answers a permission event
    ///
    /// The process that triggered the event stays suspended until this is
    /// called.
    pub fn respond(&mut self, event: &FanotifyEvent, response: Response)
        -> Result<()>
    {
        let fd       = self.fileno()?;
        let event_fd = event.fd()
            .ok_or_else(|| Error::new(ErrorKind::InvalidArgument, "fanotify response"))?;

        let mut buffer = [0u8; 8];
        buffer[..4].copy_from_slice(&event_fd.to_ne_bytes());
        buffer[4..].copy_from_slice(&response.raw().to_ne_bytes());

        if sys::write(fd, &buffer)? != buffer.len() {
            return Err(Error::protocol("fanotify response"));
        }

        debug!("fanotify fd {}: {:?} for event fd {}", fd, response, event_fd);
        Ok(())
    }

    fn mark(&mut self, flags: MarkFlags, mask: FanMask, path: Option<&Path>)
        -> Result<()>
    {
        let fd    = self.fileno()?;
        let cpath = path
            .map(|path| CString::new(path.as_os_str().as_bytes()))
            .transpose()
            .map_err(|_| Error::new(ErrorKind::InvalidArgument, "fanotify_mark"))?;

        sys::fanotify_mark(fd, flags.bits(), mask.bits(), libc::AT_FDCWD, cpath.as_deref())?;
        debug!("fanotify fd {}: mark {:?} {:?} on {:?}", fd, flags, mask, path);

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::{
        fs::File,
        io::{self, Read},
        os::unix::io::{FromRawFd, IntoRawFd, OwnedFd, RawFd},
    };

    use crate::ErrorKind;

    use super::{
        FanMask,
        FanotifySource,
        Source,
        METADATA_SIZE,
        METADATA_VERSION,
    };

    fn record(event_len: u32, version: u8, mask: FanMask, pid: i32) -> Vec<u8> {
        let mut record = vec![0; event_len as usize];
        record[0..4].copy_from_slice(&event_len.to_ne_bytes());
        record[4] = version;
        record[6..8].copy_from_slice(&(METADATA_SIZE as u16).to_ne_bytes());
        record[8..16].copy_from_slice(&mask.bits().to_ne_bytes());
        record[16..20].copy_from_slice(&(-1i32).to_ne_bytes());
        record[20..24].copy_from_slice(&pid.to_ne_bytes());
        record
    }

    fn with_fd(mut record: Vec<u8>, fd: RawFd) -> Vec<u8> {
        record[16..20].copy_from_slice(&fd.to_ne_bytes());
        record
    }

    /// A non-blocking pipe; the read end sees EOF once the write end is closed
    fn pipe() -> (File, OwnedFd) {
        let mut fds = [0; 2];
        let ret = unsafe {
            libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK)
        };
        assert_eq!(ret, 0, "Failed to create pipe");

        unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    fn is_closed(reader: &mut File) -> bool {
        match reader.read(&mut [0; 1]) {
            Ok(0) => true,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => false,
            result => panic!("Unexpected read result: {:?}", result),
        }
    }

    #[test]
    fn decode_steps_by_event_len() {
        let mut buffer = record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::OPEN, 10);
        // A record with trailing info the decoder doesn't know about
        buffer.extend(record(METADATA_SIZE as u32 + 16, METADATA_VERSION, FanMask::Q_OVERFLOW, 0));
        buffer.extend(record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::CLOSE_WRITE, 11));

        let events = FanotifySource.decode(&buffer).unwrap();

        assert_eq!(events.len(), 3);
        assert!(events[0].is_open());
        assert_eq!(events[0].pid, 10);
        assert_eq!(events[0].fd(), None);
        assert!(events[1].is_overflow());
        assert!(events[2].is_close());
        assert_eq!(events[2].pid, 11);
    }

    #[test]
    fn decode_rejects_malformed_records() {
        let short_len   = record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::OPEN, 1);
        let mut too_big = short_len.clone();
        too_big[0..4].copy_from_slice(&(METADATA_SIZE as u32 + 8).to_ne_bytes());
        let mut too_small = short_len.clone();
        too_small[0..4].copy_from_slice(&8u32.to_ne_bytes());
        let old_version = record(METADATA_SIZE as u32, 2, FanMask::OPEN, 1);

        for buffer in [&short_len[..10], &too_big[..], &too_small[..], &old_version[..]] {
            let err = FanotifySource.decode(buffer).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Protocol);
        }
    }

    #[test]
    fn filename_needs_a_descriptor() {
        let buffer = record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::Q_OVERFLOW, 0);
        let events = FanotifySource.decode(&buffer).unwrap();

        assert_eq!(events[0].filename().unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn permission_events() {
        let buffer = record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::OPEN_PERM, 0);
        let events = FanotifySource.decode(&buffer).unwrap();

        assert!(events[0].is_permission());
        assert!(!events[0].is_open());
    }

    #[test]
    fn faulty_decode_closes_every_event_descriptor() {
        let (mut faulty_reader, faulty_writer) = pipe();
        let (mut later_reader, later_writer)   = pipe();
        let (mut kept_reader, kept_writer)     = pipe();

        let mut buffer = with_fd(
            record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::OPEN, 1),
            kept_writer.into_raw_fd(),
        );
        buffer.extend(with_fd(
            record(METADATA_SIZE as u32, 2, FanMask::OPEN, 2),
            faulty_writer.into_raw_fd(),
        ));
        buffer.extend(with_fd(
            record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::MODIFY, 3),
            later_writer.into_raw_fd(),
        ));

        let err = FanotifySource.decode(&buffer).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);

        assert!(is_closed(&mut kept_reader));
        assert!(is_closed(&mut faulty_reader));
        assert!(is_closed(&mut later_reader));
    }

    #[test]
    fn decoded_event_owns_its_descriptor() {
        let (mut reader, writer) = pipe();
        let buffer = with_fd(
            record(METADATA_SIZE as u32, METADATA_VERSION, FanMask::OPEN, 1),
            writer.into_raw_fd(),
        );

        let events = FanotifySource.decode(&buffer).unwrap();
        assert!(events[0].fd().is_some());
        assert!(!is_closed(&mut reader));

        drop(events);
        assert!(is_closed(&mut reader));
    }
}
