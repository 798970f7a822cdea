//! Thin bindings for the syscalls this crate uses
//!
//! One function per syscall. Each one calls into `libc`, and if the kernel
//! signals failure, looks the `errno` up in that syscall's table to produce
//! an [`Error`]. Codes missing from a table come back as
//! [`ErrorKind::Unexpected`], carrying the raw code. Nothing here buffers or
//! retries.

use std::{
    ffi::CStr,
    fs,
    io,
    mem,
    os::unix::io::{FromRawFd, OwnedFd, RawFd},
    path::{Path, PathBuf},
    ptr,
    time::Duration,
};

use libc::{
    c_int,
    c_uint,
    c_void,
    itimerspec,
    sigset_t,
    EACCES,
    EAGAIN,
    EBADF,
    ECANCELED,
    EEXIST,
    EINTR,
    EINVAL,
    EMFILE,
    ENAMETOOLONG,
    ENFILE,
    ENODEV,
    ENOENT,
    ENOMEM,
    ENOSPC,
    ENOSYS,
    ENOTDIR,
    ENOTTY,
    EPERM,
    EXDEV,
};

use crate::error::{Error, ErrorKind, Result};


/// Every syscall this crate issues
///
/// Used to pick the errno table when translating a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Syscall {
    /// `eventfd(2)`
    Eventfd,
    /// `inotify_init1(2)`
    InotifyInit,
    /// `inotify_add_watch(2)`
    InotifyAddWatch,
    /// `inotify_rm_watch(2)`
    InotifyRmWatch,
    /// `fanotify_init(2)`
    FanotifyInit,
    /// `fanotify_mark(2)`
    FanotifyMark,
    /// `signalfd(2)`
    Signalfd,
    /// `pthread_sigmask(3)`
    PthreadSigmask,
    /// `sigaddset(3)` and `sigdelset(3)`
    Sigset,
    /// `timerfd_create(2)`
    TimerfdCreate,
    /// `timerfd_settime(2)`
    TimerfdSettime,
    /// `timerfd_gettime(2)`
    TimerfdGettime,
    /// `ioctl(2)` with `FIONREAD`
    Fionread,
    /// `read(2)`
    Read,
    /// `write(2)`
    Write,
    /// `poll(2)`
    Poll,
    /// `close(2)`
    Close,
    /// `fcntl(2)`
    Fcntl,
    /// `readlink(2)`
    Readlink,
    /// `epoll_create1(2)`, `epoll_ctl(2)` and `epoll_wait(2)`, via `mio`
    Epoll,
}

use crate::error::ErrorKind::*;

impl Syscall {
    /// The name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            Syscall::Eventfd         => "eventfd",
            Syscall::InotifyInit     => "inotify_init1",
            Syscall::InotifyAddWatch => "inotify_add_watch",
            Syscall::InotifyRmWatch  => "inotify_rm_watch",
            Syscall::FanotifyInit    => "fanotify_init",
            Syscall::FanotifyMark    => "fanotify_mark",
            Syscall::Signalfd        => "signalfd",
            Syscall::PthreadSigmask  => "pthread_sigmask",
            Syscall::Sigset          => "sigaddset",
            Syscall::TimerfdCreate   => "timerfd_create",
            Syscall::TimerfdSettime  => "timerfd_settime",
            Syscall::TimerfdGettime  => "timerfd_gettime",
            Syscall::Fionread        => "ioctl(FIONREAD)",
            Syscall::Read            => "read",
            Syscall::Write           => "write",
            Syscall::Poll            => "poll",
            Syscall::Close           => "close",
            Syscall::Fcntl           => "fcntl",
            Syscall::Readlink        => "readlink",
            Syscall::Epoll           => "epoll",
        }
    }

    fn known_errors(self) -> &'static [(c_int, ErrorKind)] {
        match self {
            Syscall::Eventfd => &[
                (EINVAL, InvalidArgument),
                (EMFILE, ResourceExhausted),
                (ENFILE, ResourceExhausted),
                (ENODEV, Unsupported),
                (ENOMEM, OutOfMemory),
            ],
            Syscall::InotifyInit => &[
                (EINVAL, InvalidArgument),
                (EMFILE, ResourceExhausted),
                (ENFILE, ResourceExhausted),
                (ENOMEM, OutOfMemory),
            ],
            Syscall::InotifyAddWatch => &[
                (EINVAL,       InvalidArgument),
                (EBADF,        InvalidArgument),
                (ENAMETOOLONG, InvalidArgument),
                (ENOTDIR,      InvalidArgument),
                (EACCES,       PermissionDenied),
                (ENOENT,       NotFound),
                (ENOSPC,       ResourceExhausted),
                (ENOMEM,       OutOfMemory),
            ],
            Syscall::InotifyRmWatch => &[
                (EINVAL, InvalidArgument),
                (EBADF,  InvalidArgument),
            ],
            Syscall::FanotifyInit => &[
                (EINVAL, InvalidArgument),
                (EMFILE, ResourceExhausted),
                (ENFILE, ResourceExhausted),
                (ENOMEM, OutOfMemory),
                (EPERM,  PermissionDenied),
                (ENOSYS, Unsupported),
            ],
            Syscall::FanotifyMark => &[
                (EINVAL,  InvalidArgument),
                (EBADF,   InvalidArgument),
                (ENOTDIR, InvalidArgument),
                (ENOENT,  NotFound),
                (ENOMEM,  OutOfMemory),
                (ENOSPC,  ResourceExhausted),
                (EPERM,   PermissionDenied),
                (EACCES,  PermissionDenied),
                (ENODEV,  Unsupported),
                (EXDEV,   Unsupported),
            ],
            Syscall::Signalfd => &[
                (EBADF,  InvalidArgument),
                (EINVAL, InvalidArgument),
                (EMFILE, ResourceExhausted),
                (ENFILE, ResourceExhausted),
                (ENODEV, Unsupported),
                (ENOMEM, OutOfMemory),
            ],
            Syscall::PthreadSigmask | Syscall::Sigset => &[
                (EINVAL, InvalidArgument),
            ],
            Syscall::TimerfdCreate => &[
                (EINVAL, InvalidArgument),
                (EMFILE, ResourceExhausted),
                (ENFILE, ResourceExhausted),
                (ENODEV, Unsupported),
                (ENOMEM, OutOfMemory),
                (EPERM,  PermissionDenied),
            ],
            Syscall::TimerfdSettime | Syscall::TimerfdGettime => &[
                (EBADF,     InvalidArgument),
                (EINVAL,    InvalidArgument),
                (ECANCELED, Interrupted),
            ],
            Syscall::Fionread => &[
                (EBADF,  InvalidArgument),
                (EINVAL, InvalidArgument),
                (ENOTTY, InvalidArgument),
            ],
            Syscall::Read => &[
                (EBADF,  InvalidArgument),
                (EINVAL, InvalidArgument),
                (EINTR,  Interrupted),
            ],
            Syscall::Write => &[
                (EBADF,  InvalidArgument),
                (EINVAL, InvalidArgument),
                (EAGAIN, ResourceExhausted),
                (EINTR,  Interrupted),
            ],
            Syscall::Poll => &[
                (EINVAL, InvalidArgument),
                (ENOMEM, OutOfMemory),
                (EINTR,  Interrupted),
            ],
            Syscall::Close => &[
                (EBADF, Closed),
                (EINTR, Interrupted),
            ],
            Syscall::Fcntl => &[
                (EBADF,  InvalidArgument),
                (EINVAL, InvalidArgument),
            ],
            Syscall::Readlink => &[
                (EINVAL, InvalidArgument),
                (EACCES, PermissionDenied),
                (ENOENT, NotFound),
                (ENOMEM, OutOfMemory),
            ],
            Syscall::Epoll => &[
                (EBADF,  InvalidArgument),
                (EEXIST, InvalidArgument),
                (EINVAL, InvalidArgument),
                (ENOENT, NotFound),
                (EPERM,  Unsupported),
                (EMFILE, ResourceExhausted),
                (ENFILE, ResourceExhausted),
                (ENOSPC, ResourceExhausted),
                (ENOMEM, OutOfMemory),
                (EINTR,  Interrupted),
            ],
        }
    }

    /// Translates an `errno` returned by this syscall
    pub fn error_kind(self, errno: c_int) -> ErrorKind {
        self.known_errors()
            .iter()
            .find(|(code, _)| *code == errno)
            .map(|(_, kind)| *kind)
            .unwrap_or(Unexpected)
    }

    /// Builds the [`Error`] for a failure of this syscall
    pub fn error(self, errno: c_int) -> Error {
        Error::from_errno(self.error_kind(errno), self.name(), errno)
    }

    /// Builds the [`Error`] for a failure reported through `std::io`
    pub fn io_error(self, err: io::Error) -> Error {
        self.error(err.raw_os_error().unwrap_or(0))
    }

    fn last_error(self) -> Error {
        let errno = io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(0);
        self.error(errno)
    }

    fn check(self, ret: c_int) -> Result<c_int> {
        if ret < 0 {
            Err(self.last_error())
        }
        else {
            Ok(ret)
        }
    }
}


pub fn eventfd(initval: c_uint, flags: c_int) -> Result<RawFd> {
    Syscall::Eventfd.check(unsafe { libc::eventfd(initval, flags) })
}

pub fn inotify_init1(flags: c_int) -> Result<RawFd> {
    Syscall::InotifyInit.check(unsafe { libc::inotify_init1(flags) })
}

pub fn inotify_add_watch(fd: RawFd, path: &CStr, mask: u32) -> Result<c_int> {
    Syscall::InotifyAddWatch.check(unsafe {
        libc::inotify_add_watch(fd, path.as_ptr(), mask)
    })
}

pub fn inotify_rm_watch(fd: RawFd, wd: c_int) -> Result<()> {
    Syscall::InotifyRmWatch.check(unsafe { libc::inotify_rm_watch(fd, wd) })?;
    Ok(())
}

pub fn fanotify_init(flags: c_uint, event_f_flags: c_uint) -> Result<RawFd> {
    Syscall::FanotifyInit.check(unsafe {
        libc::fanotify_init(flags, event_f_flags)
    })
}

pub fn fanotify_mark(
    fd    : RawFd,
    flags : c_uint,
    mask  : u64,
    dirfd : c_int,
    path  : Option<&CStr>,
)
    -> Result<()>
{
    let path = path.map_or(ptr::null(), CStr::as_ptr);
    Syscall::FanotifyMark.check(unsafe {
        libc::fanotify_mark(fd, flags, mask, dirfd, path)
    })?;
    Ok(())
}

pub fn signalfd(fd: RawFd, mask: &sigset_t, flags: c_int) -> Result<RawFd> {
    Syscall::Signalfd.check(unsafe { libc::signalfd(fd, mask, flags) })
}

/// Changes the calling thread's signal mask, returning the previous one
///
/// `pthread_sigmask` returns the error code instead of setting `errno`.
pub fn pthread_sigmask(how: c_int, set: &sigset_t) -> Result<sigset_t> {
    let mut old = empty_sigset();
    let ret = unsafe { libc::pthread_sigmask(how, set, &mut old) };
    match ret {
        0     => Ok(old),
        errno => Err(Syscall::PthreadSigmask.error(errno)),
    }
}

pub fn empty_sigset() -> sigset_t {
    unsafe {
        let mut set = mem::zeroed::<sigset_t>();
        libc::sigemptyset(&mut set);
        set
    }
}

pub fn full_sigset() -> sigset_t {
    unsafe {
        let mut set = mem::zeroed::<sigset_t>();
        libc::sigfillset(&mut set);
        set
    }
}

pub fn sigaddset(set: &mut sigset_t, signo: c_int) -> Result<()> {
    Syscall::Sigset.check(unsafe { libc::sigaddset(set, signo) })?;
    Ok(())
}

pub fn sigdelset(set: &mut sigset_t, signo: c_int) -> Result<()> {
    Syscall::Sigset.check(unsafe { libc::sigdelset(set, signo) })?;
    Ok(())
}

pub fn sigismember(set: &sigset_t, signo: c_int) -> bool {
    unsafe { libc::sigismember(set, signo) == 1 }
}

pub fn timerfd_create(clock: c_int, flags: c_int) -> Result<RawFd> {
    Syscall::TimerfdCreate.check(unsafe { libc::timerfd_create(clock, flags) })
}

pub fn timerfd_settime(fd: RawFd, flags: c_int, new: &itimerspec)
    -> Result<itimerspec>
{
    let mut old = zeroed_itimerspec();
    Syscall::TimerfdSettime.check(unsafe {
        libc::timerfd_settime(fd, flags, new, &mut old)
    })?;
    Ok(old)
}

pub fn timerfd_gettime(fd: RawFd) -> Result<itimerspec> {
    let mut current = zeroed_itimerspec();
    Syscall::TimerfdGettime.check(unsafe {
        libc::timerfd_gettime(fd, &mut current)
    })?;
    Ok(current)
}

pub fn zeroed_itimerspec() -> itimerspec {
    unsafe { mem::zeroed() }
}

/// Number of bytes that can be read from `fd` right now
pub fn fionread(fd: RawFd) -> Result<usize> {
    let mut available: c_int = 0;
    Syscall::Fionread.check(unsafe {
        libc::ioctl(fd, libc::FIONREAD, &mut available)
    })?;
    Ok(available as usize)
}

pub fn read(fd: RawFd, buffer: &mut [u8]) -> Result<usize> {
    let ret = unsafe {
        libc::read(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len())
    };
    if ret < 0 {
        return Err(Syscall::Read.last_error());
    }
    Ok(ret as usize)
}

pub fn write(fd: RawFd, buffer: &[u8]) -> Result<usize> {
    let ret = unsafe {
        libc::write(fd, buffer.as_ptr() as *const c_void, buffer.len())
    };
    if ret < 0 {
        return Err(Syscall::Write.last_error());
    }
    Ok(ret as usize)
}

/// Waits until `fd` is readable
///
/// Returns `false` if `timeout` elapsed first. `None` waits forever.
pub fn poll_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool> {
    let timeout = match timeout {
        // Round up, so a sub-millisecond timeout doesn't turn into a
        // non-blocking check.
        Some(timeout) => {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            millis.min(c_int::MAX as u128) as c_int
        }
        None => -1,
    };

    let mut pollfd = libc::pollfd {
        fd,
        events : libc::POLLIN,
        revents: 0,
    };
    let ready = Syscall::Poll.check(unsafe { libc::poll(&mut pollfd, 1, timeout) })?;

    Ok(ready > 0)
}

pub fn close(fd: RawFd) -> Result<()> {
    Syscall::Close.check(unsafe { libc::close(fd) })?;
    Ok(())
}

/// Duplicates `fd`, with close-on-exec set on the copy
pub fn dup(fd: RawFd) -> Result<OwnedFd> {
    let copy = Syscall::Fcntl.check(unsafe {
        libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0)
    })?;
    Ok(unsafe { OwnedFd::from_raw_fd(copy) })
}

pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<()> {
    let flags = Syscall::Fcntl.check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    let flags = if nonblocking {
        flags | libc::O_NONBLOCK
    }
    else {
        flags & !libc::O_NONBLOCK
    };
    Syscall::Fcntl.check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags) })?;
    Ok(())
}

pub fn set_cloexec(fd: RawFd, cloexec: bool) -> Result<()> {
    let flags = Syscall::Fcntl.check(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    let flags = if cloexec {
        flags | libc::FD_CLOEXEC
    }
    else {
        flags & !libc::FD_CLOEXEC
    };
    Syscall::Fcntl.check(unsafe { libc::fcntl(fd, libc::F_SETFD, flags) })?;
    Ok(())
}

pub fn readlink(path: &Path) -> Result<PathBuf> {
    fs::read_link(path).map_err(|err| Syscall::Readlink.io_error(err))
}
