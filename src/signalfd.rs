//! Receive signals through a file descriptor
//!
//! A [`Signalfd`] only receives signals that are blocked for normal delivery.
//! Use [`block`] before opening it, or the signals will still invoke their
//! handlers (or default actions) instead.

use std::{
    fmt,
    mem,
    os::raw::c_int,
};

use libc::sigset_t;
use log::debug;

use crate::{
    error::{Error, Result},
    source::{EventSource, Source},
    sys,
};


/// Size of one `signalfd_siginfo` record
pub const SIGINFO_SIZE: usize = 128;

/// Records read per refill at most
const READ_RECORDS: usize = 16;

/// One past the highest signal number on Linux
const NSIG: c_int = 65;


bitflags! {
    /// Flags for [`Signalfd::open`]
    #[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
    pub struct SignalfdFlags: c_int {
        /// Don't suspend when no signal is pending
        const NONBLOCK = libc::SFD_NONBLOCK;

        /// Close the descriptor on `execve(2)`; always added by
        /// [`Signalfd::open`]
        const CLOEXEC = libc::SFD_CLOEXEC;
    }
}


/// One delivered signal
///
/// Decoded from a `signalfd_siginfo` record. Which fields carry meaning
/// depends on the signal and how it was sent; see `signalfd(2)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Siginfo {
    /// Signal number
    pub signo: u32,
    /// Unused by the kernel, always zero
    pub errno: i32,
    /// Signal code (`SI_USER`, `SI_QUEUE`, `CLD_EXITED`, ...)
    pub code: i32,
    /// PID of the sender
    pub pid: u32,
    /// Real UID of the sender
    pub uid: u32,
    /// File descriptor (`SIGIO`)
    pub fd: i32,
    /// Kernel timer ID (POSIX timers)
    pub tid: u32,
    /// Band event (`SIGIO`)
    pub band: u32,
    /// POSIX timer overrun count
    pub overrun: u32,
    /// Trap number that caused a hardware-generated signal
    pub trapno: u32,
    /// Exit status or signal (`SIGCHLD`)
    pub status: i32,
    /// Integer sent by `sigqueue(3)`
    pub int: i32,
    /// Pointer sent by `sigqueue(3)`
    pub ptr: u64,
    /// User CPU time consumed (`SIGCHLD`)
    pub utime: u64,
    /// System CPU time consumed (`SIGCHLD`)
    pub stime: u64,
    /// Address that generated a hardware-generated signal
    pub addr: u64,
}

impl Siginfo {
    fn from_record(record: &[u8]) -> Self {
        Siginfo {
            signo  : u32::from_ne_bytes(field(record, 0)),
            errno  : i32::from_ne_bytes(field(record, 4)),
            code   : i32::from_ne_bytes(field(record, 8)),
            pid    : u32::from_ne_bytes(field(record, 12)),
            uid    : u32::from_ne_bytes(field(record, 16)),
            fd     : i32::from_ne_bytes(field(record, 20)),
            tid    : u32::from_ne_bytes(field(record, 24)),
            band   : u32::from_ne_bytes(field(record, 28)),
            overrun: u32::from_ne_bytes(field(record, 32)),
            trapno : u32::from_ne_bytes(field(record, 36)),
            status : i32::from_ne_bytes(field(record, 40)),
            int    : i32::from_ne_bytes(field(record, 44)),
            ptr    : u64::from_ne_bytes(field(record, 48)),
            utime  : u64::from_ne_bytes(field(record, 56)),
            stime  : u64::from_ne_bytes(field(record, 64)),
            addr   : u64::from_ne_bytes(field(record, 72)),
        }
    }

    /// The signal's name, like `"SIGUSR1"`
    pub fn name(&self) -> Option<&'static str> {
        signal_name(self.signo as c_int)
    }
}

fn field<const N: usize>(record: &[u8], offset: usize) -> [u8; N] {
    let mut bytes = [0; N];
    bytes.copy_from_slice(&record[offset..offset + N]);
    bytes
}


/// Decodes `signalfd_siginfo` records, and holds the signal set
pub struct SignalfdSource {
    mask: sigset_t,
}

impl SignalfdSource {
    /// Whether `signo` is part of the signal set
    pub fn contains(&self, signo: c_int) -> bool {
        sys::sigismember(&self.mask, signo)
    }

    /// All signals in the signal set, in ascending order
    pub fn signals(&self) -> Vec<c_int> {
        (1..NSIG).filter(|signo| self.contains(*signo)).collect()
    }
}

impl fmt::Debug for SignalfdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalfdSource")
            .field("signals", &self.signals())
            .finish()
    }
}

impl Source for SignalfdSource {
    type Event = Siginfo;

    const NAME: &'static str = "signalfd";
    const READ_SIZE: Option<usize> = Some(SIGINFO_SIZE * READ_RECORDS);

    fn decode(&self, buffer: &[u8]) -> Result<Vec<Siginfo>> {
        let records = buffer.chunks_exact(SIGINFO_SIZE);
        if !records.remainder().is_empty() {
            return Err(Error::protocol("signalfd_siginfo"));
        }

        Ok(records.map(Siginfo::from_record).collect())
    }
}

/// Signals delivered through a file descriptor
pub type Signalfd = EventSource<SignalfdSource>;

impl Signalfd {
    /// Creates a signalfd that receives `signals`
    ///
    /// The signals still have to be blocked, see [`block`].
    pub fn open<I>(signals: I, flags: SignalfdFlags) -> Result<Self>
        where I: IntoIterator<Item = c_int>
    {
        let mask = sigset_of(signals)?;
        let fd   = sys::signalfd(-1, &mask, (flags | SignalfdFlags::CLOEXEC).bits())?;
        let blocking = !flags.contains(SignalfdFlags::NONBLOCK);

        Ok(EventSource::from_raw(fd, blocking, SignalfdSource { mask }))
    }

    /// Adds signals to the set this signalfd receives
    pub fn enable<I>(&mut self, signals: I) -> Result<()>
        where I: IntoIterator<Item = c_int>
    {
        let mut mask = self.source().mask;
        for signo in signals {
            sys::sigaddset(&mut mask, signo)?;
        }
        self.apply(mask)
    }

    /// Removes signals from the set this signalfd receives
    pub fn disable<I>(&mut self, signals: I) -> Result<()>
        where I: IntoIterator<Item = c_int>
    {
        let mut mask = self.source().mask;
        for signo in signals {
            sys::sigdelset(&mut mask, signo)?;
        }
        self.apply(mask)
    }

    /// Receives every signal
    ///
    /// `SIGKILL` and `SIGSTOP` can't be received this way; the kernel
    /// silently ignores them.
    pub fn enable_all(&mut self) -> Result<()> {
        self.apply(sys::full_sigset())
    }

    /// Receives no signal at all
    pub fn disable_all(&mut self) -> Result<()> {
        self.apply(sys::empty_sigset())
    }

    /// Whether `signo` is part of the signal set
    pub fn contains(&self, signo: c_int) -> bool {
        self.source().contains(signo)
    }

    /// All signals this signalfd receives
    pub fn signals(&self) -> Vec<c_int> {
        self.source().signals()
    }

    // Hands the whole set to the kernel again. That's idempotent, so
    // re-enabling a signal is harmless.
    fn apply(&mut self, mask: sigset_t) -> Result<()> {
        let fd = self.fileno()?;
        sys::signalfd(fd, &mask, 0)?;

        self.source_mut().mask = mask;
        debug!("signalfd fd {}: signals now {:?}", fd, self.source().signals());

        Ok(())
    }
}


/// Blocks `signals` for the calling thread
///
/// Signals have to be blocked to be received through a [`Signalfd`]. Threads
/// spawned afterwards inherit the mask.
pub fn block<I>(signals: I) -> Result<()>
    where I: IntoIterator<Item = c_int>
{
    sys::pthread_sigmask(libc::SIG_BLOCK, &sigset_of(signals)?)?;
    Ok(())
}

/// Unblocks `signals` for the calling thread
pub fn unblock<I>(signals: I) -> Result<()>
    where I: IntoIterator<Item = c_int>
{
    sys::pthread_sigmask(libc::SIG_UNBLOCK, &sigset_of(signals)?)?;
    Ok(())
}

fn sigset_of<I>(signals: I) -> Result<sigset_t>
    where I: IntoIterator<Item = c_int>
{
    let mut set = sys::empty_sigset();
    for signo in signals {
        sys::sigaddset(&mut set, signo)?;
    }
    Ok(set)
}


static SIGNAL_NAMES: &[(c_int, &str)] = &[
    (libc::SIGHUP,    "SIGHUP"),
    (libc::SIGINT,    "SIGINT"),
    (libc::SIGQUIT,   "SIGQUIT"),
    (libc::SIGILL,    "SIGILL"),
    (libc::SIGTRAP,   "SIGTRAP"),
    (libc::SIGABRT,   "SIGABRT"),
    (libc::SIGBUS,    "SIGBUS"),
    (libc::SIGFPE,    "SIGFPE"),
    (libc::SIGKILL,   "SIGKILL"),
    (libc::SIGUSR1,   "SIGUSR1"),
    (libc::SIGSEGV,   "SIGSEGV"),
    (libc::SIGUSR2,   "SIGUSR2"),
    (libc::SIGPIPE,   "SIGPIPE"),
    (libc::SIGALRM,   "SIGALRM"),
    (libc::SIGTERM,   "SIGTERM"),
    (libc::SIGCHLD,   "SIGCHLD"),
    (libc::SIGCONT,   "SIGCONT"),
    (libc::SIGSTOP,   "SIGSTOP"),
    (libc::SIGTSTP,   "SIGTSTP"),
    (libc::SIGTTIN,   "SIGTTIN"),
    (libc::SIGTTOU,   "SIGTTOU"),
    (libc::SIGURG,    "SIGURG"),
    (libc::SIGXCPU,   "SIGXCPU"),
    (libc::SIGXFSZ,   "SIGXFSZ"),
    (libc::SIGVTALRM, "SIGVTALRM"),
    (libc::SIGPROF,   "SIGPROF"),
    (libc::SIGWINCH,  "SIGWINCH"),
    (libc::SIGIO,     "SIGIO"),
    (libc::SIGPWR,    "SIGPWR"),
    (libc::SIGSYS,    "SIGSYS"),
];

/// Name of a standard signal, like `"SIGTERM"`
///
/// `None` for real-time and unknown signal numbers.
pub fn signal_name(signo: c_int) -> Option<&'static str> {
    SIGNAL_NAMES
        .iter()
        .find(|(number, _)| *number == signo)
        .map(|(_, name)| *name)
}

const _: () = assert!(mem::size_of::<libc::signalfd_siginfo>() == SIGINFO_SIZE);
