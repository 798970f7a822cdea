//! Single-threaded, callback-driven consumption of event sources
//!
//! An [`EventLoop`] calls a reader callback whenever a registered file
//! descriptor becomes readable. [`AsyncSource`] builds on that: it wraps an
//! [`EventSource`], and hands out events as futures, to any number of
//! waiters, in the order they asked.
//!
//! Everything here lives on one thread. Nothing is `Send`.
//!
//! ```
//! use std::time::Duration;
//! use fdevents::{
//!     reactor::{AsyncSource, EventLoop},
//!     timerfd::{Clock, TimerfdFlags},
//!     Timerfd,
//! };
//!
//! let event_loop = EventLoop::new().expect("Failed to create event loop");
//!
//! let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty())
//!     .expect("Failed to create timer");
//! timer.set_one_off(Duration::from_millis(10), false)
//!     .expect("Failed to arm timer");
//! let timer = AsyncSource::new(&event_loop.handle(), timer, 0)
//!     .expect("Failed to register timer");
//!
//! let expirations = event_loop
//!     .block_on(timer.get_event())
//!     .expect("Event loop failed")
//!     .expect("Failed to read timer");
//! assert_eq!(expirations, 1);
//! ```

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    fmt,
    future::Future,
    os::unix::io::RawFd,
    pin::{pin, Pin},
    rc::Rc,
    task::{self, Context},
    time::Duration,
};

use futures::{
    channel::oneshot,
    task::noop_waker_ref,
};
use log::{
    debug,
    trace,
    warn,
};
use mio::{
    unix::SourceFd,
    Events,
    Interest,
    Poll,
    Token,
};

use crate::{
    error::{Error, ErrorKind, Result},
    source::{EventSource, Source},
    sys::Syscall,
};


/// Callback invoked when a file descriptor becomes readable
pub type Reader = Rc<dyn Fn()>;

struct Inner {
    poll   : RefCell<Poll>,
    events : RefCell<Events>,
    readers: RefCell<HashMap<RawFd, Reader>>,
}

/// A single-threaded readiness loop
///
/// Wraps a [`mio::Poll`]. Readers are registered per file descriptor, and
/// called from [`EventLoop::turn`] whenever it becomes readable. A reader
/// stays registered until [`Handle::remove_reader`] is called.
pub struct EventLoop {
    handle: Handle,
}

impl EventLoop {
    /// Creates an event loop with no readers
    pub fn new() -> Result<Self> {
        let poll = Poll::new().map_err(|err| Syscall::Epoll.io_error(err))?;

        let inner = Inner {
            poll   : RefCell::new(poll),
            events : RefCell::new(Events::with_capacity(64)),
            readers: RefCell::new(HashMap::new()),
        };

        Ok(EventLoop {
            handle: Handle { inner: Rc::new(inner) },
        })
    }

    /// A handle to register readers with
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Waits for readiness once, and calls the readers of all ready fds
    ///
    /// Returns the number of readers called. `None` waits until at least one
    /// registered fd is ready.
    pub fn turn(&self, timeout: Option<Duration>) -> Result<usize> {
        let inner = &self.handle.inner;

        let ready: Vec<RawFd> = {
            let mut events = inner.events.borrow_mut();
            inner.poll.borrow_mut()
                .poll(&mut events, timeout)
                .map_err(|err| Syscall::Epoll.io_error(err))?;

            events.iter().map(|event| event.token().0 as RawFd).collect()
        };

        let mut called = 0;
        for fd in ready {
            // A reader may remove itself or others while running
            let reader = inner.readers.borrow().get(&fd).cloned();
            if let Some(reader) = reader {
                trace!("dispatching readable fd {}", fd);
                reader();
                called += 1;
            }
        }

        Ok(called)
    }

    /// Drives `future` to completion
    ///
    /// Alternates between polling the future and calling [`EventLoop::turn`].
    /// Fails with [`ErrorKind::Stalled`] if the future isn't done and no
    /// reader is registered, as nothing could ever make progress then.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let mut future = pin!(future);
        let mut cx     = Context::from_waker(noop_waker_ref());

        loop {
            if let task::Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Ok(output);
            }

            if self.handle.inner.readers.borrow().is_empty() {
                return Err(Error::new(ErrorKind::Stalled, "block_on"));
            }

            self.turn(None)?;
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("readers", &self.handle.inner.readers.borrow().len())
            .finish()
    }
}


/// Registers and removes readers on an [`EventLoop`]
#[derive(Clone)]
pub struct Handle {
    inner: Rc<Inner>,
}

impl Handle {
    /// Calls `reader` whenever `fd` is readable
    ///
    /// Replaces the reader if `fd` already has one.
    pub fn add_reader(&self, fd: RawFd, reader: Reader) -> Result<()> {
        let mut readers = self.inner.readers.borrow_mut();

        if !readers.contains_key(&fd) {
            self.inner.poll.borrow()
                .registry()
                .register(&mut SourceFd(&fd), Token(fd as usize), Interest::READABLE)
                .map_err(|err| Syscall::Epoll.io_error(err))?;
        }

        readers.insert(fd, reader);
        Ok(())
    }

    /// Stops watching `fd`
    ///
    /// Returns whether a reader was registered.
    pub fn remove_reader(&self, fd: RawFd) -> Result<bool> {
        if self.inner.readers.borrow_mut().remove(&fd).is_none() {
            return Ok(false);
        }

        self.inner.poll.borrow()
            .registry()
            .deregister(&mut SourceFd(&fd))
            .map_err(|err| Syscall::Epoll.io_error(err))?;

        Ok(true)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    /// A reader is registered for this descriptor
    AwaitingReadable(RawFd),
}

struct Shared<S: Source> {
    source  : EventSource<S>,
    getters : VecDeque<oneshot::Sender<Result<S::Event>>>,
    state   : State,
    maxsize : usize,
    poisoned: bool,
    handle  : Handle,
}

/// An event source for the [`EventLoop`]
///
/// Owns an [`EventSource`], switched to non-blocking mode. Events are
/// requested with [`AsyncSource::get_event`]; waiters are served strictly in
/// the order they called it.
///
/// `maxsize` bounds the number of events buffered without a waiter (`0`
/// means unbounded). A refill that would exceed it is fatal: the source is
/// poisoned and every later request fails with [`ErrorKind::Overflow`].
pub struct AsyncSource<S: Source> {
    shared: Rc<RefCell<Shared<S>>>,
}

impl<S> AsyncSource<S>
    where
        S       : Source + 'static,
        S::Event: 'static,
{
    /// Wraps `source`, switching it to non-blocking mode
    pub fn new(handle: &Handle, mut source: EventSource<S>, maxsize: usize)
        -> Result<Self>
    {
        source.set_nonblocking(true)?;

        let shared = Shared {
            source,
            getters : VecDeque::new(),
            state   : State::Idle,
            maxsize,
            poisoned: false,
            handle  : handle.clone(),
        };

        Ok(AsyncSource {
            shared: Rc::new(RefCell::new(shared)),
        })
    }

    /// Requests the next event
    ///
    /// Buffered events are returned right away. Otherwise the source starts
    /// waiting for readability immediately, not when the future is first
    /// polled. Dropping the future cancels the request without losing an
    /// event.
    pub fn get_event(&self) -> GetEvent<S::Event> {
        let mut shared = self.shared.borrow_mut();

        if shared.poisoned {
            return GetEvent::ready(Err(overflow()));
        }
        if let Err(err) = shared.source.fileno() {
            return GetEvent::ready(Err(err));
        }
        if let Some(event) = shared.source.pop_pending() {
            return GetEvent::ready(Ok(event));
        }

        let (sender, receiver) = oneshot::channel();
        shared.getters.push_back(sender);

        if shared.state == State::Idle {
            if let Err(err) = register(&self.shared, &mut shared) {
                shared.getters.pop_back();
                return GetEvent::ready(Err(err));
            }
        }

        let weak = Rc::downgrade(&self.shared);
        let cancel: Box<dyn FnOnce(Option<S::Event>)> = Box::new(move |unclaimed| {
            let rc = match weak.upgrade() {
                Some(rc) => rc,
                None     => return,
            };
            let mut guard = match rc.try_borrow_mut() {
                Ok(guard) => guard,
                Err(_)    => {
                    debug!("{}: waiter dropped while the source is in use", S::NAME);
                    return;
                }
            };
            let shared = &mut *guard;

            if let Some(event) = unclaimed {
                shared.source.unread(event);
                dispatch(shared);
            }
            if let Err(err) = prune(shared) {
                fail_all(shared, err);
            }
        });

        GetEvent {
            state : GetEventState::Waiting(receiver),
            cancel: Some(cancel),
        }
    }

    /// Returns a buffered or immediately readable event
    ///
    /// `None` if nothing is available, or if other waiters are queued ahead.
    pub fn get_event_nowait(&self) -> Result<Option<S::Event>> {
        let mut shared = self.shared.borrow_mut();

        if shared.poisoned {
            return Err(overflow());
        }
        prune(&mut shared)?;
        if !shared.getters.is_empty() {
            return Ok(None);
        }

        shared.source.read_event()
    }

    /// Number of buffered events
    pub fn qsize(&self) -> usize {
        self.shared.borrow().source.pending_len()
    }

    /// The bound on buffered events, `0` if unbounded
    pub fn maxsize(&self) -> usize {
        self.shared.borrow().maxsize
    }

    /// The wrapped descriptor
    pub fn fileno(&self) -> Result<RawFd> {
        self.shared.borrow().source.fileno()
    }

    /// Runs `f` on the wrapped source
    ///
    /// For the adapter's own operations, like adding watches or arming a
    /// timer. Don't read events through it; that would bypass the waiters.
    ///
    /// The descriptor is unregistered while `f` runs. If `f` closes the
    /// source, outstanding waiters fail with [`ErrorKind::Closed`].
    pub fn with_source<R, F>(&self, f: F) -> Result<R>
        where F: FnOnce(&mut EventSource<S>) -> R
    {
        let mut guard = self.shared.borrow_mut();
        let shared    = &mut *guard;

        deregister(shared)?;
        let result = f(&mut shared.source);

        if shared.source.is_closed() {
            fail_all(shared, Error::closed("get_event"));
            return Ok(result);
        }

        shared.getters.retain(|getter| !getter.is_canceled());
        if !shared.getters.is_empty() {
            if let Err(err) = register(&self.shared, shared) {
                fail_all(shared, err.clone());
                return Err(err);
            }
        }

        Ok(result)
    }

    /// Closes the source
    ///
    /// Outstanding waiters fail with [`ErrorKind::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut guard = self.shared.borrow_mut();
        let shared    = &mut *guard;
        shared.source.fileno()?;

        deregister(shared)?;
        shared.source.close()?;
        fail_all(shared, Error::closed("get_event"));

        Ok(())
    }
}

impl<S: Source> Drop for AsyncSource<S> {
    fn drop(&mut self) {
        let shared = self.shared.borrow();

        if let State::AwaitingReadable(fd) = shared.state {
            if let Err(err) = shared.handle.remove_reader(fd) {
                warn!("failed to remove reader for {} fd {}: {}", S::NAME, fd, err);
            }
        }
    }
}

impl<S: Source> fmt::Debug for AsyncSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        f.debug_struct("AsyncSource")
            .field("source", &shared.source)
            .field("state", &shared.state)
            .field("waiters", &shared.getters.len())
            .field("maxsize", &shared.maxsize)
            .finish()
    }
}

fn overflow() -> Error {
    Error::new(ErrorKind::Overflow, "get_event")
}

fn register<S>(rc: &Rc<RefCell<Shared<S>>>, shared: &mut Shared<S>) -> Result<()>
    where
        S       : Source + 'static,
        S::Event: 'static,
{
    let fd   = shared.source.fileno()?;
    let weak = Rc::downgrade(rc);

    let reader: Reader = Rc::new(move || {
        if let Some(shared) = weak.upgrade() {
            on_readable(&shared);
        }
    });

    shared.handle.add_reader(fd, reader)?;
    shared.state = State::AwaitingReadable(fd);

    Ok(())
}

/// Removes the reader, if one is registered
fn deregister<S: Source>(shared: &mut Shared<S>) -> Result<()> {
    if let State::AwaitingReadable(fd) = shared.state {
        shared.state = State::Idle;
        shared.handle.remove_reader(fd)?;
    }
    Ok(())
}

/// Drops cancelled waiters, and stops watching once none are left
fn prune<S: Source>(shared: &mut Shared<S>) -> Result<()> {
    shared.getters.retain(|getter| !getter.is_canceled());
    if shared.getters.is_empty() {
        deregister(shared)?;
    }
    Ok(())
}

/// Hands buffered events to waiters, oldest first
fn dispatch<S: Source>(shared: &mut Shared<S>) {
    shared.getters.retain(|getter| !getter.is_canceled());

    while shared.source.pending_len() > 0 {
        let getter = match shared.getters.pop_front() {
            Some(getter) => getter,
            None         => break,
        };
        let event = match shared.source.pop_pending() {
            Some(event) => event,
            None        => break,
        };

        if let Err(Ok(event)) = getter.send(Ok(event)) {
            shared.source.unread(event);
        }
    }
}

fn on_readable<S>(rc: &Rc<RefCell<Shared<S>>>)
    where
        S       : Source + 'static,
        S::Event: 'static,
{
    let mut guard = rc.borrow_mut();
    let shared    = &mut *guard;

    if let Err(err) = deregister(shared) {
        return fail_all(shared, err);
    }
    let fd = match shared.source.fileno() {
        Ok(fd)   => fd,
        Err(err) => return fail_all(shared, err),
    };

    // Data nobody asks for stays in the kernel
    shared.getters.retain(|getter| !getter.is_canceled());
    if shared.getters.is_empty() {
        trace!("{} fd {}: readable, but nobody is waiting", S::NAME, fd);
        return;
    }

    match shared.source.refill() {
        Ok(count) => {
            trace!("{} fd {}: {} events for {} waiters",
                S::NAME, fd, count, shared.getters.len());
        }
        Err(err) => return fail_all(shared, err),
    }

    dispatch(shared);

    if shared.maxsize > 0 && shared.source.pending_len() > shared.maxsize {
        debug!(
            "{} fd {}: {} events exceed maxsize {}",
            S::NAME, fd, shared.source.pending_len(), shared.maxsize,
        );
        shared.poisoned = true;
        shared.source.truncate();
        return fail_all(shared, overflow());
    }

    if !shared.getters.is_empty() {
        if let Err(err) = register(rc, shared) {
            fail_all(shared, err);
        }
    }
}

fn fail_all<S: Source>(shared: &mut Shared<S>, err: Error) {
    for getter in shared.getters.drain(..) {
        let _ = getter.send(Err(err.clone()));
    }
}


/// Future returned by [`AsyncSource::get_event`]
#[must_use = "futures do nothing unless polled"]
pub struct GetEvent<E> {
    state : GetEventState<E>,
    cancel: Option<Box<dyn FnOnce(Option<E>)>>,
}

enum GetEventState<E> {
    Ready(Option<Result<E>>),
    Waiting(oneshot::Receiver<Result<E>>),
}

impl<E> GetEvent<E> {
    fn ready(result: Result<E>) -> Self {
        GetEvent {
            state : GetEventState::Ready(Some(result)),
            cancel: None,
        }
    }
}

impl<E> Drop for GetEvent<E> {
    fn drop(&mut self) {
        // An event already sent here, but never polled, goes back to the source
        let unclaimed = match &mut self.state {
            GetEventState::Waiting(receiver) => match receiver.try_recv() {
                Ok(Some(Ok(event))) => Some(event),
                _                   => None,
            },
            GetEventState::Ready(_) => None,
        };

        // The receiver must be gone before the source prunes its waiters
        self.state = GetEventState::Ready(None);
        if let Some(cancel) = self.cancel.take() {
            cancel(unclaimed);
        }
    }
}

impl<E> Unpin for GetEvent<E> {}

impl<E> Future for GetEvent<E> {
    type Output = Result<E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> task::Poll<Self::Output> {
        match &mut self.state {
            GetEventState::Ready(result) => {
                task::Poll::Ready(
                    result.take().unwrap_or_else(|| Err(Error::closed("get_event")))
                )
            }
            GetEventState::Waiting(receiver) => {
                Pin::new(receiver)
                    .poll(cx)
                    .map(|result| {
                        result.unwrap_or_else(|oneshot::Canceled| {
                            Err(Error::closed("get_event"))
                        })
                    })
            }
        }
    }
}

impl<E> fmt::Debug for GetEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            GetEventState::Ready(_)   => "ready",
            GetEventState::Waiting(_) => "waiting",
        };
        f.debug_struct("GetEvent").field("state", &state).finish()
    }
}


#[cfg(test)]
mod tests {
    use std::{
        os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd},
        time::Duration,
    };

    use crate::{
        error::{Error, Result},
        source::{EventSource, Source},
        ErrorKind,
    };

    use super::{AsyncSource, EventLoop};

    /// Every byte written to a pipe is one event
    struct Bytes;

    impl Source for Bytes {
        type Event = u8;
        const NAME: &'static str = "bytes";

        fn decode(&self, buffer: &[u8]) -> Result<Vec<u8>> {
            Ok(buffer.to_vec())
        }
    }

    fn pipe() -> (RawFd, OwnedFd) {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
        assert_eq!(ret, 0, "Failed to create pipe");

        (fds[0], unsafe { OwnedFd::from_raw_fd(fds[1]) })
    }

    fn write(fd: &OwnedFd, data: &[u8]) {
        let written = unsafe {
            libc::write(fd.as_raw_fd(), data.as_ptr() as *const _, data.len())
        };
        assert_eq!(written, data.len() as isize);
    }

    /// Rejects everything it reads
    struct Faulty;

    impl Source for Faulty {
        type Event = u8;
        const NAME: &'static str = "faulty";

        fn decode(&self, _: &[u8]) -> Result<Vec<u8>> {
            Err(Error::protocol("faulty"))
        }
    }

    fn setup(maxsize: usize) -> (EventLoop, AsyncSource<Bytes>, OwnedFd) {
        let event_loop       = EventLoop::new().unwrap();
        let (reader, writer) = pipe();
        let source = AsyncSource::new(
            &event_loop.handle(),
            EventSource::from_raw(reader, true, Bytes),
            maxsize,
        ).unwrap();

        (event_loop, source, writer)
    }

    #[test]
    fn waiters_are_served_in_order() {
        let (event_loop, source, writer) = setup(0);

        let first  = source.get_event();
        let second = source.get_event();
        let third  = source.get_event();
        write(&writer, b"abc");

        assert_eq!(event_loop.block_on(first).unwrap().unwrap(), b'a');
        assert_eq!(event_loop.block_on(second).unwrap().unwrap(), b'b');
        assert_eq!(event_loop.block_on(third).unwrap().unwrap(), b'c');
        assert_eq!(source.qsize(), 0);
    }

    #[test]
    fn leftover_events_stay_buffered() {
        let (event_loop, source, writer) = setup(0);

        let first = source.get_event();
        write(&writer, b"xyz");

        assert_eq!(event_loop.block_on(first).unwrap().unwrap(), b'x');
        assert_eq!(source.qsize(), 2);
        assert_eq!(event_loop.block_on(source.get_event()).unwrap().unwrap(), b'y');
        assert_eq!(source.get_event_nowait().unwrap(), Some(b'z'));
        assert_eq!(source.get_event_nowait().unwrap(), None);
    }

    #[test]
    fn cancelled_waiters_are_skipped() {
        let (event_loop, source, writer) = setup(0);

        let first  = source.get_event();
        let second = source.get_event();
        drop(first);
        write(&writer, b"pq");

        assert_eq!(event_loop.block_on(second).unwrap().unwrap(), b'p');
        assert_eq!(event_loop.block_on(source.get_event()).unwrap().unwrap(), b'q');
    }

    #[test]
    fn exceeding_maxsize_poisons_the_source() {
        let (event_loop, source, writer) = setup(1);
        assert_eq!(source.maxsize(), 1);

        let first = source.get_event();
        write(&writer, b"abc");

        assert_eq!(event_loop.block_on(first).unwrap().unwrap(), b'a');
        assert_eq!(source.qsize(), 0);

        let err = event_loop.block_on(source.get_event()).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Overflow);
        assert_eq!(source.get_event_nowait().unwrap_err().kind(), ErrorKind::Overflow);
    }

    #[test]
    fn close_fails_outstanding_waiters() {
        let (event_loop, source, _writer) = setup(0);

        let waiting = source.get_event();
        source.close().unwrap();

        let err = event_loop.block_on(waiting).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);

        let err = event_loop.block_on(source.get_event()).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert_eq!(source.close().unwrap_err().kind(), ErrorKind::Closed);
    }

    #[test]
    fn dropped_last_waiter_leaves_data_in_the_kernel() {
        let (event_loop, source, writer) = setup(1);

        drop(source.get_event());
        write(&writer, b"abc");

        assert_eq!(event_loop.turn(Some(Duration::ZERO)).unwrap(), 0);
        assert_eq!(source.qsize(), 0);
        assert_eq!(source.get_event_nowait().unwrap(), Some(b'a'));
    }

    #[test]
    fn event_sent_to_a_dropped_waiter_goes_to_the_next() {
        let (event_loop, source, writer) = setup(0);

        let first  = source.get_event();
        let second = source.get_event();
        write(&writer, b"a");

        assert_eq!(event_loop.turn(None).unwrap(), 1);
        drop(first);

        assert_eq!(event_loop.block_on(second).unwrap().unwrap(), b'a');
        assert_eq!(source.qsize(), 0);
    }

    #[test]
    fn closing_through_with_source_releases_the_descriptor() {
        let (event_loop, source, _writer) = setup(0);

        let waiting = source.get_event();
        source.with_source(|source| source.close()).unwrap().unwrap();

        let err = event_loop.block_on(waiting).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);

        let err = event_loop
            .block_on(futures::future::pending::<()>())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stalled);
        drop(source);

        // Likely to reuse the descriptor number just closed
        let (reader, writer) = pipe();
        let next = AsyncSource::new(
            &event_loop.handle(),
            EventSource::from_raw(reader, true, Bytes),
            0,
        ).unwrap();

        let event = next.get_event();
        write(&writer, b"n");
        assert_eq!(event_loop.block_on(event).unwrap().unwrap(), b'n');
    }

    #[test]
    fn with_source_keeps_waiters_registered() {
        let (event_loop, source, writer) = setup(0);

        let waiting = source.get_event();
        let fd = source.with_source(|source| source.fileno()).unwrap().unwrap();
        assert_eq!(source.fileno().unwrap(), fd);

        write(&writer, b"k");
        assert_eq!(event_loop.block_on(waiting).unwrap().unwrap(), b'k');
    }

    #[test]
    fn refill_error_reaches_every_waiter() {
        let event_loop       = EventLoop::new().unwrap();
        let (reader, writer) = pipe();
        let source = AsyncSource::new(
            &event_loop.handle(),
            EventSource::from_raw(reader, true, Faulty),
            0,
        ).unwrap();

        let first  = source.get_event();
        let second = source.get_event();
        write(&writer, b"x");

        let err = event_loop.block_on(first).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        let err = event_loop.block_on(second).unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn block_on_without_readers_stalls() {
        let event_loop = EventLoop::new().unwrap();

        let err = event_loop
            .block_on(futures::future::pending::<()>())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stalled);
    }
}
