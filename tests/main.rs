// This test suite is incomplete and doesn't cover all available functionality.
// Contributions to improve test coverage would be highly appreciated!

use std::{
    cell::RefCell,
    fs::File,
    io::Write,
    os::unix::io::RawFd,
    time::Duration,
};

use fdevents::{
    eventfd::EventfdFlags,
    fanotify::{self, Fanotify},
    inotify::{self, EventMask, Inotify, WatchMask},
    reactor::{AsyncSource, EventLoop},
    signalfd::{self, Signalfd, SignalfdFlags},
    timerfd::{Clock, TimerSpec, Timerfd, TimerfdFlags},
    Eventfd,
    ErrorKind,
    EventSource,
    FdIo,
    Source,
};
use tempdir::TempDir;


#[test]
fn eventfd_should_sum_increments_between_reads() {
    let mut counter = Eventfd::open(0, EventfdFlags::NONBLOCK).unwrap();

    counter.increment(36).unwrap();
    assert_eq!(counter.read().unwrap(), Some(36));

    for _ in 0..5 {
        counter.increment(36).unwrap();
    }
    assert_eq!(counter.read().unwrap(), Some(180));

    assert_eq!(counter.read().unwrap(), None);
}

#[test]
fn eventfd_in_semaphore_mode_should_count_down_by_one() {
    let flags = EventfdFlags::NONBLOCK | EventfdFlags::SEMAPHORE;
    let mut counter = Eventfd::open(2, flags).unwrap();

    assert_eq!(counter.read().unwrap(), Some(1));
    assert_eq!(counter.read().unwrap(), Some(1));
    assert_eq!(counter.read().unwrap(), None);
}

#[test]
fn eventfd_with_initial_value_should_be_readable_right_away() {
    let mut counter = Eventfd::open(7, EventfdFlags::empty()).unwrap();

    assert_eq!(
        counter.wait(Some(Duration::from_secs(1))).unwrap(),
        Some(7),
    );
    assert_eq!(counter.wait(Some(Duration::from_millis(10))).unwrap(), None);
}

#[test_log::test]
fn inotify_should_report_created_file_by_name() {
    let dir = TempDir::new("fdevents-test").unwrap();

    let mut inotify = Inotify::open(inotify::InitFlags::empty()).unwrap();
    let wd = inotify.watch(dir.path(), WatchMask::CREATE).unwrap();

    File::create(dir.path().join("file")).unwrap();

    let event = inotify.read_event().unwrap().unwrap();
    assert_eq!(event.wd, wd);
    assert!(event.is_create());
    assert!(!event.is_dir());
    assert_eq!(event.name().unwrap(), "file");
}

#[test]
fn inotify_should_report_modification_of_watched_file() {
    let dir  = TempDir::new("fdevents-test").unwrap();
    let path = dir.path().join("file");
    let mut file = File::create(&path).unwrap();

    let mut inotify = Inotify::open(inotify::InitFlags::NONBLOCK).unwrap();
    let wd = inotify.watch(&path, WatchMask::MODIFY).unwrap();

    assert!(inotify.read_events().unwrap().is_empty());

    write!(file, "This should trigger an inotify event.").unwrap();

    let events = inotify.read_events().unwrap();
    assert!(!events.is_empty());
    for event in events {
        assert_eq!(event.wd, wd);
        assert!(event.mask.contains(EventMask::MODIFY));
        assert!(event.name().is_none());
    }
}

#[test]
fn inotify_unwatch_should_queue_ignored_event() {
    let dir = TempDir::new("fdevents-test").unwrap();

    let mut inotify = Inotify::open(inotify::InitFlags::empty()).unwrap();
    let wd = inotify.watch(dir.path(), WatchMask::CREATE).unwrap();

    inotify.unwatch(wd).unwrap();

    let event = inotify.read_event().unwrap().unwrap();
    assert_eq!(event.wd, wd);
    assert!(event.is_ignored());
}

#[test]
fn inotify_watch_on_missing_path_should_fail_with_not_found() {
    let dir = TempDir::new("fdevents-test").unwrap();

    let mut inotify = Inotify::open(inotify::InitFlags::NONBLOCK).unwrap();
    let err = inotify
        .watch(dir.path().join("missing"), WatchMask::ALL_EVENTS)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
}

#[test]
fn closing_twice_should_fail_with_closed() {
    let mut inotify = Inotify::open(inotify::InitFlags::NONBLOCK).unwrap();

    inotify.close().unwrap();
    assert!(inotify.is_closed());

    assert_eq!(inotify.close().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(inotify.read_event().unwrap_err().kind(), ErrorKind::Closed);
    assert_eq!(inotify.fileno().unwrap_err().kind(), ErrorKind::Closed);
}

#[test]
fn one_off_timer_should_expire_once() {
    let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty()).unwrap();
    timer.set_one_off(Duration::from_millis(10), false).unwrap();

    assert_eq!(timer.read_event().unwrap(), Some(1));
    assert!(!timer.get_current().unwrap().is_enabled());
}

#[test]
fn periodic_timer_should_count_missed_expirations() {
    let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty()).unwrap();
    timer.set_reoccuring(Duration::from_millis(5), None, false).unwrap();

    std::thread::sleep(Duration::from_millis(30));

    let expirations = timer.read_event().unwrap().unwrap();
    assert!(expirations >= 2, "only {} expirations", expirations);

    timer.disable().unwrap();
}

#[test]
fn zeroed_timer_update_should_disarm_after_any_previous_setting() {
    let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty()).unwrap();

    timer.set_reoccuring(Duration::from_millis(50), None, false).unwrap();
    let old = timer.update(TimerSpec::default(), false).unwrap();
    assert_eq!(old.period, Duration::from_millis(50));

    let old = timer.update(TimerSpec::default(), false).unwrap();
    assert_eq!(old, TimerSpec::default());

    assert_eq!(timer.get_current().unwrap(), TimerSpec::default());
    assert_eq!(timer.wait(Some(Duration::from_millis(100))).unwrap(), None);
}

#[test]
fn explicit_zero_offset_for_periodic_timer_should_be_rejected() {
    let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::NONBLOCK).unwrap();

    let err = timer
        .set_reoccuring(Duration::from_secs(1), Some(Duration::ZERO), false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test_log::test]
fn signalfd_should_deliver_blocked_signal() {
    signalfd::block([libc::SIGUSR1]).unwrap();

    let mut signals = Signalfd::open([libc::SIGUSR1], SignalfdFlags::NONBLOCK).unwrap();
    assert!(signals.contains(libc::SIGUSR1));
    assert_eq!(signals.read_event().unwrap(), None);

    unsafe { libc::raise(libc::SIGUSR1) };

    let info = signals.read_event().unwrap().unwrap();
    assert_eq!(info.signo, libc::SIGUSR1 as u32);
    assert_eq!(info.name(), Some("SIGUSR1"));

    signals.disable([libc::SIGUSR1]).unwrap();
    assert!(signals.signals().is_empty());

    signalfd::unblock([libc::SIGUSR1]).unwrap();
}

#[test]
fn fanotify_should_open_or_report_missing_privileges() {
    match Fanotify::open(fanotify::InitFlags::NONBLOCK, libc::O_RDONLY) {
        Ok(mut fanotify) => {
            assert_eq!(fanotify.read_event().unwrap().map(|_| ()), None);
            fanotify.close().unwrap();
        }
        Err(err) => {
            assert!(
                matches!(
                    err.kind(),
                    ErrorKind::PermissionDenied | ErrorKind::Unsupported
                ),
                "unexpected error: {}", err,
            );
        }
    }
}

#[test_log::test]
fn async_source_should_resolve_waiters_in_request_order() {
    let event_loop = EventLoop::new().unwrap();

    let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty()).unwrap();
    timer.set_reoccuring(Duration::from_millis(5), None, false).unwrap();
    let timer = AsyncSource::new(&event_loop.handle(), timer, 0).unwrap();

    let first  = timer.get_event();
    let second = timer.get_event();

    let first = event_loop.block_on(first).unwrap().unwrap();
    assert!(first >= 1);

    let second = event_loop.block_on(second).unwrap().unwrap();
    assert!(second >= 1);

    timer.close().unwrap();
    let err = event_loop.block_on(timer.get_event()).unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
}

#[tokio::test]
async fn eventfd_stream_should_yield_counter_values() {
    use futures::StreamExt;

    let counter = Eventfd::open(0, EventfdFlags::empty()).unwrap();
    let mut stream = counter.into_stream().unwrap();

    stream.get_mut().increment(5).unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), 5);

    stream.get_mut().increment(2).unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), 2);

    stream.close().unwrap();
    assert!(stream.next().await.is_none());
    assert_eq!(stream.get_ref().fileno().unwrap_err().kind(), ErrorKind::Closed);
}

#[tokio::test]
async fn stream_closed_through_its_source_should_not_disturb_later_streams() {
    use futures::StreamExt;

    let mut closed = Eventfd::open(0, EventfdFlags::empty())
        .unwrap()
        .into_stream()
        .unwrap();
    closed.get_mut().close().unwrap();

    // Likely to get the descriptor number the first stream just gave up
    let mut open = Eventfd::open(0, EventfdFlags::empty())
        .unwrap()
        .into_stream()
        .unwrap();
    drop(closed);

    open.get_mut().increment(3).unwrap();
    let event = tokio::time::timeout(Duration::from_millis(500), open.next())
        .await
        .expect("Stream was never woken up");
    assert_eq!(event.unwrap().unwrap(), 3);
}

#[test]
fn event_source_should_run_against_custom_descriptor_io() {
    /// One event per line
    struct Lines;

    impl Source for Lines {
        type Event = String;
        const NAME: &'static str = "lines";

        fn decode(&self, buffer: &[u8]) -> fdevents::Result<Vec<String>> {
            Ok(String::from_utf8_lossy(buffer).lines().map(str::to_owned).collect())
        }
    }

    /// Serves a single canned chunk of data
    struct Canned(RefCell<Option<Vec<u8>>>);

    impl FdIo for Canned {
        fn bytes_available(&self, _: RawFd) -> fdevents::Result<usize> {
            Ok(self.0.borrow().as_ref().map_or(0, Vec::len))
        }

        fn read(&self, _: RawFd, buffer: &mut [u8]) -> fdevents::Result<usize> {
            let data = self.0.borrow_mut().take().unwrap_or_default();
            buffer[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }

        fn poll_readable(&self, _: RawFd, _: Option<Duration>) -> fdevents::Result<bool> {
            Ok(self.0.borrow().is_some())
        }

        fn close(&self, _: RawFd) -> fdevents::Result<()> {
            Ok(())
        }

        fn set_nonblocking(&self, _: RawFd, _: bool) -> fdevents::Result<()> {
            Ok(())
        }
    }

    let io = Canned(RefCell::new(Some(b"first\nsecond\n".to_vec())));
    let mut source = unsafe { EventSource::with_io(-1, false, Lines, io) };

    assert_eq!(source.read_events().unwrap(), vec!["first", "second"]);
    assert!(source.read_events().unwrap().is_empty());
    source.close().unwrap();
}
