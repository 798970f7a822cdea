use std::time::Duration;

use futures::future::{self, Either};
use fdevents::{
    reactor::{AsyncSource, EventLoop},
    signalfd::{self, Signalfd, SignalfdFlags},
    timerfd::{Clock, TimerfdFlags},
    Timerfd,
};


fn main() -> fdevents::Result<()> {
    env_logger::init();

    let event_loop = EventLoop::new()?;
    let handle     = event_loop.handle();

    let mut timer = Timerfd::open(Clock::Monotonic, TimerfdFlags::empty())?;
    timer.set_reoccuring(Duration::from_secs(1), None, false)?;
    let timer = AsyncSource::new(&handle, timer, 16)?;

    signalfd::block([libc::SIGINT])?;
    let signals = Signalfd::open([libc::SIGINT], SignalfdFlags::empty())?;
    let signals = AsyncSource::new(&handle, signals, 1)?;

    println!("Ticking every second, press Ctrl-C to stop...");

    let mut ticks     = 0;
    let mut interrupt = signals.get_event();
    loop {
        match event_loop.block_on(future::select(interrupt, timer.get_event()))? {
            Either::Left((info, _)) => {
                println!("Stopped by {:?} after {} ticks", info?.name(), ticks);
                return Ok(());
            }
            Either::Right((expirations, pending)) => {
                ticks += expirations?;
                println!("tick {}", ticks);
                interrupt = pending;
            }
        }
    }
}
