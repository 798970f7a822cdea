#![warn(missing_docs)]

//! Event sources backed by Linux file descriptors
//!
//! The kernel exposes a handful of event mechanisms as readable file
//! descriptors: [inotify], [fanotify], [eventfd], [signalfd] and
//! [timerfd]. This crate wraps each of them in an [`EventSource`], which
//! owns the descriptor, reads whatever the kernel has queued in a single
//! `read`, decodes it into typed events and hands them out in order.
//!
//! ```no_run
//! use fdevents::{inotify::{InitFlags, WatchMask}, Inotify};
//!
//! let mut inotify = Inotify::open(InitFlags::CLOEXEC)?;
//! inotify.watch("/tmp", WatchMask::CREATE | WatchMask::DELETE)?;
//!
//! for event in &mut inotify {
//!     println!("{:?}", event?);
//! }
//! # Ok::<(), fdevents::Error>(())
//! ```
//!
//! Sources can also be driven asynchronously, either through the
//! single-threaded [`reactor`] or, with the `stream` feature, as a tokio
//! [`EventStream`].
//!
//! [inotify]: http://man7.org/linux/man-pages/man7/inotify.7.html
//! [fanotify]: http://man7.org/linux/man-pages/man7/fanotify.7.html
//! [eventfd]: http://man7.org/linux/man-pages/man2/eventfd.2.html
//! [signalfd]: http://man7.org/linux/man-pages/man2/signalfd.2.html
//! [timerfd]: http://man7.org/linux/man-pages/man2/timerfd_create.2.html

#[macro_use]
extern crate bitflags;


mod error;
mod source;
mod sys;

#[cfg(feature = "stream")]
mod stream;

pub mod eventfd;
pub mod fanotify;
pub mod inotify;
pub mod reactor;
pub mod signalfd;
pub mod timerfd;


pub use crate::error::{
    Error,
    ErrorKind,
    Result,
};
pub use crate::source::{
    EventSource,
    FdIo,
    Iter,
    Kernel,
    Source,
};
pub use crate::eventfd::{
    Eventfd,
    EventfdFlags,
};
pub use crate::fanotify::Fanotify;
pub use crate::inotify::Inotify;
pub use crate::signalfd::Signalfd;
pub use crate::timerfd::Timerfd;

#[cfg(feature = "stream")]
pub use crate::stream::EventStream;
