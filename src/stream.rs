use std::{
    os::unix::io::OwnedFd,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::io::{
    unix::AsyncFd,
    Interest,
};

use crate::{
    error::Result,
    source::{EventSource, Source},
    sys::{self, Syscall},
};


/// Stream of events
///
/// Yields the events of an [`EventSource`], waiting for readiness on tokio's
/// reactor. Created by [`EventSource::into_stream`].
///
/// The stream ends once the source is closed, preferably with
/// [`EventStream::close`].
#[derive(Debug)]
pub struct EventStream<S: Source> {
    // A duplicate of the source's descriptor, registered with tokio in its
    // place. Its number stays taken until it is deregistered, no matter
    // when the source itself is closed.
    fd    : Option<AsyncFd<OwnedFd>>,
    source: EventSource<S>,
}

impl<S: Source> EventStream<S> {
    fn new(mut source: EventSource<S>) -> Result<Self> {
        source.set_nonblocking(true)?;

        let copy = sys::dup(source.fileno()?)?;
        let fd   = AsyncFd::with_interest(copy, Interest::READABLE)
            .map_err(|err| Syscall::Epoll.io_error(err))?;

        Ok(EventStream {
            fd: Some(fd),
            source,
        })
    }

    /// The source this stream reads from
    pub fn get_ref(&self) -> &EventSource<S> {
        &self.source
    }

    /// The source this stream reads from, for adding watches and the like
    ///
    /// Closing the source through this ends the stream. The kernel object
    /// is only released once the stream is polled again or dropped; use
    /// [`EventStream::close`] to release it right away.
    pub fn get_mut(&mut self) -> &mut EventSource<S> {
        &mut self.source
    }

    /// Deregisters from tokio and closes the source
    pub fn close(&mut self) -> Result<()> {
        self.release();
        self.source.close()
    }

    fn release(&mut self) {
        // Dropping the `AsyncFd` deregisters the duplicate, then closes it
        self.fd = None;
    }
}

impl<S: Source> EventSource<S> {
    /// Turns the source into a [`Stream`]
    ///
    /// Switches the source to non-blocking mode. Must be called from within
    /// a tokio runtime that has IO enabled.
    pub fn into_stream(self) -> Result<EventStream<S>> {
        EventStream::new(self)
    }
}

// Nothing is structurally pinned
impl<S: Source> Unpin for EventStream<S> {}

impl<S: Source> Stream for EventStream<S> {
    type Item = Result<S::Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<Self::Item>>
    {
        let this = Pin::into_inner(self);

        loop {
            if this.source.is_closed() {
                this.release();
                return Poll::Ready(None);
            }
            if let Some(event) = this.source.pop_pending() {
                return Poll::Ready(Some(Ok(event)));
            }

            let fd = match &this.fd {
                Some(fd) => fd,
                None     => return Poll::Ready(None),
            };
            let mut guard = match fd.poll_read_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(err))  => {
                    return Poll::Ready(Some(Err(Syscall::Epoll.io_error(err))));
                }
                Poll::Pending => return Poll::Pending,
            };

            match this.source.refill() {
                Ok(0)    => guard.clear_ready(),
                Ok(_)    => {}
                Err(err) => return Poll::Ready(Some(Err(err))),
            }
        }
    }
}
