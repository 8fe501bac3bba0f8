//! Logical channel: one byte stream multiplexed over a session

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::PollSender;

use cs_protocol::{ChannelId, Frame, Message};

use super::multiplexer::{ChannelEvent, SessionShared};

/// Largest payload put in a single data frame
const MAX_CHUNK: usize = 32 * 1024;

/// A bidirectional byte stream bound to one remote port or command.
///
/// Reads fail with `ConnectionAborted` once the session closes; writes fail
/// with `BrokenPipe`. `shutdown` sends EOF for the write direction only.
/// Dropping the channel closes it on the remote side.
pub struct LogicalChannel {
    id: ChannelId,
    shared: Arc<SessionShared>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    /// Bytes sitting in `inbound`, shared with the session's reader task
    buffered: Arc<AtomicUsize>,
    /// Unread remainder of the last data frame
    leftover: Bytes,
    read_eof: bool,
    outbound: PollSender<Frame>,
    eof_sent: bool,
    /// Remote already closed or never opened the channel
    remote_closed: bool,
}

impl LogicalChannel {
    pub(crate) fn new(
        id: ChannelId,
        shared: Arc<SessionShared>,
        inbound: mpsc::UnboundedReceiver<ChannelEvent>,
        buffered: Arc<AtomicUsize>,
    ) -> Self {
        let outbound = PollSender::new(shared.outbound.clone());
        Self {
            id,
            shared,
            inbound,
            buffered,
            leftover: Bytes::new(),
            read_eof: false,
            outbound,
            eof_sent: false,
            remote_closed: false,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub(crate) fn mark_remote_closed(&mut self) {
        self.remote_closed = true;
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "session closed")
}

impl AsyncRead for LogicalChannel {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        loop {
            if !this.leftover.is_empty() {
                let n = this.leftover.len().min(buf.remaining());
                buf.put_slice(&this.leftover.split_to(n));
                return Poll::Ready(Ok(()));
            }

            if this.read_eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(this.inbound.poll_recv(cx)) {
                Some(ChannelEvent::Data(data)) => {
                    this.buffered.fetch_sub(data.len(), Ordering::AcqRel);
                    this.leftover = data;
                }
                Some(ChannelEvent::Eof) => this.read_eof = true,
                Some(ChannelEvent::Closed) => {
                    this.read_eof = true;
                    this.remote_closed = true;
                }
                Some(ChannelEvent::Error(message)) => {
                    this.remote_closed = true;
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        message,
                    )));
                }
                Some(ChannelEvent::Overflow) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::Other,
                        "channel buffer limit exceeded",
                    )))
                }
                None => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "session closed",
                    )))
                }
            }
        }
    }
}

impl AsyncWrite for LogicalChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.shared.shutdown.is_cancelled() || this.eof_sent {
            return Poll::Ready(Err(broken_pipe()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        ready!(this.outbound.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        let n = buf.len().min(MAX_CHUNK);
        let frame = Frame::new(this.id, Message::Data(Bytes::copy_from_slice(&buf[..n])));
        this.outbound.send_item(frame).map_err(|_| broken_pipe())?;

        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Frames are flushed by the session writer
        if self.shared.shutdown.is_cancelled() {
            return Poll::Ready(Err(broken_pipe()));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.eof_sent || this.remote_closed {
            return Poll::Ready(Ok(()));
        }
        if this.shared.shutdown.is_cancelled() {
            return Poll::Ready(Err(broken_pipe()));
        }

        ready!(this.outbound.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        this.outbound
            .send_item(Frame::new(this.id, Message::ChannelEof))
            .map_err(|_| broken_pipe())?;
        this.eof_sent = true;

        Poll::Ready(Ok(()))
    }
}

impl Drop for LogicalChannel {
    fn drop(&mut self) {
        self.shared.channels.remove(&self.id);
        if !self.remote_closed && !self.shared.shutdown.is_cancelled() {
            let close = Frame::new(self.id, Message::ChannelClose);
            match self.shared.outbound.try_send(close) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(close)) => self.send_close_later(close),
            }
        }
        tracing::trace!("Dropped {}", self.id);
    }
}

impl LogicalChannel {
    /// Wait for room in the outbound queue off the dropping thread
    fn send_close_later(&self, close: Frame) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime to deliver close of {}", self.id);
            return;
        };
        let outbound = self.shared.outbound.clone();
        let shutdown = self.shared.shutdown.clone();
        let id = self.id;
        runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                sent = outbound.send(close) => if sent.is_err() {
                    tracing::debug!("Session gone before close of {} was queued", id);
                },
            }
        });
    }
}

impl std::fmt::Debug for LogicalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalChannel")
            .field("id", &self.id)
            .field("read_eof", &self.read_eof)
            .field("eof_sent", &self.eof_sent)
            .finish()
    }
}
