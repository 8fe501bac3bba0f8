//! Port forwarding over a session
//!
//! Each accepted local connection gets its own logical channel and its own
//! task. A failing connection is logged and dropped; it never stops the
//! accept loop or disturbs its siblings.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, Stdin, Stdout};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use cs_core::{CsError, ForwardTarget, RemoteSession, TunnelError};

/// Relays local streams to one port inside the workspace
pub struct PortForwarder<S> {
    session: Arc<S>,
    target: ForwardTarget,
}

impl<S: RemoteSession + 'static> PortForwarder<S> {
    pub fn new(session: Arc<S>, target: ForwardTarget) -> Self {
        Self { session, target }
    }

    pub fn target(&self) -> &ForwardTarget {
        &self.target
    }

    /// Accept connections on `listener` until `cancel` fires, the listener
    /// fails or the session closes.
    ///
    /// Always ends with an error saying why. On return every connection
    /// task has been aborted and the listener is closed.
    pub async fn forward_to_listener(
        &self,
        cancel: &CancellationToken,
        listener: TcpListener,
    ) -> TunnelError {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Forwarding {} to {}", addr, self.target);
        }

        let mut connections = JoinSet::new();
        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break TunnelError::Canceled,
                _ = self.session.closed() => break TunnelError::SessionClosed,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("Accepted connection from {}", peer);
                        let session = Arc::clone(&self.session);
                        let port = self.target.port;
                        let conn_cancel = cancel.child_token();
                        connections.spawn(async move {
                            if let Err(e) = relay(&*session, &conn_cancel, port, stream).await {
                                tracing::debug!("Connection from {} ended: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => break TunnelError::Accept(e),
                },
                Some(done) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = done {
                        if e.is_panic() {
                            tracing::error!("Connection task panicked: {}", e);
                        }
                    }
                }
            }
        };

        connections.abort_all();
        while connections.join_next().await.is_some() {}
        drop(listener);

        tracing::debug!("Forwarder for {} stopped: {}", self.target, reason);
        reason
    }

    /// Relay a single already-open stream (e.g. stdio) over one channel.
    ///
    /// Returns once either side finishes, the session closes or `cancel`
    /// fires; the result is always an error saying which.
    pub async fn forward<T>(&self, cancel: &CancellationToken, stream: T) -> TunnelError
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        tokio::select! {
            _ = self.session.closed() => TunnelError::SessionClosed,
            result = relay(&*self.session, cancel, self.target.port, stream) => match result {
                Ok(()) => TunnelError::StreamClosed,
                Err(e) => e,
            },
        }
    }
}

/// Open a channel and copy both ways until EOF, error or cancellation
async fn relay<S, T>(
    session: &S,
    cancel: &CancellationToken,
    port: u16,
    mut stream: T,
) -> Result<(), TunnelError>
where
    S: RemoteSession,
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut channel = match session.open_channel(cancel, port).await {
        Ok(channel) => channel,
        Err(CsError::Canceled) => return Err(TunnelError::Canceled),
        Err(e) => return Err(TunnelError::Open(e.to_string())),
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(TunnelError::Canceled),
        copied = tokio::io::copy_bidirectional(&mut stream, &mut channel) => {
            let (up, down) = copied?;
            tracing::trace!("Relayed {} bytes up, {} bytes down", up, down);
            Ok(())
        }
    }
}

/// The process's stdin and stdout joined into one duplex stream
pub struct StdioStream {
    stdin: Stdin,
    stdout: Stdout,
}

impl StdioStream {
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioStream {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRead for StdioStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdin).poll_read(cx, buf)
    }
}

impl AsyncWrite for StdioStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stdout).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stdout).poll_shutdown(cx)
    }
}
