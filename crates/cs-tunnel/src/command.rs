//! Remote command channel
//!
//! Runs a single command inside the workspace and exposes its stdout as a
//! byte stream. Used for bootstrap queries such as the dev container id.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use tokio_util::sync::CancellationToken;

use cs_core::{CsError, RemoteSession};

/// Lists the running dev container of the workspace
pub const CONTAINER_ID_COMMAND: &str =
    "docker ps -aq --filter label=Type=codespaces --filter status=running";

/// Stdout of a remote command.
///
/// Owned by the caller; must be closed (or dropped) to release the channel.
/// Closing only stops local reading, the remote command is not signalled.
pub struct CommandOutput<C> {
    channel: C,
}

impl<C> CommandOutput<C>
where
    C: AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    /// Release the underlying channel
    pub async fn close(mut self) -> io::Result<()> {
        match self.channel.shutdown().await {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    }
}

impl<C: AsyncRead + Unpin> AsyncRead for CommandOutput<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.channel).poll_read(cx, buf)
    }
}

/// Run `command` in the workspace, optionally from `working_dir`.
///
/// Fails if the session is closed or `cancel` fires before the command is
/// accepted.
pub async fn run_command<S: RemoteSession>(
    session: &S,
    cancel: &CancellationToken,
    working_dir: Option<&str>,
    command: &str,
) -> Result<CommandOutput<S::Channel>, CsError> {
    tracing::debug!("Running remote command: {}", command);
    let channel = session.run_command(cancel, working_dir, command).await?;
    Ok(CommandOutput { channel })
}

/// Read the first line of a command's output, without the line terminator.
///
/// Returns an empty string when the command printed nothing.
pub async fn read_first_line<R: AsyncRead + Unpin>(output: R) -> io::Result<String> {
    let mut reader = BufReader::new(output);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Id of the workspace's running dev container
pub async fn container_id<S: RemoteSession>(
    session: &S,
    cancel: &CancellationToken,
) -> Result<String, CsError> {
    let mut output = run_command(session, cancel, None, CONTAINER_ID_COMMAND).await?;

    let line = tokio::select! {
        _ = cancel.cancelled() => return Err(CsError::Canceled),
        line = read_first_line(&mut output) => line?,
    };
    output.close().await?;

    if line.is_empty() {
        return Err(CsError::Session("no running dev container found".to_string()));
    }
    Ok(line)
}
