//! Remote session capability surface

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::error::CsError;

/// An authenticated, multiplexed session to one workspace.
///
/// Every blocking call takes the caller's cancellation token and returns
/// `CsError::Canceled` promptly once it fires. Control-plane calls
/// (`start_service`, `open_channel`, `run_command`) are serialized by the
/// implementation; data on channels that are already open is not.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// A bidirectional byte stream bound to one remote port or command
    type Channel: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Start a named service inside the workspace.
    ///
    /// Returns the port it listens on and the login user to present to it.
    async fn start_service(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<(u16, String), CsError>;

    /// Open a new logical channel to `port` inside the workspace
    async fn open_channel(
        &self,
        cancel: &CancellationToken,
        port: u16,
    ) -> Result<Self::Channel, CsError>;

    /// Run one command; the returned channel streams its stdout
    async fn run_command(
        &self,
        cancel: &CancellationToken,
        working_dir: Option<&str>,
        command: &str,
    ) -> Result<Self::Channel, CsError>;

    /// Close the session. Idempotent.
    async fn close(&self) -> Result<(), CsError>;

    fn is_closed(&self) -> bool;

    /// Resolves once the session is closed, from either side
    async fn closed(&self);
}
