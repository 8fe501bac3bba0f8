//! Tunnel orchestration
//!
//! Starts the workspace's SSH server, forwards a local endpoint to it and
//! runs the local client against that endpoint. Whichever of the tunnel and
//! the client finishes first decides the outcome; the other is torn down
//! before returning.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cs_api::{check_authorized_keys, resolve_workspace, wait_until_available};
use cs_api::{ApiClient, WorkspacePicker};
use cs_core::config::ApiConfig;
use cs_core::{CsError, ForwardMode, ForwardTarget, RemoteSession, TunnelError};

use crate::client::{LocalClient, ScpCopy, SshShell};
use crate::forward::{PortForwarder, StdioStream};
use crate::session::{MuxSession, SessionConnector};

/// Name of the SSH server service inside the workspace
pub const SSHD_SERVICE: &str = "sshd";

/// How the local end of an SSH tunnel is exposed
#[derive(Debug, Clone, Default)]
pub struct TunnelOptions {
    /// ssh config profile used as the destination instead of `user@localhost`
    pub profile: Option<String>,
    /// Local listener port, 0 to let the OS pick
    pub server_port: u16,
    /// Relay stdin/stdout instead of listening (ssh `ProxyCommand` use)
    pub stdio: bool,
}

impl TunnelOptions {
    /// Reject option combinations that make no sense for stdio mode.
    pub fn validate(&self, codespace: Option<&str>) -> Result<(), CsError> {
        if !self.stdio {
            return Ok(());
        }
        if codespace.map_or(true, str::is_empty) {
            return Err(CsError::Validation(
                "`--stdio` requires explicit `--codespace`".to_string(),
            ));
        }
        if self.server_port != 0 {
            return Err(CsError::Validation(
                "cannot use `--stdio` with `--server-port`".to_string(),
            ));
        }
        if self.profile.is_some() {
            return Err(CsError::Validation(
                "cannot use `--stdio` with `--profile`".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mode(&self) -> ForwardMode {
        if self.stdio {
            ForwardMode::SingleStream
        } else {
            ForwardMode::Listener
        }
    }
}

/// Run an SSH tunnel over `session` and drive `client` through it.
///
/// In stdio mode no client runs; the tunnel relays stdin/stdout until it
/// ends. The session is closed on every path.
pub async fn run_tunnel<S, C>(
    cancel: &CancellationToken,
    session: Arc<S>,
    options: &TunnelOptions,
    client: &C,
) -> Result<(), CsError>
where
    S: RemoteSession + 'static,
    C: LocalClient + ?Sized,
{
    let result = tunnel_and_client(cancel, &session, options, client).await;
    if let Err(e) = session.close().await {
        tracing::debug!("Closing session: {}", e);
    }
    result
}

async fn tunnel_and_client<S, C>(
    cancel: &CancellationToken,
    session: &Arc<S>,
    options: &TunnelOptions,
    client: &C,
) -> Result<(), CsError>
where
    S: RemoteSession + 'static,
    C: LocalClient + ?Sized,
{
    let (remote_port, user) = session.start_service(cancel, SSHD_SERVICE).await?;
    tracing::debug!("{} listening on remote port {} as {}", SSHD_SERVICE, remote_port, user);

    let target = ForwardTarget::new(SSHD_SERVICE, remote_port, options.mode());
    let forwarder = PortForwarder::new(Arc::clone(session), target);

    if options.stdio {
        return Err(CsError::Tunnel(forwarder.forward(cancel, StdioStream::new()).await));
    }

    let listener = TcpListener::bind(("127.0.0.1", options.server_port)).await?;
    let local_port = listener.local_addr()?.port();
    let destination = options
        .profile
        .clone()
        .unwrap_or_else(|| format!("{}@localhost", user));

    let tunnel_cancel = cancel.child_token();
    let mut tunnel: JoinHandle<TunnelError> = tokio::spawn({
        let tunnel_cancel = tunnel_cancel.clone();
        async move { forwarder.forward_to_listener(&tunnel_cancel, listener).await }
    });

    let client_cancel = cancel.child_token();
    let mut tunnel_finished = false;
    let outcome = tokio::select! {
        joined = &mut tunnel => {
            tunnel_finished = true;
            Err(CsError::Tunnel(joined.unwrap_or_else(|e| {
                TunnelError::Io(std::io::Error::other(format!("forwarder task failed: {}", e)))
            })))
        }
        result = client.run(&client_cancel, local_port, &destination) => match result {
            Ok(()) => Ok(()),
            Err(source) => Err(CsError::LocalClient {
                context: client.failure_context(),
                source,
            }),
        },
    };

    // The losing side is stopped before returning; the client future was
    // dropped above, the forwarder is cancelled and awaited here.
    client_cancel.cancel();
    tunnel_cancel.cancel();
    if !tunnel_finished {
        if let Ok(reason) = tunnel.await {
            tracing::debug!("Tunnel stopped: {}", reason);
        }
    }

    outcome
}

/// A local port paired with the workspace port it forwards to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub remote: u16,
    pub local: u16,
}

/// Parse `remote:local` pairs, or a bare `port` meaning the same number on
/// both ends.
pub fn parse_port_pairs(args: &[String]) -> Result<Vec<PortPair>, CsError> {
    let parse = |value: &str, arg: &str| {
        value
            .parse::<u16>()
            .map_err(|_| CsError::Validation(format!("invalid port pair {:?}", arg)))
    };

    args.iter()
        .map(|arg| match arg.split_once(':') {
            Some((remote, local)) => Ok(PortPair {
                remote: parse(remote, arg)?,
                local: parse(local, arg)?,
            }),
            None => {
                let port = parse(arg, arg)?;
                Ok(PortPair {
                    remote: port,
                    local: port,
                })
            }
        })
        .collect()
}

/// Forward every pair until `cancel` fires or one forwarder stops.
///
/// All listeners are bound before any traffic flows, so a busy local port
/// fails the whole call up front. The session is closed on return.
pub async fn forward_ports<S>(
    cancel: &CancellationToken,
    session: Arc<S>,
    pairs: &[PortPair],
) -> Result<(), CsError>
where
    S: RemoteSession + 'static,
{
    let mut listeners = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let listener = TcpListener::bind(("127.0.0.1", pair.local))
            .await
            .map_err(|e| CsError::Validation(format!("local port {}: {}", pair.local, e)));
        match listener {
            Ok(listener) => listeners.push((*pair, listener)),
            Err(e) => {
                let _ = session.close().await;
                return Err(e);
            }
        }
    }

    let forwarders_cancel = cancel.child_token();
    let mut forwarders = tokio::task::JoinSet::new();
    for (pair, listener) in listeners {
        let target = ForwardTarget::new(
            format!("port {}", pair.remote),
            pair.remote,
            ForwardMode::Listener,
        );
        let forwarder = PortForwarder::new(Arc::clone(&session), target);
        let forwarders_cancel = forwarders_cancel.clone();
        forwarders.spawn(async move {
            forwarder
                .forward_to_listener(&forwarders_cancel, listener)
                .await
        });
    }

    let reason = match forwarders.join_next().await {
        Some(Ok(reason)) => reason,
        Some(Err(e)) => TunnelError::Io(std::io::Error::other(format!("forwarder task failed: {}", e))),
        None => TunnelError::Canceled,
    };
    forwarders_cancel.cancel();
    while forwarders.join_next().await.is_some() {}

    if let Err(e) = session.close().await {
        tracing::debug!("Closing session: {}", e);
    }

    match reason {
        TunnelError::Canceled => Ok(()),
        other => Err(CsError::Tunnel(other)),
    }
}

/// Produces a live session to the chosen workspace
#[async_trait]
pub trait Establish: Send + Sync {
    type Session: RemoteSession + 'static;

    async fn establish(
        &self,
        cancel: &CancellationToken,
        codespace: Option<&str>,
    ) -> Result<Arc<Self::Session>, CsError>;
}

/// Establishes sessions through the codespaces API and the session relay
pub struct CodespaceEstablisher {
    api: ApiClient,
    api_config: ApiConfig,
    connector: SessionConnector,
    picker: Box<dyn WorkspacePicker>,
}

impl CodespaceEstablisher {
    pub fn new(
        api: ApiClient,
        api_config: ApiConfig,
        connector: SessionConnector,
        picker: Box<dyn WorkspacePicker>,
    ) -> Self {
        Self {
            api,
            api_config,
            connector,
            picker,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }
}

#[async_trait]
impl Establish for CodespaceEstablisher {
    type Session = MuxSession;

    async fn establish(
        &self,
        cancel: &CancellationToken,
        codespace: Option<&str>,
    ) -> Result<Arc<MuxSession>, CsError> {
        let workspace = resolve_workspace(&self.api, cancel, codespace, &*self.picker).await?;
        let workspace = wait_until_available(&self.api, cancel, &self.api_config, workspace).await?;

        let user = self.api.get_user(cancel).await?;
        let keys_check = tokio::spawn({
            let api = self.api.clone();
            let cancel = cancel.clone();
            async move { check_authorized_keys(&api, &cancel, &user.login).await }
        });

        let connected = match &workspace.connection {
            Some(credential) => self.connector.connect(credential, cancel).await,
            None => Err(CsError::Connect(format!(
                "no connection details for codespace {}",
                workspace.name
            ))),
        };
        let session = match connected {
            Ok(session) => session,
            Err(e) => {
                keys_check.abort();
                return Err(e);
            }
        };

        match keys_check.await {
            Ok(Ok(())) => Ok(Arc::new(session)),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(CsError::Session(format!("authorized keys check failed: {}", e))),
        }
    }
}

/// `ssh`: open a shell (or run a command, or serve stdio) in a workspace.
///
/// Arguments are validated before anything touches the network.
pub async fn run_ssh<E: Establish>(
    establisher: &E,
    cancel: &CancellationToken,
    codespace: Option<&str>,
    options: &TunnelOptions,
    ssh_args: &[String],
) -> Result<(), CsError> {
    options.validate(codespace)?;
    let shell = SshShell::new(ssh_args, options.server_port != 0)?;

    let session = establisher.establish(cancel, codespace).await?;
    run_tunnel(cancel, session, options, &shell).await
}

/// `cp`: copy files to or from a workspace with scp.
pub async fn run_copy<E: Establish>(
    establisher: &E,
    cancel: &CancellationToken,
    codespace: Option<&str>,
    args: &[String],
    recursive: bool,
    expand: bool,
) -> Result<(), CsError> {
    let copy = ScpCopy::new(args, recursive, expand)?;

    let session = establisher.establish(cancel, codespace).await?;
    run_tunnel(cancel, session, &TunnelOptions::default(), &copy).await
}
