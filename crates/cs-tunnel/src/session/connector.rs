//! Connects to the workspace relay and joins the session
//!
//! The relay speaks SSH. We authenticate with the session id and token,
//! open one session channel, request the multiplexer subsystem on it and
//! run the framed protocol over that channel's byte stream.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Config};
use russh::Disconnect;
use russh_keys::key::PublicKey;
use tokio_util::sync::CancellationToken;

use cs_core::config::SessionConfig;
use cs_core::{ConnectionInfo, CsError};

use super::multiplexer::MuxSession;

/// SSH subsystem that carries the multiplexed protocol
pub const MUX_SUBSYSTEM: &str = "cs-mux";

/// Establishes sessions from connection credentials
#[derive(Debug, Clone, Default)]
pub struct SessionConnector {
    config: SessionConfig,
}

impl SessionConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Connect to `credential.relay_endpoint` and join the session.
    ///
    /// Not retried: any failure is returned as `CsError::Connect`.
    pub async fn connect(
        &self,
        credential: &ConnectionInfo,
        cancel: &CancellationToken,
    ) -> Result<MuxSession, CsError> {
        let endpoint = credential.relay_endpoint.as_str();
        tracing::debug!("Connecting to relay {}", endpoint);

        let ssh_config = Arc::new(Config {
            inactivity_timeout: None,
            ..Config::default()
        });

        let connect = async {
            let mut handle = client::connect(ssh_config, endpoint, RelayHandler)
                .await
                .map_err(|e| CsError::Connect(format!("failed to connect to {}: {}", endpoint, e)))?;

            let authenticated = handle
                .authenticate_password(&credential.session_id, &credential.session_token)
                .await
                .map_err(|e| CsError::Connect(format!("authentication error: {}", e)))?;
            if !authenticated {
                return Err(CsError::Connect("session token rejected".to_string()));
            }

            let mut channel = handle
                .channel_open_session()
                .await
                .map_err(|e| CsError::Connect(format!("failed to open session channel: {}", e)))?;
            channel
                .request_subsystem(true, MUX_SUBSYSTEM)
                .await
                .map_err(|e| CsError::Connect(format!("subsystem request failed: {}", e)))?;

            Ok::<_, CsError>((handle, channel))
        };

        let (handle, channel) = tokio::select! {
            _ = cancel.cancelled() => return Err(CsError::Canceled),
            result = tokio::time::timeout(self.config.connect_timeout, connect) => match result {
                Ok(connected) => connected?,
                Err(_) => {
                    return Err(CsError::Connect(format!(
                        "timed out connecting to {}",
                        endpoint
                    )))
                }
            },
        };

        let session =
            MuxSession::handshake(channel.into_stream(), credential, &self.config, cancel).await?;

        // Keep the SSH connection alive for as long as the session is
        let closed = session.shutdown_token();
        tokio::spawn(async move {
            closed.cancelled().await;
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "session closed", "en")
                .await
            {
                tracing::debug!("Relay disconnect: {}", e);
            }
        });

        tracing::info!("Connected to session {}", credential.session_id);
        Ok(session)
    }
}

/// SSH client handler for the relay connection
struct RelayHandler;

#[async_trait]
impl client::Handler for RelayHandler {
    type Error = russh::Error;

    /// Host keys are not pinned; the session token is the credential.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Relay host key: {}", server_public_key.fingerprint());
        Ok(true)
    }
}
