//! Resolve a named or interactively chosen workspace

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use cs_core::config::ApiConfig;
use cs_core::{ApiError, CsError, Workspace, WorkspaceState};

use crate::backoff::PollBackoff;
use crate::client::ApiClient;

/// Chooses one workspace out of a list, typically by asking the user.
pub trait WorkspacePicker: Send + Sync {
    /// Index of the chosen workspace, or `None` if the user declined
    fn pick(&self, workspaces: &[Workspace]) -> Result<Option<usize>, CsError>;
}

/// Resolve `name` (or, when empty, the picker's choice) to a workspace with
/// its connection details.
pub async fn resolve_workspace(
    client: &ApiClient,
    cancel: &CancellationToken,
    name: Option<&str>,
    picker: &dyn WorkspacePicker,
) -> Result<Workspace, CsError> {
    let name = match name.filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            let workspaces = client.list_workspaces(cancel, None).await?;
            if workspaces.is_empty() {
                return Err(CsError::NoWorkspaces);
            }

            let index = picker.pick(&workspaces)?.ok_or(CsError::Canceled)?;
            workspaces
                .get(index)
                .map(|ws| ws.name.clone())
                .ok_or_else(|| CsError::NotFound(format!("selection #{}", index)))?
        }
    };

    debug!(codespace = %name, "Fetching connection details");
    match client.get_workspace(cancel, &name, true).await {
        Ok(ws) => Ok(ws),
        Err(ApiError::NotFound(_)) => Err(CsError::NotFound(name)),
        Err(e) => Err(e.into()),
    }
}

/// Start the workspace if it is stopped and poll until it is available.
pub async fn wait_until_available(
    client: &ApiClient,
    cancel: &CancellationToken,
    config: &ApiConfig,
    workspace: Workspace,
) -> Result<Workspace, CsError> {
    if workspace.is_available() {
        return Ok(workspace);
    }

    if matches!(workspace.state, WorkspaceState::Shutdown) {
        info!(codespace = %workspace.name, "Starting codespace");
        client.start_workspace(cancel, &workspace.name).await?;
    }

    let started = Instant::now();
    let mut backoff = PollBackoff::new(&config.start_backoff);
    let mut current = workspace;

    while !current.is_available() {
        if started.elapsed() >= config.start_timeout {
            return Err(CsError::Session(format!(
                "timed out waiting for codespace {} to start (state: {})",
                current.name, current.state
            )));
        }

        let delay = backoff.next_delay();
        debug!(codespace = %current.name, state = %current.state, ?delay, "Waiting for codespace");
        tokio::select! {
            _ = cancel.cancelled() => return Err(CsError::Canceled),
            _ = tokio::time::sleep(delay) => {}
        }

        current = client.get_workspace(cancel, &current.name, true).await?;
    }

    Ok(current)
}

/// Fail unless `login` has at least one public key registered, since the
/// workspace's sshd only admits those keys.
pub async fn check_authorized_keys(
    client: &ApiClient,
    cancel: &CancellationToken,
    login: &str,
) -> Result<(), CsError> {
    let keys = client.authorized_keys(cancel, login).await?;
    if keys.is_empty() {
        return Err(CsError::Validation(format!(
            "user {} has no public SSH keys; add one at {}/settings/keys",
            login,
            client.web_url()
        )));
    }
    debug!(login, count = keys.len(), "Authorized keys present");
    Ok(())
}
