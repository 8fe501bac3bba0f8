//! config command implementation
//!
//! Prints OpenSSH `Host` stanzas that reach each available workspace through
//! `cs ssh --stdio`, for inclusion in `~/.ssh/config`.

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use cs_core::{CsError, RemoteSession, Workspace};
use cs_tunnel::{Establish, SSHD_SERVICE};

use crate::output::print_warning;

use super::CommandContext;

/// One rendered `Host` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfigEntry {
    pub name: String,
    /// Branch with `/` replaced so it is usable in a host name
    pub escaped_ref: String,
    pub user: String,
}

/// Render `Host cs.<name>.<ref>` stanzas using `exe` as the proxy command.
pub fn render_ssh_config(exe: &str, entries: &[SshConfigEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = write!(
            out,
            "Host cs.{name}.{escaped_ref}\n\
             \tUser {user}\n\
             \tProxyCommand {exe} ssh -c {name} --stdio\n\
             \tUserKnownHostsFile=/dev/null\n\
             \tStrictHostKeyChecking no\n\
             \tLogLevel quiet\n\
             \tControlMaster auto\n\
             \n",
            name = entry.name,
            escaped_ref = entry.escaped_ref,
            user = entry.user,
            exe = exe,
        );
    }
    out
}

/// Execute the config command
pub async fn config_command(ctx: &CommandContext, codespace: Option<&str>) -> Result<()> {
    let api = ctx.api()?;
    let workspaces = match codespace.filter(|name| !name.is_empty()) {
        Some(name) => vec![api.get_workspace(&ctx.cancel, name, false).await?],
        None => api.list_workspaces(&ctx.cancel, None).await?,
    };

    let exe = std::env::current_exe().context("locating the cs executable")?;
    let establisher = ctx.establisher()?;
    let entries = collect_entries(&establisher, &ctx.cancel, &workspaces).await?;

    print!("{}", render_ssh_config(&exe.display().to_string(), &entries));
    Ok(())
}

/// One entry per workspace whose sshd answers.
///
/// Unavailable or unreachable workspaces are reported on stderr and left
/// out. Only cancellation stops the listing.
pub async fn collect_entries<E: Establish>(
    establisher: &E,
    cancel: &CancellationToken,
    workspaces: &[Workspace],
) -> Result<Vec<SshConfigEntry>, CsError> {
    // The ssh user only depends on the repository's dev container setup
    let mut users: HashMap<&str, String> = HashMap::new();
    let mut entries = Vec::new();

    for ws in workspaces {
        if !ws.is_available() {
            print_warning(&format!(
                "skipping unavailable codespace {}: {}",
                ws.name, ws.state
            ));
            continue;
        }

        let user = match users.get(ws.repository.full_name.as_str()) {
            Some(user) => user.clone(),
            None => {
                let session = match establisher.establish(cancel, Some(ws.name.as_str())).await {
                    Ok(session) => session,
                    Err(CsError::Canceled) => return Err(CsError::Canceled),
                    Err(e) => {
                        print_warning(&format!("error connecting to codespace: {}", e));
                        continue;
                    }
                };
                let started = session.start_service(cancel, SSHD_SERVICE).await;
                if let Err(e) = session.close().await {
                    tracing::debug!("Closing session: {}", e);
                }
                let user = match started {
                    Ok((_, user)) => user,
                    Err(CsError::Canceled) => return Err(CsError::Canceled),
                    Err(e) => {
                        print_warning(&format!("error getting ssh server details: {}", e));
                        continue;
                    }
                };
                users.insert(&ws.repository.full_name, user.clone());
                user
            }
        };

        entries.push(SshConfigEntry {
            name: ws.name.clone(),
            escaped_ref: ws.escaped_ref(),
            user,
        });
    }

    Ok(entries)
}
