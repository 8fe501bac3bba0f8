//! ssh command implementation

use anyhow::Result;

use cs_tunnel::{run_ssh, TunnelOptions};

use super::CommandContext;

/// Arguments of `cs ssh`
#[derive(Debug, Clone, Default)]
pub struct SshArgs {
    pub codespace: Option<String>,
    pub profile: Option<String>,
    pub server_port: u16,
    pub stdio: bool,
    /// Passed through to ssh: flags, then an optional remote command
    pub ssh_args: Vec<String>,
}

/// Execute the ssh command
pub async fn ssh_command(ctx: &CommandContext, args: SshArgs) -> Result<()> {
    let options = TunnelOptions {
        profile: args.profile,
        server_port: args.server_port,
        stdio: args.stdio,
    };
    // Validation in run_ssh happens before the establisher touches the network
    let establisher = ctx.establisher()?;

    run_ssh(
        &establisher,
        &ctx.cancel,
        args.codespace.as_deref(),
        &options,
        &args.ssh_args,
    )
    .await?;
    Ok(())
}
