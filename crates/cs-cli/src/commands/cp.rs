//! cp command implementation

use anyhow::Result;

use cs_tunnel::run_copy;

use super::CommandContext;

/// Execute the cp command
pub async fn cp_command(
    ctx: &CommandContext,
    codespace: Option<&str>,
    args: &[String],
    recursive: bool,
    expand: bool,
) -> Result<()> {
    let establisher = ctx.establisher()?;
    run_copy(&establisher, &ctx.cancel, codespace, args, recursive, expand).await?;
    Ok(())
}
