//! List command implementation

use anyhow::Result;

use crate::output::format_workspaces;

use super::CommandContext;

/// Execute the list command
pub async fn list_command(ctx: &CommandContext, limit: Option<usize>) -> Result<()> {
    let api = ctx.api()?;
    let workspaces = api.list_workspaces(&ctx.cancel, limit).await?;

    println!("{}", format_workspaces(&workspaces));
    Ok(())
}
