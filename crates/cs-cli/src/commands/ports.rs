//! ports command implementation

use anyhow::Result;

use cs_tunnel::{forward_ports, parse_port_pairs, Establish};

use crate::output::print_info;

use super::CommandContext;

/// Execute `ports forward`
pub async fn ports_forward_command(
    ctx: &CommandContext,
    codespace: Option<&str>,
    ports: &[String],
) -> Result<()> {
    let pairs = parse_port_pairs(ports)?;
    let session = ctx.establisher()?.establish(&ctx.cancel, codespace).await?;

    for pair in &pairs {
        print_info(&format!(
            "Forwarding ports: remote {} <=> local {}",
            pair.remote, pair.local
        ));
    }

    forward_ports(&ctx.cancel, session, &pairs).await?;
    Ok(())
}
