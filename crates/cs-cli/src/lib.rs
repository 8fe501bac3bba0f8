//! cs-cli: Command-line interface for codespace tunnels
//!
//! Provides the `cs` binary: interactive ssh, scp copies, port forwarding
//! and OpenSSH config generation for remote workspaces.

pub mod commands;
pub mod logging;
pub mod output;
pub mod picker;
