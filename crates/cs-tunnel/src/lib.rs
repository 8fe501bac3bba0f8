//! cs-tunnel: Remote session and tunnel engine
//!
//! - [`session`]: the authenticated, multiplexed transport to a workspace
//! - [`command`]: one-shot remote commands over a session
//! - [`forward`]: relays local TCP connections (or stdio) to a remote port
//! - [`client`]: the local `ssh`/`scp` processes driven through a tunnel
//! - [`orchestrator`]: races the tunnel against the local client and unwinds

pub mod client;
pub mod command;
pub mod forward;
pub mod orchestrator;
pub mod session;

pub use client::{LocalClient, ScpCopy, SshShell};
pub use command::{container_id, read_first_line, run_command, CommandOutput};
pub use forward::{PortForwarder, StdioStream};
pub use orchestrator::{
    forward_ports, parse_port_pairs, run_copy, run_ssh, run_tunnel, CodespaceEstablisher,
    Establish, PortPair, TunnelOptions, SSHD_SERVICE,
};
pub use session::{LogicalChannel, MuxSession, SessionConnector};
