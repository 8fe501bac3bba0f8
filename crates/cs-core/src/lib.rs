//! cs-core: Core abstractions and configuration for the codespace tunnel engine
//!
//! This crate provides the workspace data model, the error taxonomy shared by
//! every layer, the `RemoteSession` capability trait and the configuration
//! structures used by the resolver, the tunnel and the CLI.

pub mod config;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use error::{ApiError, ConfigError, CsError, LocalClientError, TunnelError};
pub use traits::RemoteSession;
pub use types::{
    ConnectionInfo, ForwardMode, ForwardTarget, GitStatus, RepositoryRef, User, Workspace,
    WorkspaceState,
};
