//! cs-api: Workspace Resolver
//!
//! REST client for the workspace API. Reads that fail with a server-side
//! error are retried a bounded number of times; listing walks `Link`
//! pagination until the requested number of workspaces is collected.

pub mod backoff;
pub mod client;
pub mod pagination;
pub mod resolver;

pub use client::ApiClient;
pub use resolver::{check_authorized_keys, resolve_workspace, wait_until_available, WorkspacePicker};
