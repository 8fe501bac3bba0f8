//! Workspace data model

use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote development environment ("codespace")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique name, used to address the workspace in every API call
    pub name: String,

    #[serde(default)]
    pub repository: RepositoryRef,

    #[serde(default)]
    pub state: WorkspaceState,

    #[serde(default)]
    pub git_status: GitStatus,

    /// Only present when requested explicitly; never persisted
    #[serde(default)]
    pub connection: Option<ConnectionInfo>,
}

impl Workspace {
    pub fn is_available(&self) -> bool {
        self.state == WorkspaceState::Available
    }

    /// Human label used by the picker: "owner/repo [branch]: name"
    pub fn label(&self) -> String {
        if self.git_status.ref_name.is_empty() {
            format!("{}: {}", self.repository.full_name, self.name)
        } else {
            format!(
                "{} [{}]: {}",
                self.repository.full_name, self.git_status.ref_name, self.name
            )
        }
    }

    /// Branch name usable inside an ssh host alias
    pub fn escaped_ref(&self) -> String {
        self.git_status.ref_name.replace('/', "-")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStatus {
    #[serde(rename = "ref", default)]
    pub ref_name: String,
}

/// Lifecycle state as reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkspaceState {
    Provisioning,
    Available,
    Starting,
    Shutdown,
    Unavailable,
    /// Any state this client does not know about, kept verbatim
    Other(String),
}

impl Default for WorkspaceState {
    fn default() -> Self {
        WorkspaceState::Other(String::new())
    }
}

impl From<String> for WorkspaceState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Provisioning" => Self::Provisioning,
            "Available" => Self::Available,
            "Starting" => Self::Starting,
            "Shutdown" => Self::Shutdown,
            "Unavailable" => Self::Unavailable,
            _ => Self::Other(value),
        }
    }
}

impl From<WorkspaceState> for String {
    fn from(state: WorkspaceState) -> Self {
        state.to_string()
    }
}

impl fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Available => write!(f, "Available"),
            Self::Starting => write!(f, "Starting"),
            Self::Shutdown => write!(f, "Shutdown"),
            Self::Unavailable => write!(f, "Unavailable"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Connection credential for one invocation.
///
/// Fetched fresh every time and passed explicitly down the call chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub session_id: String,
    pub session_token: String,
    /// host:port of the relay that carries the session transport
    pub relay_endpoint: String,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("session_id", &self.session_id)
            .field("session_token", &"<redacted>")
            .field("relay_endpoint", &self.relay_endpoint)
            .finish()
    }
}

/// Authenticated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
}

/// How local traffic reaches a forward target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Accept any number of local TCP connections
    Listener,
    /// Relay exactly one already-open stream (stdin/stdout)
    SingleStream,
}

/// A service inside the workspace that local traffic is relayed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    /// Name used in logs ("sshd", "port 8080")
    pub service: String,
    /// Port inside the workspace
    pub port: u16,
    pub mode: ForwardMode,
}

impl ForwardTarget {
    pub fn new(service: impl Into<String>, port: u16, mode: ForwardMode) -> Self {
        Self {
            service: service.into(),
            port,
            mode,
        }
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (remote port {})", self.service, self.port)
    }
}
