//! CLI command implementations

mod config;
mod cp;
mod list;
mod ports;
mod ssh;

pub use config::{collect_entries, config_command, render_ssh_config, SshConfigEntry};
pub use cp::cp_command;
pub use list::list_command;
pub use ports::ports_forward_command;
pub use ssh::{ssh_command, SshArgs};

use tokio_util::sync::CancellationToken;

use cs_api::ApiClient;
use cs_core::config::CsConfig;
use cs_core::CsError;
use cs_tunnel::{CodespaceEstablisher, SessionConnector};

use crate::picker::PromptPicker;

/// Everything a command needs from the invocation
pub struct CommandContext {
    pub config: CsConfig,
    pub token: Option<String>,
    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn api(&self) -> Result<ApiClient, CsError> {
        Ok(ApiClient::new(&self.config.api, self.token.clone())?)
    }

    pub fn establisher(&self) -> Result<CodespaceEstablisher, CsError> {
        Ok(CodespaceEstablisher::new(
            self.api()?,
            self.config.api.clone(),
            SessionConnector::new(self.config.session.clone()),
            Box::new(PromptPicker),
        ))
    }
}
