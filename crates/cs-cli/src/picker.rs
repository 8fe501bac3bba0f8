//! Interactive workspace selection

use dialoguer::Select;

use cs_api::WorkspacePicker;
use cs_core::{CsError, Workspace};

/// Asks on the terminal which workspace to use
pub struct PromptPicker;

impl WorkspacePicker for PromptPicker {
    fn pick(&self, workspaces: &[Workspace]) -> Result<Option<usize>, CsError> {
        let labels: Vec<String> = workspaces.iter().map(Workspace::label).collect();

        Select::new()
            .with_prompt("Choose codespace")
            .items(&labels)
            .default(0)
            .interact_opt()
            .map_err(|e| CsError::Validation(format!("error getting answers: {}", e)))
    }
}
