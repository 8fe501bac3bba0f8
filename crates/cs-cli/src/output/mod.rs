//! Workspace tables and coloured status lines
//!
//! Status lines always go to stderr: in `--stdio` mode stdout carries the
//! ssh stream.

use std::io::Write;

use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tabled::{settings::Style, Table, Tabled};

use cs_core::Workspace;

/// Workspaces as a rounded table, one row each
pub fn format_workspaces(workspaces: &[Workspace]) -> String {
    if workspaces.is_empty() {
        return "No codespaces found".to_string();
    }

    #[derive(Tabled)]
    struct WorkspaceRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "REPOSITORY")]
        repository: String,
        #[tabled(rename = "BRANCH")]
        branch: String,
        #[tabled(rename = "STATE")]
        state: String,
    }

    let rows: Vec<WorkspaceRow> = workspaces
        .iter()
        .map(|ws| WorkspaceRow {
            name: ws.name.clone(),
            repository: ws.repository.full_name.clone(),
            branch: if ws.git_status.ref_name.is_empty() {
                "-".to_string()
            } else {
                ws.git_status.ref_name.clone()
            },
            state: ws.state.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn status_line(out: &mut impl Write, color: Color, mark: &str, msg: &str) {
    let _ = crossterm::execute!(
        out,
        SetForegroundColor(color),
        Print(mark),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_error(msg: &str) {
    status_line(&mut std::io::stderr(), Color::Red, "✗ ", msg);
}

pub fn print_warning(msg: &str) {
    status_line(&mut std::io::stderr(), Color::Yellow, "⚠ ", msg);
}

pub fn print_info(msg: &str) {
    status_line(&mut std::io::stderr(), Color::Cyan, "ℹ ", msg);
}
