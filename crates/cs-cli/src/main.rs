//! cs: SSH, copy and port forwarding into codespaces
//!
//! Every command resolves a workspace through the API, joins its session
//! and tunnels local tools (ssh, scp, any TCP client) into it.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use cs_cli::commands::{self, CommandContext, SshArgs};
use cs_cli::logging::{init_logging, DebugFile};
use cs_cli::output::{print_error, print_info};
use cs_core::config::{self, CsConfig};
use cs_core::CsError;

#[derive(Parser)]
#[command(name = "cs")]
#[command(author, version, about = "Connect to codespaces over SSH tunnels")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// API token (defaults to $GITHUB_TOKEN)
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// API base URL (overrides config)
    #[arg(long, global = true, env = "CS_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// SSH into a codespace
    Ssh {
        /// Name of the codespace
        #[arg(short = 'c', long)]
        codespace: Option<String>,
        /// Name of the SSH profile to use
        #[arg(long)]
        profile: Option<String>,
        /// SSH server port number (0 => pick unused)
        #[arg(long, default_value_t = 0)]
        server_port: u16,
        /// Proxy the SSH connection over stdio
        #[arg(long)]
        stdio: bool,
        /// Log debug data to a file
        #[arg(short, long)]
        debug: bool,
        /// Path of the file to log to
        #[arg(long)]
        debug_file: Option<PathBuf>,
        /// Extra ssh flags and an optional remote command
        #[arg(last = true)]
        ssh_args: Vec<String>,
    },

    /// Copy files between local and remote file systems
    ///
    /// Prefix remote paths with "remote:"; remote paths are taken literally
    /// unless --expand is given.
    Cp {
        /// Name of the codespace
        #[arg(short = 'c', long)]
        codespace: Option<String>,
        /// Recursively copy directories
        #[arg(short, long)]
        recursive: bool,
        /// Expand remote file names on remote shell
        #[arg(short, long)]
        expand: bool,
        /// Sources followed by the destination
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Write OpenSSH configuration for codespaces to stdout
    Config {
        /// Name of the codespace
        #[arg(short = 'c', long)]
        codespace: Option<String>,
    },

    /// List your codespaces
    List {
        /// Maximum number of codespaces to list
        #[arg(short = 'L', long)]
        limit: Option<usize>,
    },

    /// Work with codespace ports
    Ports {
        #[command(subcommand)]
        action: PortsAction,
    },
}

#[derive(Subcommand)]
enum PortsAction {
    /// Forward ports as <remote>:<local>
    Forward {
        /// Name of the codespace
        #[arg(short = 'c', long)]
        codespace: Option<String>,
        /// Port pairs
        #[arg(required = true)]
        ports: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<CsError>() {
            Some(err) if err.is_benign() => {
                print_info(&err.to_string());
                ExitCode::SUCCESS
            }
            _ => {
                print_error(&format!("{:#}", e));
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let debug_file = match &cli.command {
        Commands::Ssh {
            debug, debug_file, ..
        } => match debug_file {
            Some(path) => Some(DebugFile::Path(path.clone())),
            None if *debug => Some(DebugFile::Temp),
            None => None,
        },
        _ => None,
    };

    if let Some(path) = init_logging(cli.verbose, cli.quiet, debug_file)? {
        eprintln!("Debug file located at: {}", path.display());
    }

    let ctx = CommandContext {
        config: load_config(cli.config.as_ref(), cli.api_url)?,
        token: cli.token.filter(|t| !t.is_empty()),
        cancel: cancel_on_ctrl_c(),
    };

    match cli.command {
        Commands::Ssh {
            codespace,
            profile,
            server_port,
            stdio,
            ssh_args,
            ..
        } => {
            let args = SshArgs {
                codespace,
                profile,
                server_port,
                stdio,
                ssh_args,
            };
            commands::ssh_command(&ctx, args).await?;
        }

        Commands::Cp {
            codespace,
            recursive,
            expand,
            paths,
        } => {
            commands::cp_command(&ctx, codespace.as_deref(), &paths, recursive, expand).await?;
        }

        Commands::Config { codespace } => {
            commands::config_command(&ctx, codespace.as_deref()).await?;
        }

        Commands::List { limit } => {
            commands::list_command(&ctx, limit).await?;
        }

        Commands::Ports {
            action: PortsAction::Forward { codespace, ports },
        } => {
            commands::ports_forward_command(&ctx, codespace.as_deref(), &ports).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>, api_url: Option<String>) -> Result<CsConfig> {
    let mut config = match path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => {
            let default_path = config::default_config_path();
            config::load_or_default(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        }
    };

    if let Some(url) = api_url.filter(|u| !u.is_empty()) {
        config.api.api_url = url;
    }
    Ok(config)
}

/// Root cancellation token for the invocation, cancelled on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupted");
            on_signal.cancel();
        }
    });
    cancel
}
