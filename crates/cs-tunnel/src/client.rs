//! Local client processes driven through the tunnel
//!
//! The stock `ssh` and `scp` binaries connect to the local end of the
//! tunnel. Their exit decides the outcome of an invocation unless the
//! tunnel fails first.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use cs_core::{CsError, LocalClientError};

/// ssh flags that consume the following argument
const SSH_FLAGS_WITH_VALUE: &str = "bcDeFIiLlmOoPpRSWw";

const NO_HOST_AUTH: &str = "NoHostAuthenticationForLocalhost=yes";

/// A local process that talks to the workspace through the tunnel
#[async_trait]
pub trait LocalClient: Send + Sync {
    /// Prefix for this client's failures, e.g. "shell closed"
    fn failure_context(&self) -> &'static str;

    /// Run to completion against `127.0.0.1:port`, logging in as `destination`
    async fn run(
        &self,
        cancel: &CancellationToken,
        port: u16,
        destination: &str,
    ) -> Result<(), LocalClientError>;
}

/// Interactive shell or remote command through `ssh`
#[derive(Debug, Clone)]
pub struct SshShell {
    flags: Vec<String>,
    command: Vec<String>,
    /// Print the equivalent ssh command line (custom local port only)
    announce: bool,
}

impl SshShell {
    /// Parse user-supplied ssh arguments; fails before any network activity.
    pub fn new(args: &[String], announce: bool) -> Result<Self, CsError> {
        let (flags, command) = parse_ssh_args(args)?;
        Ok(Self {
            flags,
            command,
            announce,
        })
    }

    pub fn args(&self, port: u16, destination: &str) -> Vec<String> {
        build_ssh_args(&self.flags, &self.command, port, destination)
    }
}

#[async_trait]
impl LocalClient for SshShell {
    fn failure_context(&self) -> &'static str {
        "shell closed"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        port: u16,
        destination: &str,
    ) -> Result<(), LocalClientError> {
        if self.announce {
            eprintln!(
                "Connection Details: ssh {} -p {} -o {}",
                destination, port, NO_HOST_AUTH
            );
        }
        run_process(cancel, "ssh", &self.args(port, destination)).await
    }
}

/// File copy through `scp`
#[derive(Debug, Clone)]
pub struct ScpCopy {
    args: Vec<String>,
}

impl ScpCopy {
    /// Validate and escape copy arguments; fails before any network activity.
    pub fn new(args: &[String], recursive: bool, expand: bool) -> Result<Self, CsError> {
        Ok(Self {
            args: prepare_copy_args(args, recursive, expand)?,
        })
    }

    pub fn args(&self, port: u16, destination: &str) -> Vec<String> {
        build_scp_args(&self.args, port, destination)
    }
}

#[async_trait]
impl LocalClient for ScpCopy {
    fn failure_context(&self) -> &'static str {
        "copy failed"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        port: u16,
        destination: &str,
    ) -> Result<(), LocalClientError> {
        run_process(cancel, "scp", &self.args(port, destination)).await
    }
}

async fn run_process(
    cancel: &CancellationToken,
    program: &'static str,
    args: &[String],
) -> Result<(), LocalClientError> {
    tracing::debug!("Running {} {}", program, args.join(" "));

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LocalClientError::Spawn { program, source })?;

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            Err(LocalClientError::Canceled)
        }
        status = child.wait() => {
            let status = status.map_err(|source| LocalClientError::Spawn { program, source })?;
            if status.success() {
                Ok(())
            } else {
                Err(LocalClientError::Exit(status.code()))
            }
        }
    }
}

/// Split user ssh arguments into flags (with their values) and the remote
/// command, which starts at the first non-flag argument.
pub fn parse_ssh_args(args: &[String]) -> Result<(Vec<String>, Vec<String>), CsError> {
    let mut flags = Vec::new();
    let mut iter = args.iter().enumerate();

    while let Some((i, arg)) = iter.next() {
        if !arg.starts_with('-') {
            return Ok((flags, args[i..].to_vec()));
        }

        flags.push(arg.clone());
        let takes_value = arg.len() == 2
            && arg[1..]
                .chars()
                .next()
                .is_some_and(|flag| SSH_FLAGS_WITH_VALUE.contains(flag));
        if takes_value {
            match iter.next() {
                Some((_, value)) => flags.push(value.clone()),
                None => {
                    return Err(CsError::Validation(format!(
                        "ssh flag: {} requires an argument",
                        arg
                    )))
                }
            }
        }
    }

    Ok((flags, Vec::new()))
}

/// `ssh` argument vector: user flags, then the tunnel endpoint, then the
/// destination and the remote command.
pub fn build_ssh_args(
    flags: &[String],
    command: &[String],
    port: u16,
    destination: &str,
) -> Vec<String> {
    let mut args = flags.to_vec();
    args.extend([
        "-p".to_string(),
        port.to_string(),
        "-o".to_string(),
        NO_HOST_AUTH.to_string(),
        "-C".to_string(),
        destination.to_string(),
    ]);
    args.extend(command.iter().cloned());
    args
}

/// `scp` argument vector; every `remote:` prefix becomes `destination:`.
pub fn build_scp_args(copy_args: &[String], port: u16, destination: &str) -> Vec<String> {
    let mut args = vec![
        "-P".to_string(),
        port.to_string(),
        "-o".to_string(),
        NO_HOST_AUTH.to_string(),
        "-C".to_string(),
    ];
    args.extend(copy_args.iter().map(|arg| match arg.strip_prefix("remote:") {
        Some(rest) => format!("{}:{}", destination, rest),
        None => arg.clone(),
    }));
    args
}

/// Turn `cp` operands into scp operands.
///
/// Remote operands are single-quoted for the remote shell unless `expand`
/// is set. A relative local operand whose first path segment contains `:`
/// gets a `./` prefix so scp does not read it as a host.
pub fn prepare_copy_args(
    args: &[String],
    recursive: bool,
    expand: bool,
) -> Result<Vec<String>, CsError> {
    if args.len() < 2 {
        return Err(CsError::Validation(
            "cp requires source and destination arguments".to_string(),
        ));
    }

    let mut prepared = Vec::with_capacity(args.len() + 2);
    if recursive {
        prepared.push("-r".to_string());
    }
    prepared.push("--".to_string());

    let mut has_remote = false;
    for arg in args {
        if let Some(rest) = arg.strip_prefix("remote:") {
            has_remote = true;
            if expand {
                prepared.push(arg.clone());
            } else {
                prepared.push(format!("remote:'{}'", rest.replace('\'', r"'\''")));
            }
        } else if !Path::new(arg).is_absolute()
            && arg.split('/').next().is_some_and(|first| first.contains(':'))
        {
            prepared.push(format!("./{}", arg));
        } else {
            prepared.push(arg.clone());
        }
    }

    if !has_remote {
        return Err(CsError::Validation(
            "at least one argument must have a 'remote:' prefix".to_string(),
        ));
    }
    Ok(prepared)
}
