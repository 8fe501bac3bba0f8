//! In-process stand-in for the workspace side of a session
//!
//! Speaks the frame protocol over a `tokio::io::duplex` pipe:
//! - `Join` is accepted only with [`TOKEN`]
//! - `StartService("sshd")` answers port [`SSHD_PORT`] as user "codespace"
//! - `ChannelOpen` to [`REFUSED_PORT`] is refused, any other port echoes
//! - `Exec` streams [`EXEC_OUTPUT`] then EOF
//! - `Heartbeat` is acked
//!
//! A silent remote accepts the join and then never answers anything. A
//! stalling remote answers the first `ChannelOpen`, then stops reading its
//! end of a small pipe until `resume` fires.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use bytes::Bytes;
use cs_core::config::SessionConfig;
use cs_core::ConnectionInfo;
use cs_protocol::{ChannelId, ErrorCode, Frame, FrameCodec, Message};
use cs_tunnel::MuxSession;

pub const TOKEN: &str = "test-session-token";
pub const SSHD_PORT: u16 = 2222;
pub const REFUSED_PORT: u16 = 9;
pub const EXEC_OUTPUT: &str = "abc123\nsecond line\n";

#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Accept the join, then ignore every frame
    pub silent: bool,
    /// Stop reading after the first channel opens
    pub stall_after_open: bool,
}

impl Behavior {
    pub const SILENT: Behavior = Behavior {
        silent: true,
        stall_after_open: false,
    };

    pub const STALLING: Behavior = Behavior {
        silent: false,
        stall_after_open: true,
    };
}

pub fn credential(token: &str) -> ConnectionInfo {
    ConnectionInfo {
        session_id: "session-1".to_string(),
        session_token: token.to_string(),
        relay_endpoint: "in-process".to_string(),
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

/// A running fake remote; cancelling `hangup` drops its end of the pipe
pub struct FakeRemote {
    pub hangup: CancellationToken,
    /// Lets a stalled remote read again
    pub resume: CancellationToken,
    /// Channels the local side has sent `ChannelClose` for
    pub closed_channels: Arc<Mutex<Vec<ChannelId>>>,
    pub task: JoinHandle<()>,
}

/// Start a fake remote and join a session to it
pub async fn connect(behavior: Behavior) -> (MuxSession, FakeRemote) {
    connect_with(behavior, TOKEN, test_config())
        .await
        .expect("session join failed")
}

pub async fn connect_with(
    behavior: Behavior,
    token: &str,
    config: SessionConfig,
) -> Result<(MuxSession, FakeRemote), cs_core::CsError> {
    let pipe = if behavior.stall_after_open { 1024 } else { 256 * 1024 };
    let (local, remote_end) = tokio::io::duplex(pipe);
    let hangup = CancellationToken::new();
    let resume = CancellationToken::new();
    let closed_channels = Arc::new(Mutex::new(Vec::new()));
    let task = tokio::spawn(serve(
        remote_end,
        behavior,
        hangup.clone(),
        resume.clone(),
        Arc::clone(&closed_channels),
    ));

    let session =
        MuxSession::handshake(local, &credential(token), &config, &CancellationToken::new())
            .await?;
    let remote = FakeRemote {
        hangup,
        resume,
        closed_channels,
        task,
    };
    Ok((session, remote))
}

async fn serve(
    stream: DuplexStream,
    behavior: Behavior,
    hangup: CancellationToken,
    resume: CancellationToken,
    closed_channels: Arc<Mutex<Vec<ChannelId>>>,
) {
    let (read_half, write_half) = tokio::io::split(stream);
    let mut reader = FramedRead::new(read_half, FrameCodec::new());
    let mut writer = FramedWrite::new(write_half, FrameCodec::new());

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Frame>();
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if writer.send(frame).await.is_err() {
                break;
            }
        }
    });

    let joined = match reader.next().await {
        Some(Ok(Frame {
            message: Message::Join { token, .. },
            ..
        })) => token == TOKEN,
        _ => false,
    };
    let _ = out_tx.send(Frame::control(Message::JoinAck {
        accepted: joined,
        reason: (!joined).then(|| "invalid session token".to_string()),
    }));

    if joined {
        let mut stalled = false;
        loop {
            let frame = tokio::select! {
                _ = hangup.cancelled() => break,
                next = reader.next() => match next {
                    Some(Ok(frame)) => frame,
                    _ => break,
                },
            };
            if behavior.silent {
                continue;
            }

            let opened = matches!(frame.message, Message::ChannelOpen { .. });
            if matches!(frame.message, Message::ChannelClose) {
                closed_channels.lock().unwrap().push(frame.channel_id);
            }
            respond(&out_tx, frame);

            if opened && behavior.stall_after_open && !stalled {
                stalled = true;
                tokio::select! {
                    _ = hangup.cancelled() => break,
                    _ = resume.cancelled() => {}
                }
            }
        }
    }

    drop(out_tx);
    let _ = writer_task.await;
}

fn respond(out: &mpsc::UnboundedSender<Frame>, frame: Frame) {
    let id = frame.channel_id;
    let reply = |message| {
        let _ = out.send(Frame::new(id, message));
    };

    match frame.message {
        Message::StartService { name } if name == "sshd" => reply(Message::ServiceStarted {
            port: SSHD_PORT,
            user: "codespace".to_string(),
        }),
        Message::StartService { name } => reply(Message::error(
            ErrorCode::ServiceUnavailable,
            format!("unknown service {}", name),
        )),
        Message::ChannelOpen { port } if port == REFUSED_PORT => reply(Message::error(
            ErrorCode::ChannelRefused,
            format!("connection refused on port {}", port),
        )),
        Message::ChannelOpen { .. } => reply(Message::ChannelOpened),
        Message::Exec { .. } => {
            reply(Message::ChannelOpened);
            reply(Message::Data(Bytes::from_static(EXEC_OUTPUT.as_bytes())));
            reply(Message::ChannelEof);
        }
        Message::Data(data) => reply(Message::Data(data)),
        Message::ChannelEof => reply(Message::ChannelEof),
        Message::Heartbeat { timestamp } => reply(Message::HeartbeatAck { timestamp }),
        _ => {}
    }
}
