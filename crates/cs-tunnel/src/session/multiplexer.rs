//! Session multiplexer
//!
//! Owns the transport: a writer task drains the shared outbound queue, a
//! reader task routes inbound frames to per-channel queues or to the control
//! request waiting for a reply, and a keep-alive task closes the session
//! when the remote goes quiet.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use cs_core::config::SessionConfig;
use cs_core::time::{millis_since, unix_millis};
use cs_core::{ConnectionInfo, CsError, RemoteSession};
use cs_protocol::{ChannelId, Frame, FrameCodec, Message, PROTOCOL_VERSION};

use super::channel::LogicalChannel;

/// Event delivered to one logical channel's inbound queue
#[derive(Debug)]
pub(crate) enum ChannelEvent {
    Data(Bytes),
    /// Remote will send no more data
    Eof,
    /// Remote tore the channel down
    Closed,
    /// Remote reported an error on the channel
    Error(String),
    /// Unread data passed the buffer limit; the channel was dropped locally
    Overflow,
}

/// Receiving side of one open channel, as seen by the reader task
pub(crate) struct ChannelInbox {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    /// Bytes queued but not yet read by the channel
    buffered: Arc<AtomicUsize>,
}

impl ChannelInbox {
    fn send(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    /// Queue data unless that would pass `limit` unread bytes
    fn push(&self, data: Bytes, limit: usize) -> bool {
        let queued = self.buffered.fetch_add(data.len(), Ordering::AcqRel) + data.len();
        if queued > limit {
            return false;
        }
        self.send(ChannelEvent::Data(data));
        true
    }
}

/// State shared between the session handle, its tasks and its channels
pub(crate) struct SessionShared {
    /// Shared outbound frame queue, drained by the writer task
    pub(crate) outbound: mpsc::Sender<Frame>,
    /// Inbound queues of open channels
    pub(crate) channels: DashMap<ChannelId, ChannelInbox>,
    /// Unread bytes a channel may hold before it is torn down
    inbound_limit: usize,
    /// Control requests waiting for their reply, keyed by the channel the
    /// reply arrives on
    pending: DashMap<ChannelId, oneshot::Sender<Message>>,
    next_channel_id: AtomicU32,
    /// Serializes control-plane requests
    control: tokio::sync::Mutex<()>,
    pub(crate) shutdown: CancellationToken,
    closed: AtomicBool,
    last_inbound: AtomicU64,
}

impl SessionShared {
    fn allocate_channel_id(&self) -> ChannelId {
        ChannelId::new(self.next_channel_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Close the session. Dropping the queue senders fails every blocked
    /// channel read; the cancelled token fails every write.
    pub(crate) fn shutdown_now(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closing session ({} open channels)", self.channels.len());
        }
        self.shutdown.cancel();
        self.channels.clear();
        self.pending.clear();
    }

    fn dispatch(&self, frame: Frame) {
        let id = frame.channel_id;
        match frame.message {
            Message::Heartbeat { timestamp } => {
                let ack = Frame::control(Message::HeartbeatAck { timestamp });
                if self.outbound.try_send(ack).is_err() {
                    tracing::warn!("Outbound queue full, dropping heartbeat ack");
                }
            }
            Message::HeartbeatAck { timestamp } => {
                tracing::trace!("Heartbeat ack, rtt {}ms", millis_since(timestamp));
            }
            Message::Data(data) => {
                let len = data.len();
                let accepted = match self.channels.get(&id) {
                    Some(inbox) => inbox.push(data, self.inbound_limit),
                    None => {
                        tracing::debug!("Dropping {} bytes for unknown {}", len, id);
                        true
                    }
                };
                if !accepted {
                    if let Some((_, inbox)) = self.channels.remove(&id) {
                        tracing::warn!(
                            "{} has over {} unread bytes, closing it",
                            id,
                            self.inbound_limit
                        );
                        inbox.send(ChannelEvent::Overflow);
                    }
                }
            }
            Message::ChannelEof => {
                if let Some(inbox) = self.channels.get(&id) {
                    inbox.send(ChannelEvent::Eof);
                }
            }
            Message::ChannelClose => {
                if let Some((_, inbox)) = self.channels.remove(&id) {
                    inbox.send(ChannelEvent::Closed);
                }
            }
            reply if reply.is_reply() => {
                if let Some((_, waiter)) = self.pending.remove(&id) {
                    let _ = waiter.send(reply);
                } else if let Message::Error { message, .. } = reply {
                    // Unsolicited error on an established channel
                    match self.channels.remove(&id) {
                        Some((_, inbox)) => inbox.send(ChannelEvent::Error(message)),
                        None => tracing::warn!("Remote error on {}: {}", id, message),
                    }
                } else {
                    tracing::debug!("Unsolicited {:?} on {}", reply.message_type(), id);
                }
            }
            other => {
                tracing::warn!("Unexpected {:?} from remote on {}", other.message_type(), id);
            }
        }
    }

    /// Send one control request and wait for its reply
    async fn request(
        &self,
        cancel: &CancellationToken,
        reply_on: ChannelId,
        message: Message,
    ) -> Result<Message, CsError> {
        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(CsError::Canceled),
            _ = self.shutdown.cancelled() => return Err(session_closed()),
            guard = self.control.lock() => guard,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(reply_on, tx);
        if self.shutdown.is_cancelled() {
            self.pending.remove(&reply_on);
            return Err(session_closed());
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(CsError::Canceled),
            sent = self.outbound.send(Frame::new(reply_on, message)) => match sent {
                Ok(()) => tokio::select! {
                    _ = cancel.cancelled() => Err(CsError::Canceled),
                    reply = rx => reply.map_err(|_| session_closed()),
                },
                Err(_) => Err(session_closed()),
            },
        };

        if result.is_err() {
            self.pending.remove(&reply_on);
        }
        result
    }

    fn touch(&self) {
        self.last_inbound
            .store(unix_millis(), Ordering::Relaxed);
    }
}

fn session_closed() -> CsError {
    CsError::Session("session closed".to_string())
}

/// A live session to one workspace.
///
/// Dropping the handle closes the session.
pub struct MuxSession {
    shared: Arc<SessionShared>,
    tasks: Vec<JoinHandle<()>>,
}

impl MuxSession {
    /// Join the workspace session over an already connected transport.
    ///
    /// Sends `Join` with the credential and waits for `JoinAck`. Every
    /// failure here, including a timeout, is a `CsError::Connect`. The
    /// session closes when `parent` is cancelled.
    pub async fn handshake<S>(
        stream: S,
        credential: &ConnectionInfo,
        config: &SessionConfig,
        parent: &CancellationToken,
    ) -> Result<Self, CsError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, FrameCodec::new());
        let mut writer = FramedWrite::new(write_half, FrameCodec::new());

        let join = join_session(&mut reader, &mut writer, credential);

        tokio::select! {
            _ = parent.cancelled() => return Err(CsError::Canceled),
            result = tokio::time::timeout(config.connect_timeout, join) => match result {
                Ok(joined) => joined?,
                Err(_) => {
                    return Err(CsError::Connect(format!(
                        "timed out after {:?} waiting for session join",
                        config.connect_timeout
                    )))
                }
            },
        }

        tracing::debug!("Joined session {}", credential.session_id);

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue.max(1));
        let shared = Arc::new(SessionShared {
            outbound: outbound_tx,
            channels: DashMap::new(),
            inbound_limit: config.channel_buffer_limit.max(1),
            pending: DashMap::new(),
            next_channel_id: AtomicU32::new(1), // 0 is the control channel
            control: tokio::sync::Mutex::new(()),
            shutdown: parent.child_token(),
            closed: AtomicBool::new(false),
            last_inbound: AtomicU64::new(unix_millis()),
        });

        let tasks = vec![
            tokio::spawn(write_loop(writer, outbound_rx, shared.shutdown.clone())),
            tokio::spawn(read_loop(reader, Arc::clone(&shared))),
            tokio::spawn(keepalive_loop(
                Arc::clone(&shared),
                config.keepalive_interval,
                config.keepalive_timeout,
            )),
        ];

        Ok(Self { shared, tasks })
    }

    /// Token cancelled when the session closes
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Number of channels currently open
    pub fn open_channels(&self) -> usize {
        self.shared.channels.len()
    }

    async fn open(&self, cancel: &CancellationToken, request: Message) -> Result<LogicalChannel, CsError> {
        let id = self.shared.allocate_channel_id();
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        // Registered before the request so data right after the reply is kept
        self.shared.channels.insert(
            id,
            ChannelInbox {
                tx,
                buffered: Arc::clone(&buffered),
            },
        );
        let mut channel = LogicalChannel::new(id, Arc::clone(&self.shared), rx, buffered);

        match self.shared.request(cancel, id, request).await? {
            Message::ChannelOpened => {
                tracing::debug!("Opened {}", id);
                Ok(channel)
            }
            Message::Error { message, .. } => {
                channel.mark_remote_closed();
                Err(CsError::Session(message))
            }
            other => Err(CsError::Session(format!(
                "unexpected reply {:?} to channel open",
                other.message_type()
            ))),
        }
    }
}

#[async_trait]
impl RemoteSession for MuxSession {
    type Channel = LogicalChannel;

    async fn start_service(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<(u16, String), CsError> {
        let reply = self
            .shared
            .request(
                cancel,
                ChannelId::CONTROL,
                Message::StartService {
                    name: name.to_string(),
                },
            )
            .await?;

        match reply {
            Message::ServiceStarted { port, user } => {
                tracing::debug!("Service {} listening on remote port {}", name, port);
                Ok((port, user))
            }
            Message::Error { message, .. } => Err(CsError::Session(format!(
                "failed to start {}: {}",
                name, message
            ))),
            other => Err(CsError::Session(format!(
                "unexpected reply {:?} to service start",
                other.message_type()
            ))),
        }
    }

    async fn open_channel(
        &self,
        cancel: &CancellationToken,
        port: u16,
    ) -> Result<LogicalChannel, CsError> {
        self.open(cancel, Message::ChannelOpen { port }).await
    }

    async fn run_command(
        &self,
        cancel: &CancellationToken,
        working_dir: Option<&str>,
        command: &str,
    ) -> Result<LogicalChannel, CsError> {
        self.open(
            cancel,
            Message::Exec {
                working_dir: working_dir.map(str::to_string),
                command: command.to_string(),
            },
        )
        .await
    }

    async fn close(&self) -> Result<(), CsError> {
        self.shared.shutdown_now();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    async fn closed(&self) {
        self.shared.shutdown.cancelled().await
    }
}

impl Drop for MuxSession {
    fn drop(&mut self) {
        self.shared.shutdown_now();
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn join_session<S>(
    reader: &mut FramedRead<ReadHalf<S>, FrameCodec>,
    writer: &mut FramedWrite<WriteHalf<S>, FrameCodec>,
    credential: &ConnectionInfo,
) -> Result<(), CsError>
where
    S: AsyncRead + AsyncWrite,
{
    writer
        .send(Frame::control(Message::Join {
            session_id: credential.session_id.clone(),
            token: credential.session_token.clone(),
            version: PROTOCOL_VERSION.to_string(),
        }))
        .await
        .map_err(|e| CsError::Connect(format!("failed to send join: {}", e)))?;

    loop {
        let frame = match reader.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return Err(CsError::Connect(e.to_string())),
            None => {
                return Err(CsError::Connect(
                    "connection closed during join".to_string(),
                ))
            }
        };

        match frame.message {
            Message::JoinAck { accepted: true, .. } => return Ok(()),
            Message::JoinAck {
                accepted: false,
                reason,
            } => {
                return Err(CsError::Connect(
                    reason.unwrap_or_else(|| "join rejected".to_string()),
                ))
            }
            Message::Error { message, .. } => return Err(CsError::Connect(message)),
            // The remote may start heartbeating before it acks
            Message::Heartbeat { .. } => continue,
            other => {
                return Err(CsError::Connect(format!(
                    "unexpected {:?} during join",
                    other.message_type()
                )))
            }
        }
    }
}

/// How long a closing session waits to flush its transport
const CLOSE_GRACE: std::time::Duration = std::time::Duration::from_secs(1);

async fn write_loop<W>(
    mut sink: FramedWrite<WriteHalf<W>, FrameCodec>,
    mut outbound: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
) where
    W: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        // A stalled transport must not hold the session open past close()
        tokio::select! {
            _ = shutdown.cancelled() => break,
            sent = sink.send(frame) => if let Err(e) = sent {
                tracing::warn!("Session write failed: {}", e);
                break;
            },
        }
    }

    shutdown.cancel();
    // Wakes every channel parked on a full queue with an error
    outbound.close();
    drop(outbound);

    if tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        tracing::debug!("Transport did not drain within {:?}", CLOSE_GRACE);
    }
}

async fn read_loop<R>(mut stream: FramedRead<ReadHalf<R>, FrameCodec>, shared: Arc<SessionShared>)
where
    R: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        let next = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                shared.touch();
                shared.dispatch(frame);
            }
            Some(Err(e)) => {
                tracing::warn!("Session protocol error: {}", e);
                break;
            }
            None => {
                tracing::debug!("Session transport closed by remote");
                break;
            }
        }
    }

    shared.shutdown_now();
}

async fn keepalive_loop(
    shared: Arc<SessionShared>,
    interval: std::time::Duration,
    timeout: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval.max(std::time::Duration::from_millis(10)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let quiet = millis_since(shared.last_inbound.load(Ordering::Relaxed));
        if quiet > timeout.as_millis() as u64 {
            tracing::warn!("No traffic from remote for {}ms, closing session", quiet);
            shared.shutdown_now();
            break;
        }

        let heartbeat = Frame::control(Message::Heartbeat {
            timestamp: unix_millis(),
        });
        if shared.outbound.try_send(heartbeat).is_err() {
            tracing::debug!("Outbound queue busy, skipping heartbeat");
        }
    }
}
