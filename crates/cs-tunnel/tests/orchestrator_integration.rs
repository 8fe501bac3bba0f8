//! Tunnel orchestration outcomes with scripted local clients

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use cs_core::{CsError, LocalClientError, RemoteSession, TunnelError};
use cs_tunnel::{
    forward_ports, run_copy, run_ssh, run_tunnel, Establish, LocalClient, MuxSession, PortPair,
    TunnelOptions,
};

use support::Behavior;

/// What the scripted client does once the tunnel is up
#[derive(Clone, Copy)]
enum Script {
    /// Round-trip a message through the tunnel, then succeed
    Echo,
    /// Exit with the given status
    Exit(i32),
    /// Wait until cancelled
    Hang,
}

struct ScriptedClient {
    script: Script,
    seen: Mutex<Option<(u16, String)>>,
}

impl ScriptedClient {
    fn new(script: Script) -> Self {
        Self {
            script,
            seen: Mutex::new(None),
        }
    }

    fn seen(&self) -> (u16, String) {
        self.seen.lock().unwrap().clone().expect("client never ran")
    }
}

#[async_trait]
impl LocalClient for ScriptedClient {
    fn failure_context(&self) -> &'static str {
        "shell closed"
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        port: u16,
        destination: &str,
    ) -> Result<(), LocalClientError> {
        *self.seen.lock().unwrap() = Some((port, destination.to_string()));

        match self.script {
            Script::Echo => {
                let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
                stream.write_all(b"SSH-2.0-client\r\n").await.unwrap();
                let mut buf = [0u8; 16];
                stream.read_exact(&mut buf).await.unwrap();
                assert_eq!(&buf, b"SSH-2.0-client\r\n");
                Ok(())
            }
            Script::Exit(code) => Err(LocalClientError::Exit(Some(code))),
            Script::Hang => {
                cancel.cancelled().await;
                Err(LocalClientError::Canceled)
            }
        }
    }
}

/// Hands out sessions to the fake remote and counts how often it was asked
#[derive(Default)]
struct FakeEstablish {
    calls: AtomicUsize,
}

#[async_trait]
impl Establish for FakeEstablish {
    type Session = MuxSession;

    async fn establish(
        &self,
        _cancel: &CancellationToken,
        _codespace: Option<&str>,
    ) -> Result<Arc<MuxSession>, CsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CsError::Connect("no relay in tests".to_string()))
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_client_success_tears_down_tunnel() {
    let (session, _remote) = support::connect(Behavior::default()).await;
    let session = Arc::new(session);
    let client = ScriptedClient::new(Script::Echo);

    run_tunnel(
        &CancellationToken::new(),
        Arc::clone(&session),
        &TunnelOptions::default(),
        &client,
    )
    .await
    .unwrap();

    let (port, destination) = client.seen();
    assert_eq!(destination, "codespace@localhost");
    assert!(
        TcpStream::connect(("127.0.0.1", port)).await.is_err(),
        "tunnel listener still accepting after the client finished"
    );
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_client_failure_is_reported_as_shell_closed() {
    let (session, _remote) = support::connect(Behavior::default()).await;
    let session = Arc::new(session);
    let client = ScriptedClient::new(Script::Exit(255));

    let err = run_tunnel(
        &CancellationToken::new(),
        Arc::clone(&session),
        &TunnelOptions::default(),
        &client,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        CsError::LocalClient {
            source: LocalClientError::Exit(Some(255)),
            ..
        }
    ));
    assert_eq!(err.to_string(), "shell closed: exit status 255");
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_tunnel_failure_stops_client() {
    let (session, remote) = support::connect(Behavior::default()).await;
    let client = ScriptedClient::new(Script::Hang);

    let hangup = remote.hangup.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        hangup.cancel();
    });

    let err = timeout(
        Duration::from_secs(2),
        run_tunnel(
            &CancellationToken::new(),
            Arc::new(session),
            &TunnelOptions::default(),
            &client,
        ),
    )
    .await
    .expect("client kept the invocation alive after the tunnel died")
    .unwrap_err();

    assert!(matches!(err, CsError::Tunnel(TunnelError::SessionClosed)));
    assert!(err.to_string().starts_with("tunnel closed"));
}

#[tokio::test]
async fn test_profile_and_fixed_port() {
    let (session, _remote) = support::connect(Behavior::default()).await;
    let client = ScriptedClient::new(Script::Echo);

    let port = {
        let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
        spare.local_addr().unwrap().port()
    };
    let options = TunnelOptions {
        profile: Some("work".to_string()),
        server_port: port,
        stdio: false,
    };

    run_tunnel(&CancellationToken::new(), Arc::new(session), &options, &client)
        .await
        .unwrap();
    assert_eq!(client.seen(), (port, "work".to_string()));
}

#[tokio::test]
async fn test_cancel_ends_invocation() {
    let (session, _remote) = support::connect(Behavior::default()).await;
    let client = ScriptedClient::new(Script::Hang);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let result = timeout(
        Duration::from_secs(2),
        run_tunnel(&cancel, Arc::new(session), &TunnelOptions::default(), &client),
    )
    .await
    .expect("cancellation did not end the invocation");
    assert!(result.is_err());
}

#[tokio::test]
async fn test_start_service_failure_skips_client() {
    let (session, _remote) = support::connect(Behavior::SILENT).await;
    let client = ScriptedClient::new(Script::Echo);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_tunnel(&cancel, Arc::new(session), &TunnelOptions::default(), &client)
        .await
        .unwrap_err();
    assert!(matches!(err, CsError::Canceled));
    assert!(client.seen.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_copy_validation_precedes_establish() {
    let establish = FakeEstablish::default();
    let cancel = CancellationToken::new();

    let err = run_copy(&establish, &cancel, Some("cs"), &strings(&["a", "b"]), false, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("'remote:' prefix"));

    let err = run_copy(&establish, &cancel, Some("cs"), &strings(&["remote:a"]), false, false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("source and destination"));
    assert_eq!(establish.calls.load(Ordering::SeqCst), 0);

    let err = run_copy(
        &establish,
        &cancel,
        Some("cs"),
        &strings(&["remote:a", "b"]),
        false,
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CsError::Connect(_)));
    assert_eq!(establish.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ssh_validation_precedes_establish() {
    let establish = FakeEstablish::default();
    let cancel = CancellationToken::new();
    let stdio = TunnelOptions {
        stdio: true,
        ..Default::default()
    };

    let err = run_ssh(&establish, &cancel, None, &stdio, &[])
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "`--stdio` requires explicit `--codespace`");

    let err = run_ssh(
        &establish,
        &cancel,
        Some("cs"),
        &TunnelOptions::default(),
        &strings(&["-o"]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CsError::Validation(_)));
    assert_eq!(establish.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_forward_ports_until_cancel() {
    let (session, _remote) = support::connect(Behavior::default()).await;
    let session = Arc::new(session);
    let cancel = CancellationToken::new();

    let local = {
        let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
        spare.local_addr().unwrap().port()
    };
    let pairs = [PortPair {
        remote: 3000,
        local,
    }];

    let forwarding = {
        let cancel = cancel.clone();
        let session = Arc::clone(&session);
        tokio::spawn(async move { forward_ports(&cancel, session, &pairs).await })
    };

    let mut stream = loop {
        match TcpStream::connect(("127.0.0.1", local)).await {
            Ok(stream) => break stream,
            Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    };
    stream.write_all(b"GET /").await.unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"GET /");

    cancel.cancel();
    timeout(Duration::from_secs(1), forwarding)
        .await
        .expect("port forwarding ignored cancellation")
        .unwrap()
        .unwrap();
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_forward_ports_busy_local_port() {
    let (session, _remote) = support::connect(Behavior::default()).await;
    let session = Arc::new(session);

    let busy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let pairs = [PortPair {
        remote: 3000,
        local: busy.local_addr().unwrap().port(),
    }];

    let err = forward_ports(&CancellationToken::new(), Arc::clone(&session), &pairs)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("local port"));
    assert!(session.is_closed());
}
