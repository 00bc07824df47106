mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{strip_ansi, with_timeout};
use live_console::ConsoleContext;
use live_console::terminal::Size;
use live_console::transport::host_keys::{host_key_path, load_host_keys};
use live_console::transport::ssh::SshServer;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tempfile::TempDir;
use tokio::task::JoinHandle;

const HOST_KEY: &str = include_str!("fixtures/ssh_host_ed25519_key");

struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct SshHarness {
    ctx: Arc<ConsoleContext>,
    addr: SocketAddr,
    server: JoinHandle<()>,
    _keys: TempDir,
}

impl SshHarness {
    async fn start(max_sessions: usize) -> Self {
        let keys = TempDir::new().unwrap();
        std::fs::write(host_key_path(keys.path(), "ed25519"), HOST_KEY).unwrap();
        let host_keys = load_host_keys(keys.path()).unwrap();

        let ctx = ConsoleContext::new("ssh-test", max_sessions);
        let server = SshServer::bind("127.0.0.1:0", host_keys, Arc::clone(&ctx))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        Self {
            ctx,
            addr,
            server: tokio::spawn(server.run()),
            _keys: keys,
        }
    }

    async fn connect(&self) -> Handle<AcceptAnyHostKey> {
        let config = Arc::new(client::Config::default());
        let mut handle = with_timeout(client::connect(config, self.addr, AcceptAnyHostKey))
            .await
            .unwrap();
        assert!(handle.authenticate_none("operator").await.unwrap());
        handle
    }

    /// Opens a session channel with an 80x24 pty, starts the shell and
    /// waits for the first prompt.
    async fn open_shell(&self) -> (Handle<AcceptAnyHostKey>, Channel<Msg>) {
        let handle = self.connect().await;
        let mut channel = handle.channel_open_session().await.unwrap();
        channel
            .request_pty(false, "xterm", 80, 24, 0, 0, &[])
            .await
            .unwrap();
        channel.request_shell(false).await.unwrap();
        let greeting = read_until(&mut channel, ">>> ").await;
        assert!(greeting.starts_with("Connected to live console."));
        (handle, channel)
    }
}

async fn read_until(channel: &mut Channel<Msg>, needle: &str) -> String {
    let mut collected = String::new();
    while !strip_ansi(&collected).contains(needle) {
        match with_timeout(channel.wait()).await {
            Some(ChannelMsg::Data { data }) => {
                collected.push_str(&String::from_utf8_lossy(&data[..]));
            }
            Some(_) => {}
            None => panic!("channel ended before {:?}; got {:?}", needle, collected),
        }
    }
    strip_ansi(&collected)
}

/// Waits until the server closes the channel.
async fn wait_closed(channel: &mut Channel<Msg>) {
    with_timeout(async {
        while let Some(msg) = channel.wait().await {
            if matches!(msg, ChannelMsg::Close) {
                break;
            }
        }
    })
    .await;
}

async fn eventually(mut check: impl FnMut() -> bool) {
    with_timeout(async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn test_shell_evaluates_with_crlf_output() {
    let harness = SshHarness::start(4).await;
    let (_handle, mut channel) = harness.open_shell().await;

    channel.data(&b"1+1\r"[..]).await.unwrap();
    read_until(&mut channel, "1+1\r\n2\r\n").await;

    let sessions = harness.ctx.registry().list();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].id.as_str().starts_with("ssh-"));
    assert_eq!(sessions[0].size, Size::new(80, 24));
}

#[tokio::test]
async fn test_window_change_resizes_session() {
    let harness = SshHarness::start(4).await;
    let (_handle, channel) = harness.open_shell().await;
    let session_id = harness.ctx.registry().list()[0].id.clone();

    channel.window_change(100, 30, 0, 0).await.unwrap();

    let registry = Arc::clone(harness.ctx.registry());
    eventually(|| {
        registry
            .get(session_id.as_str())
            .is_some_and(|session| session.size() == Size::new(100, 30))
    })
    .await;
}

#[tokio::test]
async fn test_multibyte_input_split_across_packets() {
    let harness = SshHarness::start(4).await;
    let (_handle, mut channel) = harness.open_shell().await;
    let accented = "é".as_bytes();

    channel.data(&[b'\'', accented[0]][..]).await.unwrap();
    channel
        .data(&[accented[1], b'\'', b'\r'][..])
        .await
        .unwrap();

    read_until(&mut channel, "\n'é'\r\n").await;
}

#[tokio::test]
async fn test_channel_eof_closes_and_unregisters_session() {
    let harness = SshHarness::start(4).await;
    let (_handle, mut channel) = harness.open_shell().await;
    assert_eq!(harness.ctx.registry().len(), 1);

    channel.eof().await.unwrap();

    wait_closed(&mut channel).await;
    let registry = Arc::clone(harness.ctx.registry());
    eventually(|| registry.is_empty()).await;
}

#[tokio::test]
async fn test_quit_closes_channel() {
    let harness = SshHarness::start(4).await;
    let (_handle, mut channel) = harness.open_shell().await;

    channel.data(&b"quit\r"[..]).await.unwrap();

    wait_closed(&mut channel).await;
    let registry = Arc::clone(harness.ctx.registry());
    eventually(|| registry.is_empty()).await;
}

#[tokio::test]
async fn test_channel_refused_when_session_limit_reached() {
    let harness = SshHarness::start(1).await;
    let (handle, _channel) = harness.open_shell().await;

    assert!(handle.channel_open_session().await.is_err());
    assert_eq!(harness.ctx.registry().len(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_sessions_and_drains_server() {
    let harness = SshHarness::start(4).await;
    let (handle, mut channel) = harness.open_shell().await;

    assert_eq!(harness.ctx.shutdown(), 1);

    wait_closed(&mut channel).await;
    let _ = handle.disconnect(Disconnect::ByApplication, "", "en").await;
    with_timeout(harness.server).await.unwrap();
    assert!(harness.ctx.registry().is_empty());
}
