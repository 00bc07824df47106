//! Process lifecycle: bind the enabled transports, serve, shut down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ConsoleConfig;
use crate::context::ConsoleContext;
use crate::error::ConsoleError;
use crate::transport::host_keys::load_host_keys;
use crate::transport::ssh::{DRAIN_TIMEOUT, SshServer};
use crate::transport::websocket::WebServer;

/// Both transports, bound and sharing one context.
pub struct ConsoleServer {
    ctx: Arc<ConsoleContext>,
    ssh: Option<SshServer>,
    web: Option<WebServer>,
}

impl ConsoleServer {
    pub async fn bind(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let ctx = ConsoleContext::new(config.name.clone(), config.max_sessions);

        let ssh = if config.ssh_enabled {
            let keys = load_host_keys(&config.key_dir)?;
            Some(SshServer::bind(&config.ssh_addr(), keys, Arc::clone(&ctx)).await?)
        } else {
            None
        };

        let web = if config.http_enabled {
            Some(WebServer::bind(&config.http_listen, Arc::clone(&ctx)).await?)
        } else {
            None
        };

        if ssh.is_none() && web.is_none() {
            warn!("Both transports disabled; nothing will accept sessions");
        }

        Ok(Self { ctx, ssh, web })
    }

    pub fn context(&self) -> &Arc<ConsoleContext> {
        &self.ctx
    }

    pub fn ssh_addr(&self) -> Option<SocketAddr> {
        self.ssh.as_ref().and_then(SshServer::local_addr)
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.web.as_ref().and_then(WebServer::local_addr)
    }

    /// Serves until `stop` resolves, then closes every session and waits
    /// for both transports to drain.
    pub async fn run_until(self, stop: impl Future<Output = ()>) -> Result<(), ConsoleError> {
        let ConsoleServer { ctx, ssh, web } = self;
        let ssh_task = ssh.map(|server| tokio::spawn(server.run()));
        let web_task: Option<JoinHandle<Result<(), ConsoleError>>> =
            web.map(|server| tokio::spawn(server.run()));

        info!(pid = std::process::id(), "Live console started");
        stop.await;

        info!("Shutting down live console...");
        ctx.shutdown();

        let grace = DRAIN_TIMEOUT + Duration::from_secs(1);
        if let Some(task) = ssh_task {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "SSH transport task failed"),
                Err(_) => warn!("SSH transport did not stop in time"),
            }
        }
        if let Some(task) = web_task {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(result)) => result?,
                Ok(Err(e)) => error!(error = %e, "Browser transport task failed"),
                Err(_) => warn!("Browser transport did not stop in time"),
            }
        }

        info!("Live console shutdown complete");
        Ok(())
    }
}

#[cfg(unix)]
fn install_signal_handler(
    interrupt: watch::Sender<bool>,
) -> Result<crate::signal_handler::SignalHandler, ConsoleError> {
    crate::signal_handler::SignalHandler::setup(interrupt)
}

#[cfg(not(unix))]
fn install_signal_handler(interrupt: watch::Sender<bool>) -> Result<(), ConsoleError> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.send_replace(true);
        }
    });
    Ok(())
}

/// Runs `live-console serve` to completion on a fresh runtime.
pub fn run_serve(config: ConsoleConfig) -> Result<(), ConsoleError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("live-console")
        .build()?;

    runtime.block_on(async move {
        let server = ConsoleServer::bind(&config).await?;
        if let Some(addr) = server.ssh_addr() {
            info!(%addr, "SSH console ready");
        }
        if let Some(addr) = server.http_addr() {
            info!(%addr, "Browser console ready");
        }

        let (interrupt_tx, mut interrupt_rx) = watch::channel(false);
        let _signals = install_signal_handler(interrupt_tx)?;
        server
            .run_until(async move {
                let _ = interrupt_rx.wait_for(|stop| *stop).await;
            })
            .await
    })
}
