use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
    sync::oneshot,
};
use tracing::{debug, info, warn};

use crate::{
    config::HubConfig,
    error::HubError,
    hub::{self, HubHandle},
    pump::MailboxPump,
    reader::{ReadEnd, SessionReader},
    session::{Session, SessionId},
};

/// Accepts connections and wires each one to the hub.
pub struct Server {
    listener: TcpListener,
    config: Arc<HubConfig>,
}

impl Server {
    pub fn new(listener: TcpListener, config: HubConfig) -> Self {
        Self {
            listener,
            config: Arc::new(config),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the hub and the accept loop until `shutdown` resolves, then
    /// tells every client and waits for the hub loop to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, config } = self;
        let (hub, hub_task) = hub::spawn(&config);
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &hub, &config);
                }
            }
        }

        if hub.shutdown().await.is_err() {
            debug!("hub loop already stopped");
        }
        hub_task.await.context("hub task failed")?;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    hub: &HubHandle,
    config: &Arc<HubConfig>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, hub, config),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(
    stream: TcpStream,
    peer: SocketAddr,
    hub: &HubHandle,
    config: &Arc<HubConfig>,
) {
    let hub = hub.clone();
    let config = Arc::clone(config);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, peer, hub, config).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

/// Runs one session: registers it, pumps its mailbox and reads its lines.
///
/// A refused admission only flushes the hub's notice; the reader never
/// starts. Otherwise whichever side stops first ends the other: the pump
/// stopping (eviction, a stalled or broken socket) cancels the reader, which
/// still reports the departure.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: HubHandle,
    config: Arc<HubConfig>,
) -> Result<()> {
    let id = SessionId::from(peer);
    let (reader, writer) = stream.into_split();
    let (session, mailbox) = Session::new(id.clone(), config.mailbox_capacity);

    let pump = MailboxPump::new(id.clone(), mailbox, writer, config.write_timeout);

    match hub.arrive(session).await {
        Ok(()) => debug!(session = %id, "connection accepted"),
        Err(HubError::HubClosed) => {
            return Err(HubError::HubClosed).context("hub stopped before admission");
        }
        Err(err) => {
            // The hub never registered this connection, so no departure is
            // reported. Flush whatever notice it queued and hang up.
            debug!(session = %id, error = %err, "connection refused");
            pump.run().await?;
            return Ok(());
        }
    }

    let (pump_done_tx, pump_done_rx) = oneshot::channel::<()>();
    let pump_task = tokio::spawn(async move {
        let result = pump.run().await;
        let _ = pump_done_tx.send(());
        result
    });

    let reader = SessionReader::new(id.clone(), BufReader::new(reader), hub, config.idle_timeout);
    let end = reader
        .run_until(async {
            let _ = pump_done_rx.await;
        })
        .await;

    let written = pump_task.await.context("mailbox pump panicked")??;
    debug!(session = %id, written, "connection finished");

    match end {
        ReadEnd::Failed(err) => Err(err.into()),
        _ => Ok(()),
    }
}
