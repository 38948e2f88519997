use std::{future::Future, time::Duration};

use tokio::{io::AsyncBufRead, select};
use tracing::{debug, info, warn};

use crate::{
    error::HubError,
    hub::HubHandle,
    protocol::read_line,
    session::SessionId,
};

/// How a reader's session came to an end.
#[derive(Debug)]
pub enum ReadEnd {
    /// The peer closed its side of the stream.
    Closed,
    /// Reading failed.
    Failed(HubError),
    /// No line arrived within the configured idle timeout.
    Idle,
    /// The caller's shutdown future resolved first.
    Stopped,
    /// The hub stopped taking events.
    HubClosed,
}

/// Turns inbound lines from one transport into hub events.
pub struct SessionReader<R> {
    id: SessionId,
    reader: R,
    hub: HubHandle,
    idle_timeout: Option<Duration>,
}

impl<R> SessionReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(id: SessionId, reader: R, hub: HubHandle, idle_timeout: Option<Duration>) -> Self {
        Self {
            id,
            reader,
            hub,
            idle_timeout,
        }
    }

    /// Forwards every line as a message until the stream ends or `shutdown`
    /// resolves, then reports exactly one departure.
    pub async fn run_until<F>(mut self, shutdown: F) -> ReadEnd
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let end = loop {
            select! {
                _ = &mut shutdown => break ReadEnd::Stopped,
                line = next_line(&mut self.reader, self.idle_timeout) => {
                    match line {
                        Ok(Some(text)) => {
                            if self.hub.message(self.id.clone(), text).await.is_err() {
                                break ReadEnd::HubClosed;
                            }
                        }
                        Ok(None) => break ReadEnd::Closed,
                        Err(end) => break end,
                    }
                }
            }
        };

        match &end {
            ReadEnd::Closed => info!(session = %self.id, "client closed connection"),
            ReadEnd::Failed(err) => warn!(session = %self.id, error = %err, "client read failed"),
            ReadEnd::Idle => info!(session = %self.id, "client idle too long"),
            ReadEnd::Stopped => debug!(session = %self.id, "reader stopped"),
            ReadEnd::HubClosed => debug!(session = %self.id, "hub closed before reader"),
        }

        if !matches!(end, ReadEnd::HubClosed)
            && self.hub.depart(self.id.clone()).await.is_err()
        {
            debug!(session = %self.id, "hub closed before departure was reported");
        }
        end
    }
}

async fn next_line<R>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, ReadEnd>
where
    R: AsyncBufRead + Unpin,
{
    let read = read_line(reader);
    let result = match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, read)
            .await
            .map_err(|_| ReadEnd::Idle)?,
        None => read.await,
    };
    result.map_err(|err| ReadEnd::Failed(HubError::Transport(err)))
}
