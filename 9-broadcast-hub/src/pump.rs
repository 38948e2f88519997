use std::{io, time::Duration};

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, warn};

use crate::{
    error::HubError,
    protocol::write_line,
    session::{MailboxReceiver, SessionId},
};

/// Copies queued lines from one session's mailbox to its transport.
pub struct MailboxPump<W> {
    id: SessionId,
    mailbox: MailboxReceiver,
    writer: W,
    write_timeout: Duration,
}

impl<W> MailboxPump<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        id: SessionId,
        mailbox: MailboxReceiver,
        writer: W,
        write_timeout: Duration,
    ) -> Self {
        Self {
            id,
            mailbox,
            writer,
            write_timeout,
        }
    }

    /// Writes lines in FIFO order until the hub closes the mailbox and the
    /// backlog is drained, then shuts the write side down.
    ///
    /// Returns the number of lines written. A write that fails or takes
    /// longer than the write timeout ends the pump; departure is left to the
    /// session's reader.
    pub async fn run(mut self) -> Result<usize, HubError> {
        let mut written = 0;
        while let Some(line) = self.mailbox.recv().await {
            let write = write_line(&mut self.writer, &line);
            let result = match timeout(self.write_timeout, write).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "client did not accept line in time",
                )),
            };
            if let Err(err) = result {
                warn!(session = %self.id, error = ?err, "failed to deliver line to client");
                return Err(HubError::Transport(err));
            }
            written += 1;
        }

        match timeout(self.write_timeout, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(session = %self.id, error = ?err, "failed to shut down client writer")
            }
            Err(_) => debug!(session = %self.id, "timed out shutting down client writer"),
        }
        debug!(session = %self.id, written, "mailbox drained");
        Ok(written)
    }
}
