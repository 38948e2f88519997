//! Session identity and the bounded outbound mailbox.
//!
//! A [`Session`] is owned by the hub for as long as it is registered. It holds
//! the only sending half of its mailbox, so dropping the session is what
//! closes the mailbox. The paired [`MailboxReceiver`] goes to the pump.

use std::{fmt, net::SocketAddr, sync::Arc};

use tokio::sync::mpsc::{self, error::TrySendError};

/// One outbound text line, shared between every mailbox it is fanned out to.
pub type Line = Arc<str>;

/// Receiving end of a session mailbox, drained by its pump.
pub type MailboxReceiver = mpsc::Receiver<Line>;

/// Opaque, connection-derived session identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SocketAddr> for SessionId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Why a non-blocking enqueue did not land in the mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The mailbox is at capacity; the line was dropped for this recipient.
    Full,
    /// The pump is gone, nobody will read the line.
    Closed,
}

/// Sending half of a bounded session mailbox.
///
/// Deliberately not `Clone`: the hub is the only producer.
#[derive(Debug)]
pub struct Mailbox {
    sender: mpsc::Sender<Line>,
}

impl Mailbox {
    /// Enqueue without waiting. Never suspends the caller.
    pub fn try_deliver(&self, line: Line) -> Result<(), DeliveryFailure> {
        match self.sender.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryFailure::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryFailure::Closed),
        }
    }

    /// Free slots left before deliveries start failing.
    pub fn remaining(&self) -> usize {
        self.sender.capacity()
    }
}

/// Creates a bounded mailbox pair. A capacity of zero is raised to one.
pub fn mailbox(capacity: usize) -> (Mailbox, MailboxReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (Mailbox { sender }, receiver)
}

/// A connected peer as the hub sees it.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    mailbox: Mailbox,
}

impl Session {
    /// Builds a session whose display name is its identity.
    pub fn new(id: SessionId, capacity: usize) -> (Self, MailboxReceiver) {
        let name = id.to_string();
        Self::with_name(id, name, capacity)
    }

    pub fn with_name(
        id: SessionId,
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, MailboxReceiver) {
        let (mailbox, receiver) = mailbox(capacity);
        let session = Self {
            id,
            name: name.into(),
            mailbox,
        };
        (session, receiver)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mailbox_rejects_without_blocking() {
        let (session, mut rx) = Session::new(SessionId::from("a"), 1);

        assert_eq!(session.mailbox().try_deliver("one".into()), Ok(()));
        assert_eq!(
            session.mailbox().try_deliver("two".into()),
            Err(DeliveryFailure::Full)
        );
        assert_eq!(rx.try_recv().as_deref(), Ok("one"));
        assert_eq!(session.mailbox().remaining(), 1);
    }

    #[test]
    fn dropped_receiver_reports_closed() {
        let (session, rx) = Session::new(SessionId::from("a"), 4);
        drop(rx);

        assert_eq!(
            session.mailbox().try_deliver("late".into()),
            Err(DeliveryFailure::Closed)
        );
    }

    #[test]
    fn dropping_session_closes_mailbox_after_drain() {
        let (session, mut rx) = Session::new(SessionId::from("a"), 4);
        session
            .mailbox()
            .try_deliver("queued".into())
            .expect("room in mailbox");
        drop(session);

        assert_eq!(rx.try_recv().as_deref(), Ok("queued"));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn socket_address_becomes_identity_and_name() {
        let addr: SocketAddr = "127.0.0.1:8000".parse().expect("valid address");
        let (session, _rx) = Session::new(addr.into(), 1);

        assert_eq!(session.id().as_str(), "127.0.0.1:8000");
        assert_eq!(session.name(), "127.0.0.1:8000");
    }
}
