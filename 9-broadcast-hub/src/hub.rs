//! The hub: sole owner of the session registry.
//!
//! Readers and the admission loop never touch the registry. They push
//! [`Event`]s through a [`HubHandle`], and a single task running
//! [`Hub::run`] applies them one at a time. Fan-out uses non-blocking
//! enqueues into bounded mailboxes, so a slow client only ever costs itself
//! dropped lines and, past the eviction threshold, its membership.

use std::collections::{BTreeMap, VecDeque};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::HubConfig,
    error::HubError,
    protocol,
    session::{DeliveryFailure, Line, Session, SessionId},
};

/// Everything the hub loop reacts to.
#[derive(Debug)]
pub enum Event {
    /// Admission request; the outcome goes back to the connection.
    Arrived {
        session: Session,
        respond_to: oneshot::Sender<Result<(), HubError>>,
    },
    Departed(SessionId),
    Message { sender: SessionId, text: String },
    /// Current identities in registry order.
    Roster {
        respond_to: oneshot::Sender<Vec<SessionId>>,
    },
    /// Notify everyone, drop every session and stop the loop.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Departed,
    Evicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Dropped,
    /// Dropped, and the member is now past the eviction threshold.
    Overflowed,
}

struct Member {
    session: Session,
    consecutive_failures: u32,
}

/// Registry plus the policy for admitting, relaying to and evicting sessions.
///
/// Keyed by identity in a `BTreeMap`, which fixes the fan-out order.
pub struct Hub {
    registry: BTreeMap<SessionId, Member>,
    pending_evictions: VecDeque<SessionId>,
    eviction_threshold: u32,
    max_sessions: Option<usize>,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            registry: BTreeMap::new(),
            pending_evictions: VecDeque::new(),
            eviction_threshold: config.eviction_threshold,
            max_sessions: config.max_sessions,
        }
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.registry.contains_key(id)
    }

    /// Registered identities in fan-out order.
    pub fn members(&self) -> Vec<SessionId> {
        self.registry.keys().cloned().collect()
    }

    /// Applies one event, then any evictions it triggered.
    ///
    /// A rejected arrival concerns only the session that asked; the registry
    /// is left as it was.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Arrived {
                session,
                respond_to,
            } => {
                let result = self.admit(session);
                if let Err(err) = &result {
                    warn!(error = %err, "rejected arrival");
                }
                let _ = respond_to.send(result);
            }
            Event::Departed(id) => self.remove(&id, Removal::Departed),
            Event::Message { sender, text } => self.relay(&sender, &text),
            Event::Roster { respond_to } => {
                let _ = respond_to.send(self.members());
            }
            Event::Shutdown => self.shutdown(),
        }

        self.process_evictions();
    }

    /// Drives the hub until the intake closes or a shutdown is requested.
    pub async fn run(mut self, mut intake: mpsc::Receiver<Event>) {
        while let Some(event) = intake.recv().await {
            let stop = matches!(event, Event::Shutdown);
            self.handle(event);
            if stop {
                break;
            }
        }
        debug!(remaining = self.registry.len(), "hub loop finished");
    }

    fn admit(&mut self, session: Session) -> Result<(), HubError> {
        let id = session.id().clone();
        // A rejected session is dropped on return, closing its own mailbox.
        if self.registry.contains_key(&id) {
            return Err(HubError::DuplicateSession(id));
        }
        if let Some(limit) = self.max_sessions {
            if self.registry.len() >= limit {
                let notice = Line::from(protocol::SERVER_FULL);
                if let Err(failure) = session.mailbox().try_deliver(notice) {
                    debug!(session = %id, ?failure, "could not queue rejection notice");
                }
                return Err(HubError::HubFull { limit });
            }
        }

        self.broadcast(Line::from(protocol::arrived(&id)));
        self.registry.insert(
            id.clone(),
            Member {
                session,
                consecutive_failures: 0,
            },
        );

        let notice = protocol::membership(self.registry.values().map(|m| m.session.name()));
        self.deliver_to(&id, Line::from(protocol::greeting(&id)));
        self.deliver_to(&id, Line::from(notice));

        info!(session = %id, members = self.registry.len(), "session joined");
        Ok(())
    }

    fn remove(&mut self, id: &SessionId, removal: Removal) {
        // The member owns the only sender of its mailbox; dropping it closes the mailbox.
        if self.registry.remove(id).is_none() {
            debug!(session = %id, "removal of unregistered session ignored");
            return;
        }

        match removal {
            Removal::Departed => info!(session = %id, "session left"),
            Removal::Evicted => warn!(session = %id, "evicted unresponsive session"),
        }
        self.broadcast(Line::from(protocol::left(id)));
    }

    fn relay(&mut self, sender: &SessionId, text: &str) {
        if !self.registry.contains_key(sender) {
            debug!(session = %sender, "discarding message from departed session");
            return;
        }
        let recipients = self.broadcast(Line::from(protocol::chat(sender, text)));
        debug!(session = %sender, recipients, "relayed message");
    }

    fn shutdown(&mut self) {
        info!(members = self.registry.len(), "hub shutting down");
        self.broadcast(Line::from(protocol::SHUTTING_DOWN));
        self.registry.clear();
        self.pending_evictions.clear();
    }

    /// Enqueues `line` for every member in registry order; returns how many took it.
    fn broadcast(&mut self, line: Line) -> usize {
        let mut delivered = 0;
        for (id, member) in self.registry.iter_mut() {
            match deliver(id, member, line.clone(), self.eviction_threshold) {
                Outcome::Delivered => delivered += 1,
                Outcome::Dropped => {}
                Outcome::Overflowed => queue_eviction(&mut self.pending_evictions, id),
            }
        }
        delivered
    }

    fn deliver_to(&mut self, id: &SessionId, line: Line) {
        let Some(member) = self.registry.get_mut(id) else {
            return;
        };
        if deliver(id, member, line, self.eviction_threshold) == Outcome::Overflowed {
            queue_eviction(&mut self.pending_evictions, id);
        }
    }

    fn process_evictions(&mut self) {
        while let Some(id) = self.pending_evictions.pop_front() {
            self.remove(&id, Removal::Evicted);
        }
    }
}

fn deliver(id: &SessionId, member: &mut Member, line: Line, threshold: u32) -> Outcome {
    match member.session.mailbox().try_deliver(line) {
        Ok(()) => {
            member.consecutive_failures = 0;
            Outcome::Delivered
        }
        Err(DeliveryFailure::Full) => {
            member.consecutive_failures = member.consecutive_failures.saturating_add(1);
            let err = HubError::CapacityExceeded(id.clone());
            debug!(
                error = %err,
                failures = member.consecutive_failures,
                "dropped line for slow session"
            );
            if member.consecutive_failures > threshold {
                Outcome::Overflowed
            } else {
                Outcome::Dropped
            }
        }
        // The pump has stopped; its reader reports the departure.
        Err(DeliveryFailure::Closed) => {
            debug!(session = %id, "mailbox closed, line not delivered");
            Outcome::Dropped
        }
    }
}

fn queue_eviction(pending: &mut VecDeque<SessionId>, id: &SessionId) {
    if !pending.contains(id) {
        pending.push_back(id.clone());
    }
}

/// Cloneable producer side of the hub intake.
#[derive(Clone, Debug)]
pub struct HubHandle {
    intake: mpsc::Sender<Event>,
}

impl HubHandle {
    pub fn new(intake: mpsc::Sender<Event>) -> Self {
        Self { intake }
    }

    /// Asks the hub to register `session` and waits for the verdict.
    ///
    /// On `Err` the session was not registered and its mailbox is closed.
    pub async fn arrive(&self, session: Session) -> Result<(), HubError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Event::Arrived {
            session,
            respond_to,
        })
        .await?;
        response.await.map_err(|_| HubError::HubClosed)?
    }

    pub async fn message(&self, sender: SessionId, text: String) -> Result<(), HubError> {
        self.send(Event::Message { sender, text }).await
    }

    pub async fn depart(&self, id: SessionId) -> Result<(), HubError> {
        self.send(Event::Departed(id)).await
    }

    pub async fn roster(&self) -> Result<Vec<SessionId>, HubError> {
        let (respond_to, response) = oneshot::channel();
        self.send(Event::Roster { respond_to }).await?;
        response.await.map_err(|_| HubError::HubClosed)
    }

    pub async fn shutdown(&self) -> Result<(), HubError> {
        self.send(Event::Shutdown).await
    }

    async fn send(&self, event: Event) -> Result<(), HubError> {
        self.intake
            .send(event)
            .await
            .map_err(|_| HubError::HubClosed)
    }
}

/// Starts the hub loop on its own task.
pub fn spawn(config: &HubConfig) -> (HubHandle, JoinHandle<()>) {
    let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity.max(1));
    let task = tokio::spawn(Hub::new(config).run(intake_rx));
    (HubHandle::new(intake_tx), task)
}
