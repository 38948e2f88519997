//! Line-oriented broadcast hub: every line a client sends is relayed to all
//! connected clients.
//!
//! The registry of connected sessions has a single owner, the hub loop, and
//! everything else talks to it by message passing:
//!
//! - [`session`] defines session identity and the bounded outbound mailbox.
//! - [`hub`] owns the registry, applies arrival, departure and message events
//!   in order, and evicts sessions whose mailbox stays full.
//! - [`reader`] turns a client's inbound lines into hub events.
//! - [`pump`] drains a session's mailbox to its socket.
//! - [`server`] accepts TCP connections and wires a reader and a pump to each.
//! - [`protocol`] holds the wire format of every line the server sends.
//! - [`client`] is a small interactive client for trying the hub out.
//! - [`cli`] and [`config`] parse flags into [`config::HubConfig`].

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod pump;
pub mod reader;
pub mod server;
pub mod session;
