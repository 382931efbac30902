//! `trackable-vrpn` – VRPN client plumbing
//!
//! Speaks just enough of the VRPN TCP protocol to receive reports from one
//! named device on a motion-capture server.
//!
//! # Modules
//!
//! - [`codec`] – cookie, frame header, description and payload encoding.
//! - [`connection`] – [`Connection`]: one handshaken TCP session that
//!   resolves the peer's sender/type ids to names.
//! - [`remote`] – the [`Remote`] trait plus scoped change-handler
//!   registration.
//! - [`analog`] / [`tracker`] – the two device kinds a fetch can target.
//! - [`sim`] – [`SimServer`][sim::SimServer]: a local server that streams
//!   synthetic reports, used by tests and the CLI `sim` command.

pub mod analog;
pub mod codec;
pub mod connection;
pub mod remote;
pub mod sim;
pub mod tracker;

pub use analog::AnalogRemote;
pub use connection::{Connection, Message};
pub use remote::{HandlerId, HandlerTable, Registration, Remote};
pub use sim::{SimHandle, SimServer};
pub use tracker::TrackerRemote;
