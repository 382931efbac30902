//! `trackable-fetch` – one-shot sample retrieval from VRPN devices
//!
//! Connects to a device, waits (bounded) for its first report, returns a
//! fixed-shape sample and disconnects.  Every call is self-contained: no
//! state survives between calls and concurrent calls do not interfere.
//!
//! # Modules
//!
//! - [`config`] – [`FetchConfig`]: connect timeout and report deadline.
//! - [`fetcher`] – async [`fetch_analog`] / [`fetch_tracker`].
//! - [`host`] – blocking entry points taking raw host arguments and
//!   returning column matrices.
//!
//! # Example
//!
//! ```rust,no_run
//! use trackable_fetch::{FetchConfig, HostValue, get_tracker_data};
//!
//! let inputs = ["BrushBot", "192.168.1.145", "3883"].map(HostValue::from);
//! match get_tracker_data(&inputs, &FetchConfig::default()) {
//!     Ok(m) => println!("{:?}", m.as_slice()),
//!     Err(e) => eprintln!("{}: {e}", e.identifier()),
//! }
//! ```

pub mod config;
pub mod fetcher;
pub mod host;

pub use config::FetchConfig;
pub use fetcher::{await_report, fetch_analog, fetch_tracker};
pub use host::{HostMatrix, HostValue, get_analog_data, get_tracker_data, parse_inputs};
