use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port a VRPN server listens on when the address token carries none.
pub const DEFAULT_VRPN_PORT: u16 = 3883;

/// Prefix shared by every error identifier surfaced to a host runtime.
pub const ERROR_NAMESPACE: &str = "trackable:getTrackableData";

/// Where to find one device: `device@host:port`.
///
/// The three parts are stored verbatim.  Nothing beyond "present" is checked
/// here; a malformed host or port is only rejected when the protocol layer
/// tries to connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Sender name of the device on the server, e.g. `"BrushBot"`.
    pub device: String,
    pub host: String,
    /// Kept as text, exactly as the caller supplied it.
    pub port: String,
}

impl ConnectionDescriptor {
    pub fn new(
        device: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            device: device.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    /// The address token, `device@host:port`.
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.device, self.host, self.port)
    }

    /// Parse the port as a TCP port number.
    ///
    /// # Errors
    ///
    /// Returns [`TrackableError::ConnectionFailed`] when the port is not a
    /// number in `0..=65535`.
    pub fn port_number(&self) -> Result<u16, TrackableError> {
        self.port
            .trim()
            .parse::<u16>()
            .map_err(|e| TrackableError::ConnectionFailed {
                address: self.address(),
                details: format!("invalid port '{}': {e}", self.port),
            })
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.device, self.host, self.port)
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = TrackableError;

    /// Parse `device@host[:port]`.  A missing port means
    /// [`DEFAULT_VRPN_PORT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |details: &str| TrackableError::ConnectionFailed {
            address: s.to_string(),
            details: details.to_string(),
        };

        let (device, location) = s
            .split_once('@')
            .ok_or_else(|| invalid("missing '@' between device and host"))?;
        if device.is_empty() {
            return Err(invalid("empty device name"));
        }

        let (host, port) = match location.rsplit_once(':') {
            Some((host, port)) => (host, port.to_string()),
            None => (location, DEFAULT_VRPN_PORT.to_string()),
        };
        if host.is_empty() {
            return Err(invalid("empty host name"));
        }

        Ok(Self::new(device, host, port))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reports (raw callback payloads)
// ────────────────────────────────────────────────────────────────────────────

/// One `vrpn_Analog Channel` message as delivered to a change handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogReport {
    pub channels: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}

/// One `vrpn_Tracker Pos_Quat` message as delivered to a change handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerReport {
    pub sensor: i32,
    pub position: [f64; 3],
    /// Quaternion in `[i, j, k, r]` order.
    pub orientation: [f64; 4],
    pub timestamp: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Samples (what a fetch returns)
// ────────────────────────────────────────────────────────────────────────────

/// A fixed-shape numeric sample.
pub trait Sample {
    /// Number of values in [`Sample::to_vec`].
    const LEN: usize;

    /// Values in their fixed output order.
    fn to_vec(&self) -> Vec<f64>;
}

/// `[x, y, z]` read from the first three analog channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogSample {
    pub position: [f64; 3],
}

impl AnalogSample {
    /// Channels past the third are dropped; missing ones read as `0.0`.
    pub fn from_channels(channels: &[f64]) -> Self {
        let mut position = [0.0; 3];
        for (slot, value) in position.iter_mut().zip(channels) {
            *slot = *value;
        }
        Self { position }
    }
}

impl From<&AnalogReport> for AnalogSample {
    fn from(report: &AnalogReport) -> Self {
        Self::from_channels(&report.channels)
    }
}

impl Sample for AnalogSample {
    const LEN: usize = 3;

    fn to_vec(&self) -> Vec<f64> {
        self.position.to_vec()
    }
}

/// Position plus orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerSample {
    pub position: [f64; 3],
    /// `[i, j, k, r]`
    pub orientation: [f64; 4],
}

impl From<&TrackerReport> for TrackerSample {
    fn from(report: &TrackerReport) -> Self {
        Self {
            position: report.position,
            orientation: report.orientation,
        }
    }
}

impl Sample for TrackerSample {
    const LEN: usize = 7;

    /// `[x, y, z, qi, qj, qk, qr]`
    fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.position);
        out.extend_from_slice(&self.orientation);
        out
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Coarse failure category, used to build host error identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NInputs,
    InputNotString,
    NoData,
    Connect,
    Protocol,
    Runtime,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NInputs => "nInputs",
            ErrorKind::InputNotString => "inputNotString",
            ErrorKind::NoData => "noData",
            ErrorKind::Connect => "connect",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Runtime => "runtime",
        }
    }
}

/// Every way a fetch can fail.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackableError {
    #[error("Too few input arguments.")]
    TooFewInputs { given: usize },

    #[error("Too many input arguments.")]
    TooManyInputs { given: usize },

    /// `position` is zero-based.
    #[error("Input arguments must be a string.")]
    InputNotString { position: usize },

    #[error("Unable to get data from server.")]
    NoData { address: String, waited_ms: u64 },

    #[error("Unable to connect to server: {address}: {details}")]
    ConnectionFailed { address: String, details: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl TrackableError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackableError::TooFewInputs { .. } | TrackableError::TooManyInputs { .. } => {
                ErrorKind::NInputs
            }
            TrackableError::InputNotString { .. } => ErrorKind::InputNotString,
            TrackableError::NoData { .. } => ErrorKind::NoData,
            TrackableError::ConnectionFailed { .. } => ErrorKind::Connect,
            TrackableError::Protocol(_) => ErrorKind::Protocol,
            TrackableError::Runtime(_) => ErrorKind::Runtime,
        }
    }

    /// Hierarchical identifier, e.g. `trackable:getTrackableData:noData`.
    pub fn identifier(&self) -> String {
        format!("{ERROR_NAMESPACE}:{}", self.kind().as_str())
    }
}
