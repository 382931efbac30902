//! In-process VRPN server for tests and demos without motion-capture
//! hardware.
//!
//! [`SimServer`] plays the server half of the protocol: cookie exchange,
//! sender/type descriptions, then a steady stream of analog and tracker
//! reports for one device.  Values can be changed while clients are
//! connected.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), trackable_types::TrackableError> {
//! use std::time::Duration;
//! use trackable_vrpn::sim::SimServer;
//!
//! let sim = SimServer::new("BrushBot")
//!     .with_tracker([0.1, 0.2, 0.3], [0.0, 0.0, 0.0, 1.0])
//!     .with_interval(Duration::from_millis(10))
//!     .bind("127.0.0.1:0")
//!     .await?;
//!
//! println!("serving {}", sim.descriptor());
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use trackable_types::{ConnectionDescriptor, TrackableError};

use crate::codec::{
    self, ANALOG_CHANNEL_TYPE, COOKIE_LEN, Frame, SENDER_DESCRIPTION,
    TRACKER_POS_QUAT_TYPE, TYPE_DESCRIPTION,
};

const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// Ids the simulator uses in its own numbering.
const DEVICE_SENDER_ID: i32 = 0;
const ANALOG_TYPE_ID: i32 = 0;
const TRACKER_TYPE_ID: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SimPose {
    position: [f64; 3],
    orientation: [f64; 4],
}

#[derive(Debug, Clone, Default, PartialEq)]
struct SimState {
    analog: Option<Vec<f64>>,
    tracker: Option<SimPose>,
}

/// Builder for a simulated VRPN device server.
pub struct SimServer {
    device: String,
    state: SimState,
    interval: Duration,
    cookie: [u8; COOKIE_LEN],
}

impl SimServer {
    /// A server for `device` that reports nothing until a `with_*` payload
    /// is added.
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            state: SimState::default(),
            interval: DEFAULT_INTERVAL,
            cookie: codec::encode_cookie(),
        }
    }

    /// Stream analog reports carrying `channels`.
    pub fn with_analog(mut self, channels: Vec<f64>) -> Self {
        self.state.analog = Some(channels);
        self
    }

    /// Stream tracker reports for sensor 0.
    pub fn with_tracker(mut self, position: [f64; 3], orientation: [f64; 4]) -> Self {
        self.state.tracker = Some(SimPose {
            position,
            orientation,
        });
        self
    }

    /// Time between report bursts.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Handshake and describe, but never report.
    pub fn silent(mut self) -> Self {
        self.state = SimState::default();
        self
    }

    /// Greet clients with a different cookie, e.g. an incompatible version.
    pub fn with_cookie(mut self, cookie: &[u8]) -> Self {
        self.cookie = codec::cookie_from(cookie);
        self
    }

    /// Bind to `addr` and start serving in the background.
    ///
    /// # Errors
    ///
    /// Returns [`TrackableError::ConnectionFailed`] if the listener cannot be
    /// bound.
    pub async fn bind(self, addr: &str) -> Result<SimHandle, TrackableError> {
        let bind_failed = |e: std::io::Error| TrackableError::ConnectionFailed {
            address: addr.to_string(),
            details: format!("sim bind error: {e}"),
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_failed)?;
        let local_addr = listener.local_addr().map_err(bind_failed)?;

        let (state_tx, state_rx) = watch::channel(self.state);
        let client = ClientConfig {
            device: self.device.clone(),
            cookie: self.cookie,
            interval: self.interval,
        };
        let task = tokio::spawn(accept_loop(listener, client, state_rx));
        info!(device = %self.device, addr = %local_addr, "vrpn simulator listening");

        Ok(SimHandle {
            device: self.device,
            local_addr,
            state: state_tx,
            task,
        })
    }
}

/// A running simulator.  Dropping the handle stops it.
pub struct SimHandle {
    device: String,
    local_addr: SocketAddr,
    state: watch::Sender<SimState>,
    task: JoinHandle<()>,
}

impl SimHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Descriptor a client should use to reach this simulator.
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(
            self.device.clone(),
            self.local_addr.ip().to_string(),
            self.local_addr.port().to_string(),
        )
    }

    /// Replace the analog channels sent from the next burst on.
    pub fn set_analog(&self, channels: Vec<f64>) {
        self.state.send_modify(|s| s.analog = Some(channels));
    }

    /// Replace the tracker pose sent from the next burst on.
    pub fn set_tracker(&self, position: [f64; 3], orientation: [f64; 4]) {
        self.state.send_modify(|s| {
            s.tracker = Some(SimPose {
                position,
                orientation,
            })
        });
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Server tasks
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct ClientConfig {
    device: String,
    cookie: [u8; COOKIE_LEN],
    interval: Duration,
}

async fn accept_loop(
    listener: TcpListener,
    client: ClientConfig,
    state: watch::Receiver<SimState>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let client = client.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_client(stream, peer, client, state).await {
                        error!(peer = %peer, error = %e, "sim client error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "sim accept error");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

async fn serve_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    client: ClientConfig,
    mut state: watch::Receiver<SimState>,
) -> Result<(), TrackableError> {
    let io = |e: std::io::Error| TrackableError::ConnectionFailed {
        address: peer.to_string(),
        details: e.to_string(),
    };

    stream.write_all(&client.cookie).await.map_err(io)?;
    let mut peer_cookie = [0u8; COOKIE_LEN];
    stream.read_exact(&mut peer_cookie).await.map_err(io)?;
    codec::check_cookie(&peer_cookie)?;
    debug!(peer = %peer, "sim client connected");

    let (mut reader, mut writer) = stream.into_split();

    let mut out =
        codec::description_frame(SENDER_DESCRIPTION, DEVICE_SENDER_ID, &client.device).encode();
    out.extend(codec::description_frame(TYPE_DESCRIPTION, ANALOG_TYPE_ID, ANALOG_CHANNEL_TYPE).encode());
    out.extend(
        codec::description_frame(TYPE_DESCRIPTION, TRACKER_TYPE_ID, TRACKER_POS_QUAT_TYPE).encode(),
    );
    writer.write_all(&out).await.map_err(io)?;

    let mut ticker = tokio::time::interval(client.interval);
    let mut scratch = [0u8; 512];
    loop {
        tokio::select! {
            // Client traffic (its own descriptions) is read and discarded so
            // that a hang-up is noticed even when nothing is being sent.
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            _ = ticker.tick() => {
                if state.has_changed().is_err() {
                    // Handle dropped.
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                let burst = encode_burst(&snapshot);
                if !burst.is_empty() && writer.write_all(&burst).await.is_err() {
                    break;
                }
            }
        }
    }

    debug!(peer = %peer, "sim client gone");
    Ok(())
}

fn encode_burst(state: &SimState) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(channels) = &state.analog {
        out.extend(Frame::new(DEVICE_SENDER_ID, ANALOG_TYPE_ID, codec::encode_analog(channels)).encode());
    }
    if let Some(pose) = state.tracker {
        let body = codec::encode_pos_quat(0, pose.position, pose.orientation);
        out.extend(Frame::new(DEVICE_SENDER_ID, TRACKER_TYPE_ID, body).encode());
    }
    out
}
