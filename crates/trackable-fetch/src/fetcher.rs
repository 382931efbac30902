//! One-shot fetch: connect, wait for the first report, disconnect.
//!
//! Each call owns its connection and its result slot.  The change handler
//! writes into a `watch` channel local to the call, so concurrent fetches
//! never see each other's reports.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use trackable_types::{AnalogSample, ConnectionDescriptor, TrackableError, TrackerSample};
use trackable_vrpn::{AnalogRemote, Remote, TrackerRemote};

use crate::config::FetchConfig;

/// Read `[x, y, z]` from the first three channels of an analog device.
///
/// # Errors
///
/// * [`TrackableError::ConnectionFailed`] – the server could not be reached
///   within `config.connect_timeout`.
/// * [`TrackableError::Protocol`] – the server is not a compatible VRPN
///   server.
/// * [`TrackableError::NoData`] – no report arrived within `config.deadline`.
#[instrument(skip(config), fields(address = %descriptor))]
pub async fn fetch_analog(
    descriptor: &ConnectionDescriptor,
    config: &FetchConfig,
) -> Result<AnalogSample, TrackableError> {
    let remote = AnalogRemote::open(descriptor, config.connect_timeout).await?;
    let report = await_report(remote, config.deadline).await?;
    if report.channels.len() < 3 {
        debug!(channels = report.channels.len(), "short analog report, zero-filling");
    }
    let sample = AnalogSample::from(&report);
    info!(position = ?sample.position, "analog sample received");
    Ok(sample)
}

/// Read position and orientation from a tracker device.
///
/// Errors as for [`fetch_analog`].
#[instrument(skip(config), fields(address = %descriptor))]
pub async fn fetch_tracker(
    descriptor: &ConnectionDescriptor,
    config: &FetchConfig,
) -> Result<TrackerSample, TrackableError> {
    let remote = TrackerRemote::open(descriptor, config.connect_timeout).await?;
    let report = await_report(remote, config.deadline).await?;
    let sample = TrackerSample::from(&report);
    info!(
        sensor = report.sensor,
        position = ?sample.position,
        orientation = ?sample.orientation,
        "tracker sample received"
    );
    Ok(sample)
}

/// Pump `remote` until its first report, then flush once more and return the
/// most recent report seen.
///
/// The handler is unregistered and the connection closed on every path out
/// of this function, including the deadline and error paths.
pub async fn await_report<R: Remote>(
    mut remote: R,
    deadline: Duration,
) -> Result<R::Report, TrackableError> {
    let (slot, latest) = watch::channel::<Option<R::Report>>(None);
    let registration = remote.register_change_handler(move |report: &R::Report| {
        slot.send_replace(Some(report.clone()));
    });

    let started = Instant::now();
    let waited = timeout(deadline, async {
        loop {
            remote.pump().await?;
            if latest.borrow().is_some() {
                return Ok::<(), TrackableError>(());
            }
        }
    })
    .await;

    match waited {
        Ok(pumped) => pumped?,
        Err(_) => {
            warn!(address = %remote.address(), ?deadline, "no report before deadline");
            return Err(TrackableError::NoData {
                address: remote.address().to_string(),
                waited_ms: deadline.as_millis() as u64,
            });
        }
    }

    // Anything that landed together with the first report.
    match remote.mainloop() {
        Ok(flushed) => debug!(flushed, "trailing pump"),
        Err(e) => debug!(error = %e, "trailing pump failed, keeping received report"),
    }
    registration.unregister();
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "report received");

    let report = latest.borrow().clone();
    report.ok_or_else(|| TrackableError::NoData {
        address: remote.address().to_string(),
        waited_ms: deadline.as_millis() as u64,
    })
}
