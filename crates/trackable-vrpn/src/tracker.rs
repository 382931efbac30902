//! [`TrackerRemote`] – client for a `vrpn_Tracker` device.
//!
//! Every sensor of the device is reported; [`TrackerReport::sensor`] tells
//! them apart.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use trackable_types::{ConnectionDescriptor, TrackableError, TrackerReport};

use crate::codec::{self, TRACKER_POS_QUAT_TYPE};
use crate::connection::{Connection, Message};
use crate::remote::{HandlerTable, Remote};

/// Receives position/orientation reports from one tracker device.
pub struct TrackerRemote {
    device: String,
    connection: Connection,
    handlers: HandlerTable<TrackerReport>,
}

impl TrackerRemote {
    /// Connect to `descriptor` and announce interest in pose reports.
    pub async fn open(
        descriptor: &ConnectionDescriptor,
        connect_timeout: Duration,
    ) -> Result<Self, TrackableError> {
        let connection =
            Connection::open(descriptor, &[TRACKER_POS_QUAT_TYPE], connect_timeout).await?;
        Ok(Self {
            device: descriptor.device.clone(),
            connection,
            handlers: HandlerTable::new(),
        })
    }

    fn dispatch(&self, messages: Vec<Message>) -> Result<usize, TrackableError> {
        let mut dispatched = 0;
        for message in messages {
            if !message.is(&self.device, TRACKER_POS_QUAT_TYPE) {
                debug!(sender = %message.sender, kind = %message.kind, "skipping message");
                continue;
            }
            let (sensor, position, orientation) = codec::decode_pos_quat(&message.body)
                .inspect_err(|e| {
                    warn!(address = %self.address(), error = %e, "malformed tracker report");
                })?;
            let report = TrackerReport {
                sensor,
                position,
                orientation,
                timestamp: message.timestamp,
            };
            self.handlers.dispatch(&report);
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

#[async_trait]
impl Remote for TrackerRemote {
    type Report = TrackerReport;

    fn address(&self) -> &str {
        self.connection.address()
    }

    fn change_handlers(&self) -> &HandlerTable<TrackerReport> {
        &self.handlers
    }

    async fn pump(&mut self) -> Result<usize, TrackableError> {
        let messages = self.connection.receive().await?;
        self.dispatch(messages)
    }

    fn mainloop(&mut self) -> Result<usize, TrackableError> {
        let messages = self.connection.drain()?;
        self.dispatch(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimServer;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn handler_receives_pose_from_sim() {
        let sim = SimServer::new("BrushBot")
            .with_tracker([0.1, 0.2, 0.3], [0.0, 0.0, 0.0, 1.0])
            .with_interval(Duration::from_millis(5))
            .bind("127.0.0.1:0")
            .await
            .unwrap();

        let mut remote = TrackerRemote::open(&sim.descriptor(), Duration::from_secs(2))
            .await
            .unwrap();
        let latest = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&latest);
        let reg = remote.register_change_handler(move |r: &TrackerReport| {
            *sink.lock().unwrap() = Some(r.clone());
        });

        while remote.pump().await.unwrap() == 0 {}
        assert!(reg.unregister());
        assert!(remote.change_handlers().is_empty());

        let report = latest.lock().unwrap().clone().unwrap();
        assert_eq!(report.sensor, 0);
        assert_eq!(report.position, [0.1, 0.2, 0.3]);
        assert_eq!(report.orientation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn analog_traffic_does_not_reach_tracker_handlers() {
        let sim = SimServer::new("BrushBot")
            .with_analog(vec![1.0, 2.0, 3.0])
            .with_interval(Duration::from_millis(5))
            .bind("127.0.0.1:0")
            .await
            .unwrap();

        let mut remote = TrackerRemote::open(&sim.descriptor(), Duration::from_secs(2))
            .await
            .unwrap();
        let _reg = remote.register_change_handler(|_| panic!("must not fire"));

        for _ in 0..5 {
            assert_eq!(remote.pump().await.unwrap(), 0);
        }
    }
}
