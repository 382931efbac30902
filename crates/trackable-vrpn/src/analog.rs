//! [`AnalogRemote`] – client for a `vrpn_Analog` device.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use trackable_types::{AnalogReport, ConnectionDescriptor, TrackableError};

use crate::codec::{self, ANALOG_CHANNEL_TYPE};
use crate::connection::{Connection, Message};
use crate::remote::{HandlerTable, Remote};

/// Receives channel reports from one analog device.
pub struct AnalogRemote {
    device: String,
    connection: Connection,
    handlers: HandlerTable<AnalogReport>,
}

impl AnalogRemote {
    /// Connect to `descriptor` and announce interest in analog reports.
    pub async fn open(
        descriptor: &ConnectionDescriptor,
        connect_timeout: Duration,
    ) -> Result<Self, TrackableError> {
        let connection =
            Connection::open(descriptor, &[ANALOG_CHANNEL_TYPE], connect_timeout).await?;
        Ok(Self {
            device: descriptor.device.clone(),
            connection,
            handlers: HandlerTable::new(),
        })
    }

    fn dispatch(&self, messages: Vec<Message>) -> Result<usize, TrackableError> {
        let mut dispatched = 0;
        for message in messages {
            if !message.is(&self.device, ANALOG_CHANNEL_TYPE) {
                debug!(sender = %message.sender, kind = %message.kind, "skipping message");
                continue;
            }
            let channels = codec::decode_analog(&message.body).inspect_err(|e| {
                warn!(address = %self.address(), error = %e, "malformed analog report");
            })?;
            let report = AnalogReport {
                channels,
                timestamp: message.timestamp,
            };
            self.handlers.dispatch(&report);
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

#[async_trait]
impl Remote for AnalogRemote {
    type Report = AnalogReport;

    fn address(&self) -> &str {
        self.connection.address()
    }

    fn change_handlers(&self) -> &HandlerTable<AnalogReport> {
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

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn handler_receives_channels_from_sim() {
        let sim = SimServer::new("Joystick")
            .with_analog(vec![1.0, 2.0, 3.0, 4.0])
            .with_interval(Duration::from_millis(5))
            .bind("127.0.0.1:0")
            .await
            .unwrap();

        let mut remote = AnalogRemote::open(&sim.descriptor(), TIMEOUT).await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _reg = remote.register_change_handler(move |r: &AnalogReport| {
            sink.lock().unwrap().push(r.channels.clone());
        });

        while remote.pump().await.unwrap() == 0 {}

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn reports_from_other_devices_are_ignored() {
        let sim = SimServer::new("SomeoneElse")
            .with_analog(vec![9.0])
            .with_interval(Duration::from_millis(5))
            .bind("127.0.0.1:0")
            .await
            .unwrap();

        let mut desc = sim.descriptor();
        desc.device = "Joystick".to_string();
        let mut remote = AnalogRemote::open(&desc, TIMEOUT).await.unwrap();
        let _reg = remote.register_change_handler(|_| panic!("must not fire"));

        let outcome = tokio::time::timeout(Duration::from_millis(100), async {
            let mut dispatched = 0;
            while dispatched == 0 {
                dispatched = remote.pump().await.unwrap();
            }
            dispatched
        })
        .await;
        assert!(outcome.is_err(), "pumping should only end by timeout");
    }

    #[tokio::test]
    async fn truncated_report_is_a_protocol_error() {
        let sim = SimServer::new("Joystick")
            .silent()
            .bind("127.0.0.1:0")
            .await
            .unwrap();
        let remote = AnalogRemote::open(&sim.descriptor(), TIMEOUT).await.unwrap();
        let _reg = remote.register_change_handler(|_| panic!("must not fire"));

        let truncated = Message {
            sender: "Joystick".to_string(),
            kind: ANALOG_CHANNEL_TYPE.to_string(),
            timestamp: chrono::Utc::now(),
            body: vec![0u8; 3],
        };
        let err = remote.dispatch(vec![truncated]).unwrap_err();
        assert!(matches!(err, TrackableError::Protocol(_)));
    }

    #[tokio::test]
    async fn mainloop_without_data_dispatches_nothing() {
        let sim = SimServer::new("Joystick")
            .silent()
            .bind("127.0.0.1:0")
            .await
            .unwrap();
        let mut remote = AnalogRemote::open(&sim.descriptor(), TIMEOUT).await.unwrap();
        assert_eq!(remote.mainloop().unwrap(), 0);
    }
}
