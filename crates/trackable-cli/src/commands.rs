//! Actions shared by the one-shot command line and the interactive shell.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::info;
use trackable_fetch::{HostValue, get_analog_data, get_tracker_data, parse_inputs};
use trackable_types::TrackableError;
use trackable_vrpn::{SimHandle, SimServer};

use crate::config::Config;
use crate::output::{DeviceKind, SampleOutput};

const SIM_TICK: Duration = Duration::from_millis(20);

/// Fetch one sample.  `args` go through the host argument checks verbatim.
pub fn fetch(kind: DeviceKind, args: &[String], cfg: &Config) -> Result<SampleOutput, TrackableError> {
    let inputs: Vec<HostValue> = args.iter().map(|a| HostValue::text(a)).collect();
    let fetch_cfg = cfg.fetch_config();
    let matrix = match kind {
        DeviceKind::Analog => get_analog_data(&inputs, &fetch_cfg)?,
        DeviceKind::Tracker => get_tracker_data(&inputs, &fetch_cfg)?,
    };
    Ok(SampleOutput {
        kind,
        address: parse_inputs(&inputs)?.address(),
        values: matrix.data,
    })
}

/// Start a simulator for `device` on all interfaces.
pub async fn start_sim(device: &str, port: u16) -> Result<SimHandle, TrackableError> {
    let (position, orientation) = demo_pose(0.0);
    let sim = SimServer::new(device)
        .with_analog(position.to_vec())
        .with_tracker(position, orientation)
        .bind(&format!("0.0.0.0:{port}"))
        .await?;
    info!(device, port = sim.local_addr().port(), "simulator started");
    Ok(sim)
}

/// Move the simulated device until `shutdown` is set.
pub async fn animate(sim: &SimHandle, shutdown: Arc<AtomicBool>) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(SIM_TICK);
    while !shutdown.load(Ordering::SeqCst) {
        ticker.tick().await;
        let (position, orientation) = demo_pose(started.elapsed().as_secs_f64());
        sim.set_tracker(position, orientation);
        sim.set_analog(position.to_vec());
    }
}

/// A slow circle of radius 0.5 m at 1 m height, facing along the path.
pub fn demo_pose(t: f64) -> ([f64; 3], [f64; 4]) {
    let angle = t * 0.5;
    let position = [0.5 * angle.cos(), 0.5 * angle.sin(), 1.0];
    let half_yaw = (angle + std::f64::consts::FRAC_PI_2) / 2.0;
    let orientation = [0.0, 0.0, half_yaw.sin(), half_yaw.cos()];
    (position, orientation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackable_types::ErrorKind;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn demo_pose_keeps_unit_quaternion() {
        for t in [0.0, 1.3, 7.9, 100.0] {
            let (position, q) = demo_pose(t);
            let norm: f64 = q.iter().map(|v| v * v).sum();
            assert!((norm - 1.0).abs() < 1e-9);
            assert_eq!(position[2], 1.0);
        }
    }

    #[test]
    fn argv_arity_is_checked() {
        let err = fetch(DeviceKind::Analog, &strings(&["Joystick", "localhost"]), &Config::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NInputs);
    }

    #[test]
    fn empty_argument_is_not_a_string() {
        let err = fetch(DeviceKind::Tracker, &strings(&["Joystick", "", "3883"]), &Config::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputNotString);
    }

    #[test]
    fn fetch_against_started_sim() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let sim = rt.block_on(start_sim("Wand", 0)).unwrap();
        let port = sim.local_addr().port().to_string();

        let out = fetch(
            DeviceKind::Tracker,
            &strings(&["Wand", "127.0.0.1", &port]),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(out.kind, DeviceKind::Tracker);
        assert_eq!(out.address, format!("Wand@127.0.0.1:{port}"));
        assert_eq!(out.values.len(), 7);
        assert_eq!(out.values[2], 1.0);
    }
}
