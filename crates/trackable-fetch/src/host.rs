//! Blocking entry points for a numeric host runtime.
//!
//! A host calls [`get_analog_data`] or [`get_tracker_data`] with its raw
//! argument list.  Arguments are validated before any network activity, then
//! a private current-thread runtime drives the fetch to completion.  Results
//! come back as a single-column matrix.

use std::future::Future;

use tracing::debug;
use trackable_types::{ConnectionDescriptor, Sample, TrackableError};

use crate::config::FetchConfig;
use crate::fetcher::{fetch_analog, fetch_tracker};

/// Number of arguments every entry point takes: device, host, port.
pub const EXPECTED_INPUTS: usize = 3;

/// One argument as handed over by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// Character matrix, one entry per row.
    Char(Vec<String>),
    Numeric(Vec<f64>),
    Logical(Vec<bool>),
}

impl HostValue {
    /// A character value.  Each `\n` starts a new row; the empty string has
    /// no rows.
    pub fn text(s: &str) -> Self {
        if s.is_empty() {
            Self::Char(Vec::new())
        } else {
            Self::Char(s.split('\n').map(str::to_string).collect())
        }
    }

    /// The value as a one-row, non-empty string, if it is one.
    pub fn as_single_line(&self) -> Option<&str> {
        match self {
            Self::Char(rows) if rows.len() == 1 && !rows[0].is_empty() => Some(&rows[0]),
            _ => None,
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Numeric(vec![v])
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Logical(vec![v])
    }
}

/// Column-major `f64` matrix returned to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl HostMatrix {
    /// An `n × 1` column holding `values`.
    pub fn column(values: Vec<f64>) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Check arity first, then that every argument is a one-line string.
///
/// # Errors
///
/// [`TrackableError::TooFewInputs`], [`TrackableError::TooManyInputs`] or
/// [`TrackableError::InputNotString`] (position is zero-based).
pub fn parse_inputs(inputs: &[HostValue]) -> Result<ConnectionDescriptor, TrackableError> {
    let given = inputs.len();
    if given < EXPECTED_INPUTS {
        return Err(TrackableError::TooFewInputs { given });
    }
    if given > EXPECTED_INPUTS {
        return Err(TrackableError::TooManyInputs { given });
    }

    let mut parts = Vec::with_capacity(EXPECTED_INPUTS);
    for (position, value) in inputs.iter().enumerate() {
        let part = value
            .as_single_line()
            .ok_or(TrackableError::InputNotString { position })?;
        parts.push(part);
    }
    Ok(ConnectionDescriptor::new(parts[0], parts[1], parts[2]))
}

/// `getAnalogData(device, host, port)`: a 3×1 column `[x; y; z]`.
pub fn get_analog_data(
    inputs: &[HostValue],
    config: &FetchConfig,
) -> Result<HostMatrix, TrackableError> {
    let descriptor = parse_inputs(inputs)?;
    let sample = block_on(fetch_analog(&descriptor, config))??;
    Ok(HostMatrix::column(sample.to_vec()))
}

/// `getTrackerData(device, host, port)`: a 7×1 column
/// `[x; y; z; qi; qj; qk; qr]`.
pub fn get_tracker_data(
    inputs: &[HostValue],
    config: &FetchConfig,
) -> Result<HostMatrix, TrackableError> {
    let descriptor = parse_inputs(inputs)?;
    let sample = block_on(fetch_tracker(&descriptor, config))??;
    Ok(HostMatrix::column(sample.to_vec()))
}

fn block_on<F: Future>(future: F) -> Result<F::Output, TrackableError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(TrackableError::Runtime(
            "blocking entry point called from inside an async runtime".into(),
        ));
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TrackableError::Runtime(format!("cannot start runtime: {e}")))?;
    debug!("fetch runtime started");
    Ok(runtime.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trackable_types::ErrorKind;
    use trackable_vrpn::SimServer;

    fn args(device: &str, host: &str, port: &str) -> Vec<HostValue> {
        vec![device.into(), host.into(), port.into()]
    }

    #[test]
    fn arity_is_checked_before_types() {
        for given in [0, 1, 2] {
            let inputs = vec![HostValue::from(1.0); given];
            let err = parse_inputs(&inputs).unwrap_err();
            assert_eq!(err, TrackableError::TooFewInputs { given });
            assert_eq!(err.identifier(), "trackable:getTrackableData:nInputs");
            assert_eq!(err.to_string(), "Too few input arguments.");
        }
        let err = parse_inputs(&vec![HostValue::from(true); 4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NInputs);
        assert_eq!(err.to_string(), "Too many input arguments.");
    }

    #[test]
    fn non_string_in_any_position_is_rejected() {
        for position in 0..EXPECTED_INPUTS {
            let mut inputs = args("Joystick", "localhost", "3883");
            inputs[position] = HostValue::from(3883.0);
            let err = parse_inputs(&inputs).unwrap_err();
            assert_eq!(err, TrackableError::InputNotString { position });
            assert_eq!(err.identifier(), "trackable:getTrackableData:inputNotString");
            assert_eq!(err.to_string(), "Input arguments must be a string.");
        }
    }

    #[test]
    fn empty_and_multi_row_strings_are_rejected() {
        let inputs = args("Joystick", "", "3883");
        assert_eq!(parse_inputs(&inputs).unwrap_err().kind(), ErrorKind::InputNotString);

        let inputs = args("Joy\nstick", "localhost", "3883");
        assert_eq!(parse_inputs(&inputs).unwrap_err().kind(), ErrorKind::InputNotString);
    }

    #[test]
    fn valid_inputs_build_descriptor_verbatim() {
        let desc = parse_inputs(&args("BrushBot", "mocap.local", "3883")).unwrap();
        assert_eq!(desc.address(), "BrushBot@mocap.local:3883");
    }

    #[test]
    fn invalid_arguments_fail_without_network() {
        // Nothing listens on this host; validation must fail first.
        let mut inputs = args("Joystick", "unreachable.invalid", "1");
        inputs.push("extra".into());
        let err = get_analog_data(&inputs, &FetchConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NInputs);
    }

    #[test]
    fn matrices_are_single_columns() {
        let sim_rt = tokio::runtime::Runtime::new().unwrap();
        let sim = sim_rt.block_on(async {
            SimServer::new("BrushBot")
                .with_analog(vec![1.0, 2.0, 3.0, 4.0])
                .with_tracker([0.1, 0.2, 0.3], [0.0, 0.0, 0.0, 1.0])
                .with_interval(Duration::from_millis(5))
                .bind("127.0.0.1:0")
                .await
                .unwrap()
        });
        let port = sim.local_addr().port().to_string();
        let inputs = args("BrushBot", "127.0.0.1", &port);
        let cfg = FetchConfig::default();

        let analog = get_analog_data(&inputs, &cfg).unwrap();
        assert_eq!((analog.rows, analog.cols), (3, 1));
        assert_eq!(analog.as_slice(), &[1.0, 2.0, 3.0]);

        let tracker = get_tracker_data(&inputs, &cfg).unwrap();
        assert_eq!((tracker.rows, tracker.cols), (7, 1));
        assert_eq!(tracker.as_slice(), &[0.1, 0.2, 0.3, 0.0, 0.0, 0.0, 1.0]);

        drop(sim);
    }

    #[tokio::test]
    async fn nested_runtime_is_refused() {
        let inputs = args("Joystick", "127.0.0.1", "3883");
        let err = get_tracker_data(&inputs, &FetchConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }
}
