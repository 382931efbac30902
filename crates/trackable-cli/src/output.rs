//! Rendering of fetched samples and errors for the terminal.

use serde::Serialize;
use trackable_types::TrackableError;

use crate::config::OutputFormat;

/// Which fetch produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Analog,
    Tracker,
}

impl DeviceKind {
    /// Row labels in output order.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            DeviceKind::Analog => &["x", "y", "z"],
            DeviceKind::Tracker => &["x", "y", "z", "qi", "qj", "qk", "qr"],
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Analog => write!(f, "analog"),
            DeviceKind::Tracker => write!(f, "tracker"),
        }
    }
}

/// A successful fetch, ready to print.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleOutput {
    pub kind: DeviceKind,
    pub address: String,
    pub values: Vec<f64>,
}

impl SampleOutput {
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self
                .kind
                .labels()
                .iter()
                .zip(&self.values)
                .map(|(label, value)| format!("{label:>2} = {value:.6}"))
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Json => serde_json::to_string(self)
                .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}")),
        }
    }
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    identifier: String,
    message: String,
    detail: &'a TrackableError,
}

/// `identifier: message` in text mode, an object in JSON mode.
pub fn render_error(err: &TrackableError, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{}: {}", err.identifier(), err),
        OutputFormat::Json => serde_json::to_string(&ErrorOutput {
            identifier: err.identifier(),
            message: err.to_string(),
            detail: err,
        })
        .unwrap_or_else(|_| format!("{}: {}", err.identifier(), err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_sample() -> SampleOutput {
        SampleOutput {
            kind: DeviceKind::Tracker,
            address: "BrushBot@localhost:3883".to_string(),
            values: vec![0.1, 0.2, 0.3, 0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn text_has_one_labelled_row_per_value() {
        let text = tracker_sample().render(OutputFormat::Text);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], " x = 0.100000");
        assert_eq!(lines[6], "qr = 1.000000");
    }

    #[test]
    fn json_carries_kind_address_and_values() {
        let json = tracker_sample().render(OutputFormat::Json);
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["kind"], "tracker");
        assert_eq!(v["address"], "BrushBot@localhost:3883");
        assert_eq!(v["values"].as_array().unwrap().len(), 7);
    }

    #[test]
    fn text_error_is_identifier_then_message() {
        let err = TrackableError::TooFewInputs { given: 2 };
        assert_eq!(
            render_error(&err, OutputFormat::Text),
            "trackable:getTrackableData:nInputs: Too few input arguments."
        );
    }

    #[test]
    fn json_error_round_trips_detail() {
        let err = TrackableError::NoData {
            address: "Joystick@localhost:3883".to_string(),
            waited_ms: 1000,
        };
        let v: serde_json::Value =
            serde_json::from_str(&render_error(&err, OutputFormat::Json)).unwrap();
        assert_eq!(v["identifier"], "trackable:getTrackableData:noData");
        assert_eq!(v["message"], "Unable to get data from server.");
        let detail: TrackableError = serde_json::from_value(v["detail"].clone()).unwrap();
        assert_eq!(detail, err);
    }
}
