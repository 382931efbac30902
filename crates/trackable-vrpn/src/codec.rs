//! VRPN TCP wire format.
//!
//! Everything on the wire is big-endian.  A session opens with a fixed-size
//! cookie from each side, after which both peers exchange framed messages:
//!
//! ```text
//! +--------+--------+--------+--------+--------+---------+----------------+
//! | len    | sec    | usec   | sender | type   | pad (4) | body, padded   |
//! | u32    | i32    | i32    | i32    | i32    |         | to 8 bytes     |
//! +--------+--------+--------+--------+--------+---------+----------------+
//! ```
//!
//! `len` counts the 24-byte header plus the *unpadded* body.  Negative type
//! ids are connection control messages; sender and type ids are
//! per-connection and get bound to names by description messages.

use chrono::{DateTime, Utc};
use trackable_types::TrackableError;

/// Cookie this client sends: protocol magic followed by remote-log mode `0`.
pub const COOKIE: &[u8] = b"vrpn: ver. 07.35  0";

/// Cookies are NUL-padded to this many bytes.
pub const COOKIE_LEN: usize = 24;

/// A peer cookie must start with this prefix (same major version).
const COOKIE_MAJOR_PREFIX: &[u8] = b"vrpn: ver. 07.";

/// Alignment applied to headers and bodies.
pub const ALIGN: usize = 8;

/// Header size on the wire, padding included.
pub const HEADER_LEN: usize = 24;

/// Upper bound on a single message body.
///
/// Frames announcing more than this are treated as a protocol violation
/// instead of being buffered.
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// Most channels a `vrpn_Analog` device may report.
pub const MAX_ANALOG_CHANNELS: usize = 128;

pub const SENDER_DESCRIPTION: i32 = -1;
pub const TYPE_DESCRIPTION: i32 = -2;
pub const UDP_DESCRIPTION: i32 = -3;
pub const LOG_DESCRIPTION: i32 = -4;
pub const DISCONNECT_MESSAGE: i32 = -5;

/// Message type name of an analog channel report.
pub const ANALOG_CHANNEL_TYPE: &str = "vrpn_Analog Channel";

/// Message type name of a tracker position/orientation report.
pub const TRACKER_POS_QUAT_TYPE: &str = "vrpn_Tracker Pos_Quat";

const POS_QUAT_BODY_LEN: usize = 4 + 4 + 7 * 8;

fn padded(len: usize) -> usize {
    len.div_ceil(ALIGN) * ALIGN
}

fn protocol(msg: impl Into<String>) -> TrackableError {
    TrackableError::Protocol(msg.into())
}

// ────────────────────────────────────────────────────────────────────────────
// Cookie
// ────────────────────────────────────────────────────────────────────────────

/// Our cookie, NUL-padded to [`COOKIE_LEN`].
pub fn encode_cookie() -> [u8; COOKIE_LEN] {
    cookie_from(COOKIE)
}

/// Pad an arbitrary cookie string to [`COOKIE_LEN`] (truncating if longer).
pub fn cookie_from(text: &[u8]) -> [u8; COOKIE_LEN] {
    let mut out = [0u8; COOKIE_LEN];
    let n = text.len().min(COOKIE_LEN - 1);
    out[..n].copy_from_slice(&text[..n]);
    out
}

/// Check that a peer cookie speaks a compatible protocol version.
///
/// # Errors
///
/// Returns [`TrackableError::Protocol`] when the magic or major version
/// differs.
pub fn check_cookie(cookie: &[u8]) -> Result<(), TrackableError> {
    if cookie.starts_with(COOKIE_MAJOR_PREFIX) {
        return Ok(());
    }
    let end = cookie.iter().position(|b| *b == 0).unwrap_or(cookie.len());
    Err(protocol(format!(
        "incompatible peer cookie '{}'",
        String::from_utf8_lossy(&cookie[..end])
    )))
}

// ────────────────────────────────────────────────────────────────────────────
// Frames
// ────────────────────────────────────────────────────────────────────────────

/// One framed message, ids still in the sender's numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: DateTime<Utc>,
    pub sender: i32,
    pub msg_type: i32,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(sender: i32, msg_type: i32, body: Vec<u8>) -> Self {
        Self {
            timestamp: Utc::now(),
            sender,
            msg_type,
            body,
        }
    }

    /// Serialise header and padded body.
    pub fn encode(&self) -> Vec<u8> {
        let body_len = self.body.len();
        let mut out = Vec::with_capacity(HEADER_LEN + padded(body_len));
        out.extend_from_slice(&((HEADER_LEN + body_len) as u32).to_be_bytes());
        out.extend_from_slice(&(self.timestamp.timestamp() as i32).to_be_bytes());
        out.extend_from_slice(&(self.timestamp.timestamp_subsec_micros() as i32).to_be_bytes());
        out.extend_from_slice(&self.sender.to_be_bytes());
        out.extend_from_slice(&self.msg_type.to_be_bytes());
        out.resize(HEADER_LEN, 0);
        out.extend_from_slice(&self.body);
        out.resize(HEADER_LEN + padded(body_len), 0);
        out
    }

    /// Decode the first frame in `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame, and
    /// otherwise the frame plus the number of bytes it occupied.
    ///
    /// # Errors
    ///
    /// Returns [`TrackableError::Protocol`] for a length field smaller than
    /// the header or a body larger than [`MAX_BODY_LEN`].
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>, TrackableError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let total = read_u32(buf, 0) as usize;
        if total < HEADER_LEN {
            return Err(protocol(format!("frame length {total} shorter than header")));
        }
        let body_len = total - HEADER_LEN;
        if body_len > MAX_BODY_LEN {
            return Err(protocol(format!(
                "frame body of {body_len} bytes exceeds the limit of {MAX_BODY_LEN}"
            )));
        }
        let consumed = HEADER_LEN + padded(body_len);
        if buf.len() < consumed {
            return Ok(None);
        }

        let sec = read_i32(buf, 4);
        let usec = read_i32(buf, 8);
        let timestamp = DateTime::from_timestamp(i64::from(sec), (usec.clamp(0, 999_999) as u32) * 1000)
            .unwrap_or_default();

        let frame = Frame {
            timestamp,
            sender: read_i32(buf, 12),
            msg_type: read_i32(buf, 16),
            body: buf[HEADER_LEN..HEADER_LEN + body_len].to_vec(),
        };
        Ok(Some((frame, consumed)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Descriptions
// ────────────────────────────────────────────────────────────────────────────

/// Bind local id `id` to `name`.  `kind` is [`SENDER_DESCRIPTION`] or
/// [`TYPE_DESCRIPTION`].
pub fn description_frame(kind: i32, id: i32, name: &str) -> Frame {
    let len = name.len() + 1;
    let mut body = Vec::with_capacity(4 + len);
    body.extend_from_slice(&(len as i32).to_be_bytes());
    body.extend_from_slice(name.as_bytes());
    body.push(0);
    Frame::new(id, kind, body)
}

/// Extract the name carried by a description body.
pub fn decode_description(body: &[u8]) -> Result<String, TrackableError> {
    if body.len() < 4 {
        return Err(protocol("truncated description"));
    }
    let len = read_i32(body, 0);
    if len <= 0 || body.len() < 4 + len as usize {
        return Err(protocol(format!("description length {len} out of range")));
    }
    let raw = &body[4..4 + len as usize];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec())
        .map_err(|_| protocol("description name is not valid UTF-8"))
}

// ────────────────────────────────────────────────────────────────────────────
// Payloads
// ────────────────────────────────────────────────────────────────────────────

/// `vrpn_Analog Channel` body: channel count then one value per channel,
/// all as `f64`.
pub fn encode_analog(channels: &[f64]) -> Vec<u8> {
    let mut body = Vec::with_capacity(8 * (channels.len() + 1));
    body.extend_from_slice(&(channels.len() as f64).to_be_bytes());
    for value in channels {
        body.extend_from_slice(&value.to_be_bytes());
    }
    body
}

pub fn decode_analog(body: &[u8]) -> Result<Vec<f64>, TrackableError> {
    if body.len() < 8 {
        return Err(protocol("truncated analog report"));
    }
    let count = read_f64(body, 0);
    if !(0.0..=MAX_ANALOG_CHANNELS as f64).contains(&count) || count.fract() != 0.0 {
        return Err(protocol(format!("invalid analog channel count {count}")));
    }
    let count = count as usize;
    if body.len() < 8 * (count + 1) {
        return Err(protocol(format!(
            "analog report announces {count} channels but carries {} bytes",
            body.len()
        )));
    }
    Ok((0..count).map(|i| read_f64(body, 8 * (i + 1))).collect())
}

/// `vrpn_Tracker Pos_Quat` body: sensor, 4 bytes of padding, position,
/// quaternion `[i, j, k, r]`.
pub fn encode_pos_quat(sensor: i32, position: [f64; 3], orientation: [f64; 4]) -> Vec<u8> {
    let mut body = Vec::with_capacity(POS_QUAT_BODY_LEN);
    body.extend_from_slice(&sensor.to_be_bytes());
    // VRPN pads by repeating the sensor id.
    body.extend_from_slice(&sensor.to_be_bytes());
    for value in position.iter().chain(orientation.iter()) {
        body.extend_from_slice(&value.to_be_bytes());
    }
    body
}

pub fn decode_pos_quat(body: &[u8]) -> Result<(i32, [f64; 3], [f64; 4]), TrackableError> {
    if body.len() < POS_QUAT_BODY_LEN {
        return Err(protocol(format!(
            "tracker report is {} bytes, expected {POS_QUAT_BODY_LEN}",
            body.len()
        )));
    }
    let sensor = read_i32(body, 0);
    let position = [read_f64(body, 8), read_f64(body, 16), read_f64(body, 24)];
    let orientation = [
        read_f64(body, 32),
        read_f64(body, 40),
        read_f64(body, 48),
        read_f64(body, 56),
    ];
    Ok((sensor, position, orientation))
}

// Callers check bounds before reading.

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    u32::from_be_bytes(b)
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[at..at + 4]);
    i32::from_be_bytes(b)
}

fn read_f64(buf: &[u8], at: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    f64::from_be_bytes(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_is_nul_padded_to_24_bytes() {
        let cookie = encode_cookie();
        assert_eq!(cookie.len(), COOKIE_LEN);
        assert_eq!(&cookie[..COOKIE.len()], COOKIE);
        assert!(cookie[COOKIE.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn check_cookie_accepts_other_minor_versions() {
        assert!(check_cookie(&cookie_from(b"vrpn: ver. 07.30  0")).is_ok());
        assert!(check_cookie(&encode_cookie()).is_ok());
    }

    #[test]
    fn check_cookie_rejects_other_major_version() {
        let err = check_cookie(&cookie_from(b"vrpn: ver. 06.04  0")).unwrap_err();
        assert!(matches!(err, TrackableError::Protocol(msg) if msg.contains("06.04")));
    }

    #[test]
    fn frame_length_counts_unpadded_body() {
        let frame = Frame::new(3, 7, vec![1, 2, 3]);
        let bytes = frame.encode();
        assert_eq!(bytes.len(), HEADER_LEN + 8);
        assert_eq!(read_u32(&bytes, 0) as usize, HEADER_LEN + 3);
        assert_eq!(read_i32(&bytes, 12), 3);
        assert_eq!(read_i32(&bytes, 16), 7);
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let bytes = Frame::new(0, 1, vec![9; 10]).encode();
        assert!(Frame::decode(&bytes[..HEADER_LEN - 1]).unwrap().is_none());
        assert!(Frame::decode(&bytes[..bytes.len() - 1]).unwrap().is_none());

        let (frame, used) = Frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.body, vec![9; 10]);
    }

    #[test]
    fn decode_handles_back_to_back_frames() {
        let mut bytes = Frame::new(0, 1, vec![1]).encode();
        bytes.extend(Frame::new(0, 2, vec![2, 2]).encode());

        let (first, used) = Frame::decode(&bytes).unwrap().unwrap();
        let (second, _) = Frame::decode(&bytes[used..]).unwrap().unwrap();
        assert_eq!(first.msg_type, 1);
        assert_eq!(second.msg_type, 2);
        assert_eq!(second.body, vec![2, 2]);
    }

    #[test]
    fn decode_rejects_oversized_body() {
        let mut bytes = Frame::new(0, 1, Vec::new()).encode();
        let huge = (HEADER_LEN + MAX_BODY_LEN + 1) as u32;
        bytes[..4].copy_from_slice(&huge.to_be_bytes());
        assert!(matches!(Frame::decode(&bytes), Err(TrackableError::Protocol(_))));
    }

    #[test]
    fn decode_rejects_length_below_header() {
        let mut bytes = Frame::new(0, 1, Vec::new()).encode();
        bytes[..4].copy_from_slice(&8u32.to_be_bytes());
        assert!(Frame::decode(&bytes).is_err());
    }

    #[test]
    fn description_carries_length_prefixed_name() {
        let frame = description_frame(SENDER_DESCRIPTION, 4, "BrushBot");
        assert_eq!(frame.sender, 4);
        assert_eq!(frame.msg_type, SENDER_DESCRIPTION);
        assert_eq!(read_i32(&frame.body, 0), 9);
        assert_eq!(decode_description(&frame.body).unwrap(), "BrushBot");
    }

    #[test]
    fn decode_analog_reads_big_endian_doubles() {
        let mut body = Vec::new();
        body.extend_from_slice(&3.0f64.to_be_bytes());
        body.extend_from_slice(&1.0f64.to_be_bytes());
        body.extend_from_slice(&2.0f64.to_be_bytes());
        body.extend_from_slice(&3.0f64.to_be_bytes());
        assert_eq!(decode_analog(&body).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn decode_analog_rejects_short_body() {
        let mut body = encode_analog(&[1.0, 2.0]);
        body.truncate(16);
        assert!(decode_analog(&body).is_err());
    }

    #[test]
    fn decode_analog_rejects_absurd_channel_count() {
        let body = encode_analog(&[]);
        let mut bad = body.clone();
        bad[..8].copy_from_slice(&1e9f64.to_be_bytes());
        assert!(decode_analog(&bad).is_err());
        assert_eq!(decode_analog(&body).unwrap(), Vec::<f64>::new());
    }

    #[test]
    fn pos_quat_layout_pads_sensor_to_eight_bytes() {
        let body = encode_pos_quat(2, [0.1, 0.2, 0.3], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(body.len(), POS_QUAT_BODY_LEN);
        assert!((read_f64(&body, 8) - 0.1).abs() < f64::EPSILON);
        assert!((read_f64(&body, 56) - 1.0).abs() < f64::EPSILON);

        let (sensor, pos, quat) = decode_pos_quat(&body).unwrap();
        assert_eq!(sensor, 2);
        assert_eq!(pos, [0.1, 0.2, 0.3]);
        assert_eq!(quat, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn decode_pos_quat_rejects_truncated_body() {
        assert!(decode_pos_quat(&[0u8; 32]).is_err());
    }
}
