//! Tracker Shared Types
//!
//! This crate provides the wire frames, the frame codec and the framework
//! types shared by tracker nodes and the broker that carries their control
//! channel.

pub mod codec;
pub mod error;
pub mod lifecycle;
pub mod proto;
pub mod status;

use std::time::{SystemTime, UNIX_EPOCH};

pub use error::{FrameworkError, FrameworkResult};
pub use lifecycle::{LifecycleEvent, LifecycleState, TransitionResult};
pub use proto::*;
pub use status::AppStatus;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing and sizing limits of the framework
pub mod limits {
    /// Granularity of an activity's dwell sleep
    pub const DWELL_TICK_MS: u64 = 100;

    /// Granularity of the application loop's dwell sleep
    pub const APP_DWELL_TICK_MS: u64 = 50;

    /// Poll interval used while waiting for activities to stop
    pub const STOP_POLL_MS: u64 = 100;

    /// Delay between subscription attempts while the transport is not connected
    pub const SUBSCRIBE_RETRY_MS: u64 = 5000;

    /// Shortest application dwell accepted from a remote operator
    pub const APP_DWELL_MIN_MS: i32 = 5000;

    /// Longest application dwell accepted from a remote operator
    pub const APP_DWELL_MAX_MS: i32 = 60000;

    /// Application dwell used when the command carries no usable value
    pub const APP_DWELL_DEFAULT_MS: i32 = 30000;

    /// Bounds for an activity's dwell given with `START_TASK`, in seconds
    pub const TASK_DWELL_MIN_SECS: i32 = 5;
    pub const TASK_DWELL_MAX_SECS: i32 = 60;
    pub const TASK_DWELL_DEFAULT_SECS: i32 = 30;

    /// Longest accepted topic name
    pub const MAX_TOPIC_LEN: usize = 100;

    /// Largest publication payload, matching the modem buffer
    pub const MAX_PAYLOAD_LEN: usize = 12 * 1024;
}

impl Qos {
    /// Decode a wire value, falling back to at-most-once for unknown values
    pub fn from_wire(value: i32) -> Self {
        Qos::try_from(value).unwrap_or(Qos::AtMostOnce)
    }
}

/// Builder helpers for frames
impl Frame {
    pub fn connect(client_id: impl Into<String>) -> Self {
        Self::with(frame::Body::Connect(Connect {
            client_id: client_id.into(),
        }))
    }

    pub fn conn_ack(accepted: bool, reason: impl Into<String>) -> Self {
        Self::with(frame::Body::ConnAck(ConnAck {
            accepted,
            reason: reason.into(),
        }))
    }

    pub fn subscribe(topic: impl Into<String>, qos: Qos) -> Self {
        Self::with(frame::Body::Subscribe(Subscribe {
            topic: topic.into(),
            qos: qos.into(),
        }))
    }

    pub fn sub_ack(topic: impl Into<String>, accepted: bool) -> Self {
        Self::with(frame::Body::SubAck(SubAck {
            topic: topic.into(),
            accepted,
        }))
    }

    pub fn publish(
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        qos: Qos,
        retain: bool,
    ) -> Self {
        Self::with(frame::Body::Publish(Publish {
            topic: topic.into(),
            payload: payload.into(),
            qos: qos.into(),
            retain,
        }))
    }

    pub fn ping() -> Self {
        Self::with(frame::Body::Ping(Ping {
            timestamp_ms: now_ms(),
        }))
    }

    pub fn pong(timestamp_ms: u64) -> Self {
        Self::with(frame::Body::Pong(Pong { timestamp_ms }))
    }

    fn with(body: frame::Body) -> Self {
        Self { body: Some(body) }
    }
}

impl Publish {
    /// Payload as text, replacing invalid UTF-8 sequences
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_frame_creation() {
        let frame = Frame::publish("/dev-1/Sensor", "{}", Qos::AtLeastOnce, true);
        match frame.body {
            Some(frame::Body::Publish(p)) => {
                assert_eq!(p.topic, "/dev-1/Sensor");
                assert_eq!(p.payload_text(), "{}");
                assert_eq!(Qos::from_wire(p.qos), Qos::AtLeastOnce);
                assert!(p.retain);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_qos_from_unknown_wire_value() {
        assert_eq!(Qos::from_wire(42), Qos::AtMostOnce);
        assert_eq!(Qos::from_wire(2), Qos::ExactlyOnce);
    }

    #[test]
    fn test_ping_has_timestamp() {
        match Frame::ping().body {
            Some(frame::Body::Ping(p)) => assert!(p.timestamp_ms > 0),
            other => panic!("unexpected body: {:?}", other),
        }
    }
}
