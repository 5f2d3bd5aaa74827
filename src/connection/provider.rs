//! Connectivity provider interface consumed by the publish dispatcher

use async_trait::async_trait;
use tracker_shared::{limits, FrameworkError, FrameworkResult, Qos};

/// A publication on its way to the transport
///
/// Never retried internally: it is either handed to the transport or the
/// rejection is returned to whoever asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPublication {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
    pub retain: bool,
}

impl OutboundPublication {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<String>,
        qos: Qos,
        retain: bool,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }

    /// Check topic and payload sizes against the transport limits
    pub fn validate(&self) -> FrameworkResult {
        if self.topic.is_empty() || self.topic.len() > limits::MAX_TOPIC_LEN {
            return Err(FrameworkError::validation(format!(
                "topic length {} is outside 1..={}",
                self.topic.len(),
                limits::MAX_TOPIC_LEN
            )));
        }
        if self.payload.len() > limits::MAX_PAYLOAD_LEN {
            return Err(FrameworkError::validation(format!(
                "payload of {} bytes exceeds {}",
                self.payload.len(),
                limits::MAX_PAYLOAD_LEN
            )));
        }
        Ok(())
    }
}

/// Events emitted by a connectivity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Session established and accepted by the broker
    Connected,
    /// Session lost
    Disconnected { reason: String },
    /// Publication received on a subscribed topic
    Message { topic: String, payload: String },
}

/// Publish/subscribe transport
///
/// Inbound messages and disconnects are delivered as [`ConnectionEvent`]s on
/// the channel returned when the provider is created.
#[async_trait]
pub trait ConnectivityProvider: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Begin connecting; the outcome arrives as an event
    async fn connect(&self) -> FrameworkResult;

    async fn publish(&self, publication: &OutboundPublication) -> FrameworkResult;

    /// Subscribe and wait for the broker to confirm
    async fn subscribe(&self, topic: &str, qos: Qos) -> FrameworkResult;

    async fn disconnect(&self);
}

#[cfg(test)]
pub mod fake {
    //! Recording provider for tests

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingProvider {
        pub connected: AtomicBool,
        pub fail_publish: AtomicBool,
        pub reject_subscribe: AtomicBool,
        pub connects: AtomicUsize,
        pub subscribe_attempts: AtomicUsize,
        pub disconnects: AtomicUsize,
        pub published: Mutex<Vec<OutboundPublication>>,
        pub subscribed: Mutex<Vec<String>>,
    }

    impl RecordingProvider {
        pub fn connected() -> Self {
            let provider = Self::default();
            provider.connected.store(true, Ordering::SeqCst);
            provider
        }

        pub fn published(&self) -> Vec<OutboundPublication> {
            self.published.lock().unwrap().clone()
        }

        pub fn subscribed(&self) -> Vec<String> {
            self.subscribed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ConnectivityProvider for RecordingProvider {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn connect(&self) -> FrameworkResult {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn publish(&self, publication: &OutboundPublication) -> FrameworkResult {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(FrameworkError::fatal("socket write failed"));
            }
            self.published.lock().unwrap().push(publication.clone());
            Ok(())
        }

        async fn subscribe(&self, topic: &str, _qos: Qos) -> FrameworkResult {
            self.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
            if !self.is_connected() {
                return Err(FrameworkError::transient("not connected"));
            }
            if self.reject_subscribe.load(Ordering::SeqCst) {
                return Err(FrameworkError::validation(format!("topic {} refused", topic)));
            }
            self.subscribed.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_limits() {
        let ok = OutboundPublication::new("/dev/Sensor", "{}", Qos::AtMostOnce, false);
        assert!(ok.validate().is_ok());

        let empty_topic = OutboundPublication::new("", "{}", Qos::AtMostOnce, false);
        assert!(empty_topic.validate().is_err());

        let long_topic = OutboundPublication::new(
            "/".repeat(limits::MAX_TOPIC_LEN + 1),
            "",
            Qos::AtMostOnce,
            false,
        );
        assert!(matches!(long_topic.validate(), Err(FrameworkError::Validation(_))));

        let big = OutboundPublication::new(
            "/dev/Sensor",
            "x".repeat(limits::MAX_PAYLOAD_LEN + 1),
            Qos::AtMostOnce,
            false,
        );
        assert!(big.validate().is_err());
    }
}
