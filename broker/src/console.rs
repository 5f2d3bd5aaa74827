//! Operator console
//!
//! Each stdin line `<topic> <payload...>` is published to the topic as the
//! operator, e.g. `/351234/SensorControl START_TASK 10`.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracker_shared::{Publish, Qos};

use crate::session::SessionManager;

const HELP: &str =
    "usage: <topic> <payload...> (e.g. /351234/AppControl SET_DWELL_TIME 10000) or 'clients'";

/// What one console line asks for
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleLine {
    Publish { topic: String, payload: String },
    /// List connected clients
    Clients,
    Help,
    Empty,
}

pub fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleLine::Empty;
    }
    if line.eq_ignore_ascii_case("help") {
        return ConsoleLine::Help;
    }
    if line.eq_ignore_ascii_case("clients") {
        return ConsoleLine::Clients;
    }

    match line.split_once(char::is_whitespace) {
        Some((topic, payload)) => ConsoleLine::Publish {
            topic: topic.to_string(),
            payload: payload.trim_start().to_string(),
        },
        None => ConsoleLine::Publish {
            topic: line.to_string(),
            payload: String::new(),
        },
    }
}

/// Publish an operator line; returns the number of subscribers reached
pub async fn publish_line(sessions: &SessionManager, topic: String, payload: String) -> usize {
    let publish = Publish {
        topic,
        payload: payload.into_bytes(),
        qos: Qos::AtMostOnce.into(),
        retain: false,
    };
    let delivered = sessions.publish(&publish).await;
    info!(
        "operator -> {} '{}' reached {} subscriber(s)",
        publish.topic,
        publish.payload_text(),
        delivered
    );
    delivered
}

/// Read operator lines from stdin until it closes
pub async fn run(sessions: Arc<SessionManager>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                ConsoleLine::Publish { topic, payload } => {
                    publish_line(&sessions, topic, payload).await;
                }
                ConsoleLine::Clients => {
                    info!("connected: {:?}", sessions.connected_clients().await)
                }
                ConsoleLine::Help => info!("{}", HELP),
                ConsoleLine::Empty => {}
            },
            Ok(None) => {
                info!("operator console closed");
                break;
            }
            Err(e) => {
                warn!("operator console read failed: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_line() {
        assert_eq!(
            parse_line("/351234/SensorControl  START_TASK 10\n"),
            ConsoleLine::Publish {
                topic: "/351234/SensorControl".into(),
                payload: "START_TASK 10".into(),
            }
        );
    }

    #[test]
    fn test_parse_help_and_blank() {
        assert_eq!(parse_line("   "), ConsoleLine::Empty);
        assert_eq!(parse_line("HELP"), ConsoleLine::Help);
        assert_eq!(parse_line("clients"), ConsoleLine::Clients);
    }

    #[test]
    fn test_topic_without_payload() {
        assert_eq!(
            parse_line("/dev-1/AppControl"),
            ConsoleLine::Publish {
                topic: "/dev-1/AppControl".into(),
                payload: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let sessions = SessionManager::new();
        assert_eq!(
            publish_line(&sessions, "/dev-1/AppControl".into(), "SET_LOG_LEVEL 1".into()).await,
            0
        );
    }
}
