//! Control-channel frames exchanged between tracker nodes and the broker
//!
//! Every frame on the wire is a [`Frame`] carrying exactly one body.

use prost::{Enumeration, Message};

/// Delivery guarantee requested for a subscription or publication
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum Qos {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// First frame sent by a client after the TCP connection is open
#[derive(Clone, PartialEq, Message)]
pub struct Connect {
    #[prost(string, tag = "1")]
    pub client_id: String,
}

/// Broker answer to [`Connect`]
#[derive(Clone, PartialEq, Message)]
pub struct ConnAck {
    #[prost(bool, tag = "1")]
    pub accepted: bool,

    #[prost(string, tag = "2")]
    pub reason: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Subscribe {
    #[prost(string, tag = "1")]
    pub topic: String,

    #[prost(enumeration = "Qos", tag = "2")]
    pub qos: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct SubAck {
    #[prost(string, tag = "1")]
    pub topic: String,

    #[prost(bool, tag = "2")]
    pub accepted: bool,
}

/// A message published on a topic, in either direction
#[derive(Clone, PartialEq, Message)]
pub struct Publish {
    #[prost(string, tag = "1")]
    pub topic: String,

    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,

    #[prost(enumeration = "Qos", tag = "3")]
    pub qos: i32,

    #[prost(bool, tag = "4")]
    pub retain: bool,
}

/// Keep-alive probe
#[derive(Clone, PartialEq, Message)]
pub struct Ping {
    #[prost(uint64, tag = "1")]
    pub timestamp_ms: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Pong {
    #[prost(uint64, tag = "1")]
    pub timestamp_ms: u64,
}

/// Top-level wire frame
#[derive(Clone, PartialEq, Message)]
pub struct Frame {
    #[prost(oneof = "frame::Body", tags = "1, 2, 3, 4, 5, 6, 7")]
    pub body: Option<frame::Body>,
}

pub mod frame {
    use prost::Oneof;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Body {
        #[prost(message, tag = "1")]
        Connect(super::Connect),
        #[prost(message, tag = "2")]
        ConnAck(super::ConnAck),
        #[prost(message, tag = "3")]
        Subscribe(super::Subscribe),
        #[prost(message, tag = "4")]
        SubAck(super::SubAck),
        #[prost(message, tag = "5")]
        Publish(super::Publish),
        #[prost(message, tag = "6")]
        Ping(super::Ping),
        #[prost(message, tag = "7")]
        Pong(super::Pong),
    }
}

