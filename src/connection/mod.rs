//! Connection management for the control channel
//!
//! This module handles:
//! - The connectivity provider interface and its TCP implementation
//! - Automatic reconnection with exponential backoff
//! - Fast-fail publishing through the transport-owning activity

mod dispatcher;
mod manager;
mod provider;

pub use dispatcher::{ConnectionState, PublishDispatcher, Publisher};
pub use manager::{ConnectionConfig, TcpConnectivity};
pub use provider::{ConnectionEvent, ConnectivityProvider, OutboundPublication};

#[cfg(test)]
pub use provider::fake;
