//! Session management for connected tracker nodes
//!
//! This module handles:
//! - Tracking connected client sessions by client id
//! - The exact-match subscription table
//! - Fanning publications out to subscribers
//! - Retaining the last retained publication per topic

mod connection;
mod manager;

pub use connection::{ClientSession, SessionHandle};
pub use manager::SessionManager;
