//! Command dispatch for the control channel
//!
//! This module handles:
//! - Tokenizing command payloads and extracting parameters
//! - Routing (topic, command) pairs to bound handlers
//! - Subscribing control topics once the transport is available

pub mod handlers;
pub mod params;
mod registrar;
mod router;

pub use registrar::{SubscribeOutcome, SubscriptionRegistrar};
pub use router::{CommandBinding, CommandHandler, CommandRouter, TopicBinding};
