//! Activity orchestration
//!
//! This module handles:
//! - The activity table and lifecycle transitions
//! - Per-activity bounded mailboxes
//! - The interruptible dwell between work cycles

mod dwell;
mod mailbox;
mod manager;
mod registry;

pub use dwell::{dwell, dwell_with_tick, DwellInterval, DwellOutcome};
pub use mailbox::{mailbox, Mailbox, MailboxReceiver, Message};
pub use manager::LifecycleManager;
pub use registry::{
    Activity, ActivityDescriptor, ActivityId, ActivityScope, InitContext, OnStopped,
};
