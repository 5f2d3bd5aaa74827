//! Cellular network registration capability

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Registered,
    Searching,
    Denied,
    Unknown,
}

/// Received signal power and quality, in dB(m)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    pub rsrp: i32,
    pub rsrq: i32,
}

impl SignalQuality {
    /// The modem reports this floor when it cannot measure
    pub fn is_valid(&self) -> bool {
        self.rsrp > -140
    }
}

#[async_trait]
pub trait NetworkProvider: Send + Sync {
    /// Bring the modem up; failure means the node cannot run
    async fn power_on(&self) -> Result<()>;

    /// Attempt or refresh registration
    async fn register(&self) -> Result<RegistrationState>;

    async fn signal_quality(&self) -> Result<SignalQuality>;

    async fn deregister(&self) -> Result<()>;
}

/// Simulated modem that registers after a number of attempts
pub struct SimulatedNetwork {
    attempts_needed: u32,
    attempts: AtomicU32,
    powered: AtomicBool,
    fail_power_on: bool,
}

impl SimulatedNetwork {
    pub fn new(attempts_needed: u32) -> Self {
        Self {
            attempts_needed,
            attempts: AtomicU32::new(0),
            powered: AtomicBool::new(false),
            fail_power_on: false,
        }
    }

    /// A modem that never answers
    pub fn unresponsive() -> Self {
        Self {
            fail_power_on: true,
            ..Self::new(0)
        }
    }

    pub fn is_registered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
            && self.attempts.load(Ordering::SeqCst) >= self.attempts_needed
    }
}

#[async_trait]
impl NetworkProvider for SimulatedNetwork {
    async fn power_on(&self) -> Result<()> {
        if self.fail_power_on {
            bail!("modem did not respond to AT");
        }
        self.powered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn register(&self) -> Result<RegistrationState> {
        if !self.powered.load(Ordering::SeqCst) {
            bail!("modem is powered off");
        }

        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("registration attempt {}", attempt);
        if attempt >= self.attempts_needed {
            Ok(RegistrationState::Registered)
        } else {
            Ok(RegistrationState::Searching)
        }
    }

    async fn signal_quality(&self) -> Result<SignalQuality> {
        if !self.is_registered() {
            return Ok(SignalQuality { rsrp: -140, rsrq: -20 });
        }
        let attempt = self.attempts.load(Ordering::SeqCst) as i32;
        Ok(SignalQuality {
            rsrp: -95 - attempt % 7,
            rsrq: -10 - attempt % 3,
        })
    }

    async fn deregister(&self) -> Result<()> {
        self.attempts.store(0, Ordering::SeqCst);
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }
}
