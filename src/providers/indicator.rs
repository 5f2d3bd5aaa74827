//! Status indicator: three LEDs showing the application status

use std::fmt;
use std::sync::Mutex;

use tracing::info;
use tracker_shared::AppStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Off,
    On,
    Flash,
    Pulse,
    FastPulse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedPattern {
    pub red: LedMode,
    pub green: LedMode,
    pub blue: LedMode,
}

impl LedPattern {
    pub const fn new(red: LedMode, green: LedMode, blue: LedMode) -> Self {
        Self { red, green, blue }
    }

    /// Solid red: an activity the device depends on has stopped
    pub const RED: LedPattern = LedPattern::new(LedMode::On, LedMode::Off, LedMode::Off);
}

impl fmt::Display for LedPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R:{:?} G:{:?} B:{:?}", self.red, self.green, self.blue)
    }
}

/// LED pattern shown for each application status
pub fn pattern_for(status: AppStatus) -> LedPattern {
    use LedMode::*;

    match status {
        AppStatus::Manual => LedPattern::new(Off, Off, Off),
        AppStatus::InitDevice => LedPattern::new(FastPulse, Off, Off),
        AppStatus::InitDeviceDone => LedPattern::new(On, Off, Off),
        AppStatus::Registering => LedPattern::new(Off, Off, Pulse),
        AppStatus::RegistrationUnknown => LedPattern::new(Off, Off, Flash),
        AppStatus::Registered => LedPattern::new(Off, Off, On),
        AppStatus::RegistrationDenied => LedPattern::new(Pulse, Off, Pulse),
        AppStatus::MqttConnecting => LedPattern::new(Off, Pulse, Off),
        AppStatus::MqttConnected | AppStatus::MqttDisconnected => LedPattern::new(Off, Flash, Off),
        AppStatus::CopsQuery => LedPattern::new(Off, Pulse, On),
        AppStatus::SendingTelemetry => LedPattern::new(Flash, Flash, Off),
        AppStatus::LocationMeasurement => LedPattern::new(Flash, Flash, Flash),
        AppStatus::Error => LedPattern::RED,
        AppStatus::Shutdown => LedPattern::new(On, On, On),
    }
}

pub trait StatusIndicator: Send + Sync {
    fn set_pattern(&self, pattern: LedPattern);
}

/// Indicator that logs pattern changes instead of driving GPIOs
#[derive(Default)]
pub struct LogIndicator {
    current: Mutex<Option<LedPattern>>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<LedPattern> {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl StatusIndicator for LogIndicator {
    fn set_pattern(&self, pattern: LedPattern) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        if *current != Some(pattern) {
            info!("[LED] {}", pattern);
            *current = Some(pattern);
        }
    }
}
