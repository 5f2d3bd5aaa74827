//! Device capabilities consumed by the activities
//!
//! Each capability is a trait; the simulated implementations here stand in
//! for the modem, GNSS receiver, sensor board and LEDs.

pub mod indicator;
pub mod location;
pub mod network;
pub mod sensors;

pub use indicator::{pattern_for, LedMode, LedPattern, LogIndicator, StatusIndicator};
pub use location::{Fix, LocationProvider, SimulatedGnss};
pub use network::{NetworkProvider, RegistrationState, SignalQuality, SimulatedNetwork};
pub use sensors::{SensorProvider, SensorReadings, SimulatedSensors};
