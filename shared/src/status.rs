//! Coarse, process-wide application status
//!
//! Drives the status indicator and gates optional work (no registration
//! attempt while a network scan is running, for instance).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum AppStatus {
    #[default]
    Manual = 0,
    InitDevice = 1,
    InitDeviceDone = 2,
    Registering = 3,
    RegistrationUnknown = 4,
    Registered = 5,
    RegistrationDenied = 6,
    MqttConnecting = 7,
    MqttConnected = 8,
    MqttDisconnected = 9,
    CopsQuery = 10,
    SendingTelemetry = 11,
    LocationMeasurement = 12,
    Error = 13,
    Shutdown = 14,
}

impl AppStatus {
    pub const ALL: [AppStatus; 15] = [
        AppStatus::Manual,
        AppStatus::InitDevice,
        AppStatus::InitDeviceDone,
        AppStatus::Registering,
        AppStatus::RegistrationUnknown,
        AppStatus::Registered,
        AppStatus::RegistrationDenied,
        AppStatus::MqttConnecting,
        AppStatus::MqttConnected,
        AppStatus::MqttDisconnected,
        AppStatus::CopsQuery,
        AppStatus::SendingTelemetry,
        AppStatus::LocationMeasurement,
        AppStatus::Error,
        AppStatus::Shutdown,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a stored value; unknown values read as `Error`
    pub fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(value as usize)
            .copied()
            .unwrap_or(AppStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::Manual => "MANUAL",
            AppStatus::InitDevice => "INIT_DEVICE",
            AppStatus::InitDeviceDone => "INIT_DEVICE_DONE",
            AppStatus::Registering => "REGISTERING",
            AppStatus::RegistrationUnknown => "REGISTRATION_UNKNOWN",
            AppStatus::Registered => "REGISTERED",
            AppStatus::RegistrationDenied => "REGISTRATION_DENIED",
            AppStatus::MqttConnecting => "MQTT_CONNECTING",
            AppStatus::MqttConnected => "MQTT_CONNECTED",
            AppStatus::MqttDisconnected => "MQTT_DISCONNECTED",
            AppStatus::CopsQuery => "COPS_QUERY",
            AppStatus::SendingTelemetry => "SENDING_TELEMETRY",
            AppStatus::LocationMeasurement => "LOCATION_MEAS",
            AppStatus::Error => "ERROR",
            AppStatus::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_encoding_matches_table_order() {
        for status in AppStatus::ALL {
            assert_eq!(AppStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn test_unknown_value_reads_as_error() {
        assert_eq!(AppStatus::from_u8(200), AppStatus::Error);
    }
}
