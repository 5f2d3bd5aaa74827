//! Environmental sensor capability and the published sensor records

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReadings {
    /// Acceleration in g along x, y and z
    pub acceleration: [f64; 3],
    /// Degrees Celsius
    pub temperature: f64,
    /// Hectopascal
    pub pressure: f64,
    /// Percent relative humidity
    pub humidity: f64,
    pub lux: i32,
}

impl SensorReadings {
    /// The three records published on `/<deviceId>/Sensor`
    pub fn payloads(&self) -> [String; 3] {
        let [x, y, z] = self.acceleration;
        [
            json!({
                "Accelerometer": {
                    "X": format!("{:.2}", x),
                    "Y": format!("{:.2}", y),
                    "Z": format!("{:.2}", z),
                }
            })
            .to_string(),
            json!({
                "Temperature": {
                    "Temperature": format!("{:.2}", self.temperature),
                    "Pressure": format!("{:.2}", self.pressure),
                    "Humidity": format!("{:.2}", self.humidity),
                }
            })
            .to_string(),
            json!({ "Light": { "Lux": self.lux.to_string() } }).to_string(),
        ]
    }
}

#[async_trait]
pub trait SensorProvider: Send + Sync {
    async fn read_all(&self) -> Result<SensorReadings>;
}

/// Simulated sensor board with slowly varying readings
#[derive(Default)]
pub struct SimulatedSensors {
    samples: AtomicU32,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SensorProvider for SimulatedSensors {
    async fn read_all(&self) -> Result<SensorReadings> {
        let n = f64::from(self.samples.fetch_add(1, Ordering::Relaxed) % 10);
        Ok(SensorReadings {
            acceleration: [0.01 * n, -0.02, 0.98 + 0.001 * n],
            temperature: 21.5 + 0.1 * n,
            pressure: 1013.25 - 0.05 * n,
            humidity: 45.0 + 0.5 * n,
            lux: 300 + 10 * n as i32,
        })
    }
}
