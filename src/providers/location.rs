//! GNSS location capability and the published location record

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

/// One position fix, in the receiver's integer units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fix {
    pub latitude_x1e7: i32,
    pub longitude_x1e7: i32,
    pub altitude_mm: i32,
    pub radius_mm: i32,
    pub speed_mm_per_s: i32,
    /// Seconds since the Unix epoch
    pub time_utc: i64,
}

impl Fix {
    pub fn latitude(&self) -> f64 {
        f64::from(self.latitude_x1e7) / 1e7
    }

    pub fn longitude(&self) -> f64 {
        f64::from(self.longitude_x1e7) / 1e7
    }

    /// Location record published on `/<deviceId>/Location`
    pub fn to_json(&self, timestamp: &str) -> String {
        let time = DateTime::<Utc>::from_timestamp(self.time_utc, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();

        json!({
            "Timestamp": timestamp,
            "Location": {
                "Altitude": self.altitude_mm,
                "Latitude": self.latitude(),
                "Longitude": self.longitude(),
                "Accuracy": self.radius_mm,
                "Speed": self.speed_mm_per_s,
                "Time": time,
            }
        })
        .to_string()
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Acquire a fix, polling `keep_going` while waiting
    ///
    /// `Ok(None)` when `keep_going` turned false before a fix was found.
    async fn acquire_fix(&self, keep_going: &(dyn Fn() -> bool + Send + Sync))
        -> Result<Option<Fix>>;
}

/// Simulated receiver that drifts slowly around a start position
pub struct SimulatedGnss {
    latitude_x1e7: i32,
    longitude_x1e7: i32,
    time_to_fix: Duration,
    poll: Duration,
    drift: AtomicI32,
}

impl SimulatedGnss {
    pub fn new(latitude: f64, longitude: f64, time_to_fix: Duration) -> Self {
        Self {
            latitude_x1e7: (latitude * 1e7) as i32,
            longitude_x1e7: (longitude * 1e7) as i32,
            time_to_fix,
            poll: Duration::from_millis(100),
            drift: AtomicI32::new(0),
        }
    }
}

#[async_trait]
impl LocationProvider for SimulatedGnss {
    async fn acquire_fix(
        &self,
        keep_going: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<Option<Fix>> {
        let deadline = tokio::time::Instant::now() + self.time_to_fix;

        while tokio::time::Instant::now() < deadline {
            if !keep_going() {
                return Ok(None);
            }
            tokio::time::sleep(self.poll).await;
        }

        let drift = self.drift.fetch_add(37, Ordering::Relaxed);
        Ok(Some(Fix {
            latitude_x1e7: self.latitude_x1e7 + drift,
            longitude_x1e7: self.longitude_x1e7 - drift,
            altitude_mm: 61_000,
            radius_mm: 4_500,
            speed_mm_per_s: 0,
            time_utc: Utc::now().timestamp(),
        }))
    }
}
