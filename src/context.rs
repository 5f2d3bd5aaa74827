//! Shared application context
//!
//! One `AppContext` is created at startup and handed to every component that
//! reads or writes process-wide state. The status and network flags are
//! advisory: several activities write them without mutual exclusion and the
//! last writer wins. Nothing correctness-critical is decided from them.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;
use tracker_shared::AppStatus;

pub struct AppContext {
    device_id: String,
    status: AtomicU8,
    network_up: AtomicBool,
    signal_valid: AtomicBool,
    exit: CancellationToken,
}

impl AppContext {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            status: AtomicU8::new(AppStatus::Manual.as_u8()),
            network_up: AtomicBool::new(false),
            signal_valid: AtomicBool::new(false),
            exit: CancellationToken::new(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Topic scoped to this device: `/<deviceId>/<name>`
    pub fn topic(&self, name: &str) -> String {
        format!("/{}/{}", self.device_id, name)
    }

    pub fn status(&self) -> AppStatus {
        AppStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn set_status(&self, status: AppStatus) {
        self.status.store(status.as_u8(), Ordering::Relaxed);
    }

    /// Set `status` and return the value it replaced
    pub fn swap_status(&self, status: AppStatus) -> AppStatus {
        AppStatus::from_u8(self.status.swap(status.as_u8(), Ordering::Relaxed))
    }

    pub fn is_network_up(&self) -> bool {
        self.network_up.load(Ordering::Relaxed)
    }

    pub fn set_network_up(&self, up: bool) {
        self.network_up.store(up, Ordering::Relaxed);
    }

    pub fn set_signal_valid(&self, valid: bool) {
        self.signal_valid.store(valid, Ordering::Relaxed);
    }

    /// Registered on a network that the modem can also hear
    pub fn network_available(&self) -> bool {
        self.network_up.load(Ordering::Relaxed) && self.signal_valid.load(Ordering::Relaxed)
    }

    /// Token cancelled when the whole application is shutting down
    pub fn exit_token(&self) -> &CancellationToken {
        &self.exit
    }

    pub fn request_exit(&self) {
        self.exit.cancel();
    }

    pub fn is_exiting(&self) -> bool {
        self.exit.is_cancelled()
    }
}
