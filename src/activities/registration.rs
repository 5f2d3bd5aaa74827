//! Network registration activity

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use tracker_shared::{AppStatus, FrameworkError, FrameworkResult};

use crate::context::AppContext;
use crate::providers::{NetworkProvider, RegistrationState};
use crate::tasks::{dwell, Activity, ActivityScope, DwellOutcome, InitContext};

/// Keeps the modem registered and publishes the network flags
///
/// Keeps running after the application exit is raised so the activities
/// that still publish have a network. Only its own stop ends the loop.
pub struct RegistrationActivity {
    ctx: Arc<AppContext>,
    network: Arc<dyn NetworkProvider>,
}

impl RegistrationActivity {
    pub fn new(ctx: Arc<AppContext>, network: Arc<dyn NetworkProvider>) -> Self {
        Self { ctx, network }
    }

    async fn refresh(&self) {
        let was_up = self.ctx.is_network_up();
        if !was_up {
            self.ctx.set_status(AppStatus::Registering);
        }

        let state = match self.network.register().await {
            Ok(state) => state,
            Err(e) => {
                warn!("[Registration] register failed: {}", e);
                RegistrationState::Unknown
            }
        };

        let up = state == RegistrationState::Registered;
        self.ctx.set_network_up(up);

        match state {
            RegistrationState::Registered if !was_up => {
                info!("[Registration] registered");
                self.ctx.set_status(AppStatus::Registered);
            }
            RegistrationState::Registered => {}
            RegistrationState::Searching => debug!("[Registration] still searching"),
            RegistrationState::Denied => {
                warn!("[Registration] registration denied");
                self.ctx.set_status(AppStatus::RegistrationDenied);
            }
            RegistrationState::Unknown => {
                self.ctx.set_status(AppStatus::RegistrationUnknown);
            }
        }

        match self.network.signal_quality().await {
            Ok(quality) => {
                debug!("[Registration] rsrp {} rsrq {}", quality.rsrp, quality.rsrq);
                self.ctx.set_signal_valid(up && quality.is_valid());
            }
            Err(e) => {
                warn!("[Registration] signal query failed: {}", e);
                self.ctx.set_signal_valid(false);
            }
        }
    }
}

#[async_trait]
impl Activity for RegistrationActivity {
    async fn init(&self, ctx: &InitContext) -> FrameworkResult {
        self.network
            .power_on()
            .await
            .map_err(|e| FrameworkError::fatal(format!("{}: modem power on failed: {}", ctx.name(), e)))
    }

    async fn run(&self, scope: &mut ActivityScope) {
        loop {
            if self.ctx.status() == AppStatus::CopsQuery {
                debug!("[Registration] operator scan in progress, skipping");
            } else {
                self.refresh().await;
            }

            let stop = scope.stop_token().clone();
            if dwell(&scope.dwell, || !stop.is_cancelled()).await == DwellOutcome::Interrupted {
                break;
            }
        }

        self.ctx.set_network_up(false);
        self.ctx.set_signal_valid(false);
        if let Err(e) = self.network.deregister().await {
            warn!("[Registration] deregister failed: {}", e);
        }
    }
}
