//! Location activity
//!
//! Acquires a fix every dwell and publishes it on `/<deviceId>/Location`.
//! `LocationControl` carries `LOCATION_NOW`, `START_TASK [secs]` and
//! `STOP_TASK`. A fix in progress is abandoned on `StopAcquisition`, on a
//! stop request or at application exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use tracker_shared::{AppStatus, FrameworkResult, Qos};

use super::publisher;
use crate::command::handlers::{apply_start_dwell, start_task, stop_task, trigger};
use crate::command::SubscriptionRegistrar;
use crate::connection::{OutboundPublication, PublishDispatcher, Publisher};
use crate::context::AppContext;
use crate::providers::{Fix, LocationProvider};
use crate::tasks::{
    dwell, Activity, ActivityId, ActivityScope, DwellInterval, DwellOutcome, InitContext, Message,
};

pub const CONTROL_TOPIC: &str = "LocationControl";

pub struct LocationActivity {
    ctx: Arc<AppContext>,
    gnss: Arc<dyn LocationProvider>,
    dispatcher: Arc<PublishDispatcher>,
    registrar: Arc<SubscriptionRegistrar>,
}

/// What the mailbox asked for while the activity was busy or dwelling
#[derive(Default)]
struct Requests {
    fix_now: bool,
    shutdown: bool,
}

impl LocationActivity {
    pub fn new(
        ctx: Arc<AppContext>,
        gnss: Arc<dyn LocationProvider>,
        dispatcher: Arc<PublishDispatcher>,
        registrar: Arc<SubscriptionRegistrar>,
    ) -> Self {
        Self {
            ctx,
            gnss,
            dispatcher,
            registrar,
        }
    }

    /// Acquire one fix while still listening to the mailbox
    async fn acquire(&self, scope: &mut ActivityScope, requests: &mut Requests) -> Option<Fix> {
        let abort = AtomicBool::new(false);
        let running = scope.running_check();
        let keep_going = || running() && !abort.load(Ordering::SeqCst);

        let previous = self.ctx.swap_status(AppStatus::LocationMeasurement);
        let mut listening = true;
        let mut acquisition = self.gnss.acquire_fix(&keep_going);

        let result = loop {
            tokio::select! {
                result = &mut acquisition => break result,
                message = scope.mailbox.receive(), if listening => match message {
                    Some(Message::StopAcquisition) => {
                        info!("[Location] abandoning fix");
                        abort.store(true, Ordering::SeqCst);
                    }
                    Some(Message::LocationNow) => debug!("[Location] fix already in progress"),
                    Some(Message::Shutdown) | None => {
                        abort.store(true, Ordering::SeqCst);
                        requests.shutdown = true;
                        listening = false;
                    }
                    Some(other) => debug!("[Location] ignoring {} message", other.kind()),
                },
            }
        };

        if self.ctx.status() == AppStatus::LocationMeasurement {
            self.ctx.set_status(previous);
        }

        match result {
            Ok(Some(fix)) => Some(fix),
            Ok(None) => {
                debug!("[Location] no fix");
                None
            }
            Err(e) => {
                warn!("[Location] acquisition failed: {}", e);
                None
            }
        }
    }

    fn publish(&self, publisher: &Publisher, fix: &Fix) {
        if !publisher.is_ready() {
            debug!("[Location] transport not ready, fix not sent");
            return;
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let publication = OutboundPublication::new(
            self.ctx.topic("Location"),
            fix.to_json(&timestamp),
            Qos::AtMostOnce,
            false,
        );
        if let Err(e) = publisher.publish(publication) {
            warn!("[Location] publish failed: {}", e);
        }
    }
}

#[async_trait]
impl Activity for LocationActivity {
    async fn init(&self, ctx: &InitContext) -> FrameworkResult {
        let manager = ctx.manager();
        self.registrar.subscribe_async(
            CONTROL_TOPIC,
            Qos::AtMostOnce,
            vec![
                trigger("LOCATION_NOW", manager.clone(), ActivityId::Location, || {
                    Message::LocationNow
                }),
                start_task(manager.clone(), ActivityId::Location),
                stop_task(manager, ActivityId::Location),
            ],
        );
        Ok(())
    }

    fn start(&self, params: &[String], dwell: &DwellInterval) -> FrameworkResult {
        apply_start_dwell(params, dwell)
    }

    async fn run(&self, scope: &mut ActivityScope) {
        let publisher = match publisher(scope, &self.dispatcher) {
            Ok(publisher) => publisher,
            Err(e) => {
                error!("[Location] no transport: {}", e);
                return;
            }
        };

        let mut requests = Requests {
            fix_now: true,
            shutdown: false,
        };

        loop {
            if requests.fix_now {
                if let Some(fix) = self.acquire(scope, &mut requests).await {
                    info!("[Location] fix {:.5}, {:.5}", fix.latitude(), fix.longitude());
                    self.publish(&publisher, &fix);
                }
            }
            if requests.shutdown || !scope.is_running() {
                break;
            }

            let outcome = dwell(&scope.dwell, || {
                scope.is_running() && !scope.mailbox.has_pending()
            })
            .await;
            if !scope.is_running() {
                break;
            }

            requests.fix_now = outcome == DwellOutcome::Elapsed;
            for message in scope.mailbox.drain() {
                match message {
                    Message::LocationNow => requests.fix_now = true,
                    Message::StopAcquisition => debug!("[Location] no fix in progress"),
                    Message::Shutdown => requests.shutdown = true,
                    other => debug!("[Location] ignoring {} message", other.kind()),
                }
            }
            if requests.shutdown {
                break;
            }
        }
    }
}
