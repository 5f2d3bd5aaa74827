//! Sensor activity: periodic environmental readings on `/<deviceId>/Sensor`

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};
use tracker_shared::{FrameworkResult, Qos};

use super::publisher;
use crate::command::handlers::{apply_start_dwell, start_task, stop_task, trigger};
use crate::command::SubscriptionRegistrar;
use crate::connection::{OutboundPublication, PublishDispatcher, Publisher};
use crate::context::AppContext;
use crate::providers::SensorProvider;
use crate::tasks::{
    dwell, Activity, ActivityId, ActivityScope, DwellInterval, DwellOutcome, InitContext, Message,
};

pub const CONTROL_TOPIC: &str = "SensorControl";

pub struct SensorActivity {
    ctx: Arc<AppContext>,
    sensors: Arc<dyn SensorProvider>,
    dispatcher: Arc<PublishDispatcher>,
    registrar: Arc<SubscriptionRegistrar>,
}

impl SensorActivity {
    pub fn new(
        ctx: Arc<AppContext>,
        sensors: Arc<dyn SensorProvider>,
        dispatcher: Arc<PublishDispatcher>,
        registrar: Arc<SubscriptionRegistrar>,
    ) -> Self {
        Self {
            ctx,
            sensors,
            dispatcher,
            registrar,
        }
    }

    async fn measure(&self, publisher: &Publisher) {
        if !publisher.is_ready() {
            debug!("[Sensor] transport not ready, skipping measurement");
            return;
        }

        let readings = match self.sensors.read_all().await {
            Ok(readings) => readings,
            Err(e) => {
                warn!("[Sensor] read failed: {}", e);
                return;
            }
        };

        let topic = self.ctx.topic("Sensor");
        for payload in readings.payloads() {
            let publication = OutboundPublication::new(topic.as_str(), payload, Qos::AtMostOnce, false);
            if let Err(e) = publisher.publish(publication) {
                warn!("[Sensor] publish failed: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl Activity for SensorActivity {
    async fn init(&self, ctx: &InitContext) -> FrameworkResult {
        let manager = ctx.manager();
        self.registrar.subscribe_async(
            CONTROL_TOPIC,
            Qos::AtMostOnce,
            vec![
                trigger("MEASURE_NOW", manager.clone(), ActivityId::Sensor, || {
                    Message::MeasureNow
                }),
                start_task(manager.clone(), ActivityId::Sensor),
                stop_task(manager, ActivityId::Sensor),
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
                error!("[Sensor] no transport: {}", e);
                return;
            }
        };

        let mut measure = true;
        loop {
            if measure {
                self.measure(&publisher).await;
            }

            let outcome = dwell(&scope.dwell, || {
                scope.is_running() && !scope.mailbox.has_pending()
            })
            .await;
            if !scope.is_running() {
                break;
            }

            measure = outcome == DwellOutcome::Elapsed;
            let mut shutdown = false;
            for message in scope.mailbox.drain() {
                match message {
                    Message::MeasureNow => measure = true,
                    Message::Shutdown => shutdown = true,
                    other => debug!("[Sensor] ignoring {} message", other.kind()),
                }
            }
            if shutdown {
                break;
            }
        }
    }
}
