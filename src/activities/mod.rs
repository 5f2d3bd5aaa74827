//! The node's activities
//!
//! This module handles:
//! - Network registration and the shared network flags
//! - The transport-owning MQTT activity
//! - Driving the status indicator from the application status
//! - Location fixes and sensor measurements, with their control topics
//!
//! [`node_table`] builds the descriptor table the lifecycle manager runs.

mod led;
mod location;
mod mqtt;
mod registration;
mod sensor;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracker_shared::FrameworkResult;

pub use led::LedActivity;
pub use location::LocationActivity;
pub use mqtt::MqttActivity;
pub use registration::RegistrationActivity;
pub use sensor::SensorActivity;

use crate::command::SubscriptionRegistrar;
use crate::connection::{ConnectionEvent, PublishDispatcher, Publisher};
use crate::context::AppContext;
use crate::providers::{
    LedPattern, LocationProvider, NetworkProvider, SensorProvider, StatusIndicator,
};
use crate::tasks::{ActivityDescriptor, ActivityId, ActivityScope};

const DEFAULT_DWELL: Duration = Duration::from_secs(30);

/// Device capabilities the activities drive
#[derive(Clone)]
pub struct Providers {
    pub network: Arc<dyn NetworkProvider>,
    pub location: Arc<dyn LocationProvider>,
    pub sensors: Arc<dyn SensorProvider>,
    pub indicator: Arc<dyn StatusIndicator>,
}

fn show_error(indicator: &Arc<dyn StatusIndicator>) -> impl Fn() + Send + Sync + 'static {
    let indicator = indicator.clone();
    move || indicator.set_pattern(LedPattern::RED)
}

/// Registration: stopped explicitly, after everything that needs the network
pub fn registration(
    ctx: Arc<AppContext>,
    network: Arc<dyn NetworkProvider>,
    indicator: &Arc<dyn StatusIndicator>,
) -> ActivityDescriptor {
    ActivityDescriptor::new(
        ActivityId::Registration,
        true,
        Arc::new(RegistrationActivity::new(ctx, network)),
    )
    .dwell(DEFAULT_DWELL)
    .mailbox_capacity(5)
    .on_stopped(show_error(indicator))
}

pub fn mqtt(
    ctx: Arc<AppContext>,
    dispatcher: Arc<PublishDispatcher>,
    registrar: Arc<SubscriptionRegistrar>,
    events: mpsc::Receiver<ConnectionEvent>,
) -> ActivityDescriptor {
    ActivityDescriptor::new(
        ActivityId::Mqtt,
        false,
        Arc::new(MqttActivity::new(ctx, dispatcher, registrar, events)),
    )
    .dwell(DEFAULT_DWELL)
    .mailbox_capacity(10)
}

/// LED: no dwell, the loop runs once per tick
pub fn led(ctx: Arc<AppContext>, indicator: &Arc<dyn StatusIndicator>) -> ActivityDescriptor {
    ActivityDescriptor::new(
        ActivityId::Led,
        false,
        Arc::new(LedActivity::new(ctx, indicator.clone())),
    )
    .mailbox_capacity(1)
    .on_stopped(show_error(indicator))
}

pub fn location(
    ctx: Arc<AppContext>,
    gnss: Arc<dyn LocationProvider>,
    dispatcher: Arc<PublishDispatcher>,
    registrar: Arc<SubscriptionRegistrar>,
) -> ActivityDescriptor {
    ActivityDescriptor::new(
        ActivityId::Location,
        false,
        Arc::new(LocationActivity::new(ctx, gnss, dispatcher, registrar)),
    )
    .dwell(DEFAULT_DWELL)
    .mailbox_capacity(5)
}

pub fn sensor(
    ctx: Arc<AppContext>,
    sensors: Arc<dyn SensorProvider>,
    dispatcher: Arc<PublishDispatcher>,
    registrar: Arc<SubscriptionRegistrar>,
) -> ActivityDescriptor {
    ActivityDescriptor::new(
        ActivityId::Sensor,
        false,
        Arc::new(SensorActivity::new(ctx, sensors, dispatcher, registrar)),
    )
    .dwell(DEFAULT_DWELL)
    .mailbox_capacity(1)
}

/// The full activity table, in init order
pub fn node_table(
    ctx: &Arc<AppContext>,
    providers: &Providers,
    dispatcher: &Arc<PublishDispatcher>,
    registrar: &Arc<SubscriptionRegistrar>,
    events: mpsc::Receiver<ConnectionEvent>,
) -> Vec<ActivityDescriptor> {
    vec![
        registration(ctx.clone(), providers.network.clone(), &providers.indicator),
        mqtt(ctx.clone(), dispatcher.clone(), registrar.clone(), events),
        led(ctx.clone(), &providers.indicator),
        location(
            ctx.clone(),
            providers.location.clone(),
            dispatcher.clone(),
            registrar.clone(),
        ),
        sensor(
            ctx.clone(),
            providers.sensors.clone(),
            dispatcher.clone(),
            registrar.clone(),
        ),
    ]
}

/// Publisher that queues into the MQTT activity's mailbox
fn publisher(scope: &ActivityScope, dispatcher: &Arc<PublishDispatcher>) -> FrameworkResult<Publisher> {
    let mailbox = scope.manager()?.mailbox(ActivityId::Mqtt)?;
    Ok(Publisher::new(dispatcher.clone(), mailbox))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{LogIndicator, SimulatedGnss, SimulatedNetwork, SimulatedSensors};

    #[tokio::test]
    async fn test_node_table_shape() {
        let node = testing::connected_node().await;
        let providers = Providers {
            network: Arc::new(SimulatedNetwork::new(1)),
            location: Arc::new(SimulatedGnss::new(52.0, 4.0, Duration::from_secs(1))),
            sensors: Arc::new(SimulatedSensors::new()),
            indicator: Arc::new(LogIndicator::new()),
        };
        let (_tx, rx) = mpsc::channel(1);

        let table = node_table(&node.ctx, &providers, &node.dispatcher, &node.registrar, rx);
        let rows: Vec<_> = table
            .iter()
            .map(|d| (d.name(), d.explicit_stop, d.mailbox_capacity, d.on_stopped.is_some()))
            .collect();

        assert_eq!(
            rows,
            vec![
                ("Registration", true, 5, true),
                ("MQTT", false, 10, false),
                ("LED", false, 1, true),
                ("Location", false, 5, false),
                ("Sensor", false, 1, false),
            ]
        );
        assert_eq!(table[2].dwell, None);
        assert_eq!(table[4].dwell, Some(DEFAULT_DWELL));
    }
}
