//! Node bring-up, the application loop and shutdown

use std::time::Duration;

use tracing::{debug, info, warn};
use tracker_shared::{limits, AppStatus, FrameworkResult, Qos};

use crate::command::handlers::app_control_commands;
use crate::command::SubscriptionRegistrar;
use crate::context::AppContext;
use crate::logging::{self, LevelControl, LogLevel, LogSink};
use crate::providers::{pattern_for, StatusIndicator};
use crate::tasks::{dwell_with_tick, ActivityId, DwellInterval, LifecycleManager, Message};

/// Bring the activities up in dependency order
///
/// Any failure leaves the remaining activities unstarted and the status at
/// `Error`.
pub async fn startup(
    manager: &LifecycleManager,
    registrar: &SubscriptionRegistrar,
    app_dwell: &DwellInterval,
    levels: &LevelControl,
) -> FrameworkResult {
    let result = start_activities(manager, registrar, app_dwell, levels).await;
    if let Err(e) = &result {
        logging::record(LogLevel::Fatal, &format!("startup failed ({}): {}", e.as_label(), e));
        manager.context().set_status(AppStatus::Error);
    }
    result
}

async fn start_activities(
    manager: &LifecycleManager,
    registrar: &SubscriptionRegistrar,
    app_dwell: &DwellInterval,
    levels: &LevelControl,
) -> FrameworkResult {
    // Indicator first so it shows the rest of startup
    manager.init(ActivityId::Led).await?;
    manager.start(ActivityId::Led)?;

    manager.context().set_status(AppStatus::InitDevice);
    manager.init_all().await?;
    manager.context().set_status(AppStatus::InitDeviceDone);

    manager.start(ActivityId::Registration)?;
    manager.start(ActivityId::Mqtt)?;
    registrar.subscribe_async(
        "AppControl",
        Qos::AtMostOnce,
        app_control_commands(app_dwell.clone(), levels.clone()),
    );
    manager.start(ActivityId::Location)?;
    manager.start(ActivityId::Sensor)?;

    info!("all activities started");
    Ok(())
}

/// Record a failure that stops the node before its activities run
///
/// The LED activity is not up yet, so the indicator is set directly.
pub fn report_fatal(ctx: &AppContext, indicator: &dyn StatusIndicator, reason: &str) {
    logging::record(LogLevel::Fatal, reason);
    ctx.set_status(AppStatus::Error);
    indicator.set_pattern(pattern_for(AppStatus::Error));
}

/// Ask for a measurement and a fix every application dwell until exit
pub async fn run_app_loop(manager: &LifecycleManager, app_dwell: &DwellInterval) {
    let ctx = manager.context();
    let tick = Duration::from_millis(limits::APP_DWELL_TICK_MS);

    while !ctx.is_exiting() {
        let current = app_dwell.get();
        dwell_with_tick(app_dwell, tick, || {
            app_dwell.get() == current && !ctx.is_exiting()
        })
        .await;

        if ctx.is_exiting() {
            break;
        }

        for (id, message) in [
            (ActivityId::Sensor, Message::MeasureNow),
            (ActivityId::Location, Message::LocationNow),
        ] {
            if let Err(e) = manager.send(id, message) {
                debug!("{} request not queued: {}", id, e);
            }
        }
    }
}

/// Stop every activity, the network last, then close the log
pub async fn finalise(manager: &LifecycleManager, log_sink: &LogSink) {
    let ctx = manager.context();
    if ctx.status() != AppStatus::Error {
        ctx.set_status(AppStatus::Shutdown);
    }
    ctx.request_exit();

    if let Err(e) = manager.wait_for_dependents().await {
        warn!("waiting for activities failed: {}", e);
    }
    if let Err(e) = manager.stop_and_wait(ActivityId::Registration).await {
        debug!("Registration not stopped: {}", e);
    }

    log_sink.append(LogLevel::Info, &format!("shutdown complete ({})", ctx.status()));
    log_sink.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::testing::connected_node;
    use crate::logging::{detached_level_control, CapturedLog};
    use crate::providers::{LedPattern, LogIndicator};
    use crate::tasks::{Activity, ActivityDescriptor, ActivityScope, InitContext};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::time::sleep;
    use tracker_shared::FrameworkError;

    /// Idles until stopped; optionally refuses to initialise
    struct Stub {
        fail_init: bool,
    }

    #[async_trait]
    impl Activity for Stub {
        async fn init(&self, _ctx: &InitContext) -> FrameworkResult {
            if self.fail_init {
                Err(FrameworkError::fatal("modem did not answer"))
            } else {
                Ok(())
            }
        }

        async fn run(&self, scope: &mut ActivityScope) {
            while scope.is_running() {
                sleep(Duration::from_millis(10)).await;
            }
        }
    }

    fn table(failing: Option<ActivityId>) -> Vec<ActivityDescriptor> {
        [
            ActivityId::Registration,
            ActivityId::Mqtt,
            ActivityId::Led,
            ActivityId::Location,
            ActivityId::Sensor,
        ]
        .into_iter()
        .map(|id| {
            let stub = Stub {
                fail_init: failing == Some(id),
            };
            ActivityDescriptor::new(id, id == ActivityId::Registration, Arc::new(stub))
        })
        .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_starts_every_activity() {
        let node = connected_node().await;
        let manager = LifecycleManager::new(node.ctx.clone(), table(None));
        let (_layer, levels) = detached_level_control();
        let app_dwell = DwellInterval::from_secs(30);

        startup(&manager, &node.registrar, &app_dwell, &levels)
            .await
            .unwrap();

        for id in manager.ids() {
            assert!(manager.is_running(id), "{} not running", id);
        }
        assert_eq!(node.ctx.status(), AppStatus::InitDeviceDone);

        sleep(Duration::from_millis(100)).await;
        assert!(node.registrar.router().is_bound("/dev-1/AppControl"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_init_leaves_dependents_unstarted() {
        let node = connected_node().await;
        let manager = LifecycleManager::new(node.ctx.clone(), table(Some(ActivityId::Mqtt)));
        let (_layer, levels) = detached_level_control();
        let app_dwell = DwellInterval::from_secs(30);

        let err = startup(&manager, &node.registrar, &app_dwell, &levels)
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(node.ctx.status(), AppStatus::Error);
        assert!(manager.is_running(ActivityId::Led));
        for id in [
            ActivityId::Registration,
            ActivityId::Mqtt,
            ActivityId::Location,
            ActivityId::Sensor,
        ] {
            assert!(!manager.is_running(id), "{} started", id);
        }

        sleep(Duration::from_millis(100)).await;
        assert!(node.registrar.router().bindings().is_empty());
    }

    #[test]
    fn test_report_fatal_reaches_log_and_indicator() {
        let captured = CapturedLog::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let ctx = AppContext::new("dev-1");
        let indicator = LogIndicator::new();

        tracing::subscriber::with_default(subscriber, || {
            report_fatal(&ctx, &indicator, "broker address 'localhost' is not host:port");
        });

        assert_eq!(ctx.status(), AppStatus::Error);
        assert_eq!(indicator.current(), Some(LedPattern::RED));
        let text = captured.text();
        assert!(text.contains("ERROR"));
        assert!(text.contains("FATAL: broker address 'localhost' is not host:port"));
    }
}
