mod activities;
mod app;
mod command;
mod config;
mod connection;
mod context;
mod logging;
mod providers;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use activities::Providers;
use command::{CommandRouter, SubscriptionRegistrar};
use config::{config_path, AppConfig, ConfigStore, CONFIG_ENV};
use connection::{PublishDispatcher, TcpConnectivity};
use context::AppContext;
use providers::{LogIndicator, SimulatedGnss, SimulatedNetwork, SimulatedSensors};
use tasks::{DwellInterval, LifecycleManager};

use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    let mut store = ConfigStore::new();
    let loaded = store.load(&path);
    let config = AppConfig::read(&store);

    let log_sink = logging::init_logging(&config.data_dir, config.log_level, config.log_stdout)?;
    match loaded {
        Ok(count) => info!("loaded {} setting(s) from {}", count, path.display()),
        Err(_) if !path.exists() => {
            warn!("no configuration at {}, writing defaults", path.display());
            if let Err(e) = ConfigStore::save(&path, &config.to_pairs()) {
                warn!("could not write {}: {:#}", path.display(), e);
            }
        }
        Err(e) => warn!("configuration {} unreadable ({:#}), using defaults", path.display(), e),
    }
    store.print();

    let ctx = Arc::new(AppContext::new(config.device_id.clone()));
    let providers = Providers {
        network: Arc::new(SimulatedNetwork::new(3)),
        location: Arc::new(SimulatedGnss::new(52.3676, 4.9041, Duration::from_secs(5))),
        sensors: Arc::new(SimulatedSensors::new()),
        indicator: Arc::new(LogIndicator::new()),
    };

    if let Err(e) = config.validate() {
        app::report_fatal(&ctx, providers.indicator.as_ref(), &format!("configuration rejected: {}", e));
        log_sink.close();
        return Err(e.into());
    }

    info!("Tracker node starting: {}", config.device_id);
    info!("  broker: {}", config.broker_address);
    info!("  log: {}", log_sink.path().display());

    let router = Arc::new(CommandRouter::new());
    let (transport, events) = TcpConnectivity::new(config.connection());
    let dispatcher = Arc::new(PublishDispatcher::new(
        ctx.clone(),
        Arc::new(transport),
        router.clone(),
    ));
    let registrar = Arc::new(
        SubscriptionRegistrar::new(ctx.clone(), dispatcher.clone(), router)
            .with_retry_delay(config.subscribe_retry),
    );

    let manager = LifecycleManager::new(
        ctx.clone(),
        activities::node_table(&ctx, &providers, &dispatcher, &registrar, events),
    );

    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        signal_ctx.request_exit();
    });

    let app_dwell = DwellInterval::new(config.app_dwell);
    if app::startup(&manager, &registrar, &app_dwell, log_sink.levels())
        .await
        .is_ok()
    {
        app::run_app_loop(&manager, &app_dwell).await;
    }

    app::finalise(&manager, &log_sink).await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler not installed: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
