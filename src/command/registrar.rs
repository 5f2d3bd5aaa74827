//! Subscription registrar
//!
//! Subscribing does not need a live connection: each request becomes a
//! background retry loop that keeps trying until the broker confirms the
//! subscription or the application shuts down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracker_shared::{limits, Qos};

use super::router::{CommandBinding, CommandRouter, TopicBinding};
use crate::connection::PublishDispatcher;
use crate::context::AppContext;

/// Outcome of one subscription request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    /// The broker or provider refused the topic; not retried
    Failed,
    /// Shutdown was requested before the subscription succeeded
    Abandoned,
}

pub struct SubscriptionRegistrar {
    ctx: Arc<AppContext>,
    dispatcher: Arc<PublishDispatcher>,
    router: Arc<CommandRouter>,
    retry_delay: Duration,
}

impl SubscriptionRegistrar {
    pub fn new(
        ctx: Arc<AppContext>,
        dispatcher: Arc<PublishDispatcher>,
        router: Arc<CommandRouter>,
    ) -> Self {
        Self {
            ctx,
            dispatcher,
            router,
            retry_delay: Duration::from_millis(limits::SUBSCRIBE_RETRY_MS),
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn router(&self) -> &Arc<CommandRouter> {
        &self.router
    }

    /// Subscribe `/<deviceId>/<name>` and bind `commands` to it
    ///
    /// Returns immediately. The returned handle resolves once the binding is
    /// live, the subscription was refused, or the attempt was abandoned at
    /// shutdown.
    pub fn subscribe_async(
        &self,
        name: &str,
        qos: Qos,
        commands: Vec<CommandBinding>,
    ) -> JoinHandle<SubscribeOutcome> {
        self.spawn_retry(TopicBinding::new(self.ctx.topic(name), qos, commands))
    }

    /// Retry a bound topic whose subscription was lost on reconnect
    pub fn resubscribe(&self, binding: &TopicBinding) -> JoinHandle<SubscribeOutcome> {
        info!("retrying subscription to {}", binding.topic);
        self.spawn_retry(binding.clone())
    }

    fn spawn_retry(&self, binding: TopicBinding) -> JoinHandle<SubscribeOutcome> {
        let ctx = self.ctx.clone();
        let dispatcher = self.dispatcher.clone();
        let router = self.router.clone();
        let retry_delay = self.retry_delay;

        tokio::spawn(async move {
            let exit = ctx.exit_token();
            let mut attempts = 0u32;

            loop {
                if exit.is_cancelled() {
                    debug!("giving up on {} at shutdown", binding.topic);
                    return SubscribeOutcome::Abandoned;
                }

                attempts += 1;
                match dispatcher.subscribe(&binding.topic, binding.qos).await {
                    Ok(()) => {
                        info!(
                            "subscribed to {} after {} attempt(s), commands {:?}",
                            binding.topic,
                            attempts,
                            binding.command_names()
                        );
                        router.register(binding);
                        return SubscribeOutcome::Subscribed;
                    }
                    Err(e) if e.is_transient() => {
                        debug!("{} not subscribed yet: {}", binding.topic, e);
                    }
                    Err(e) => {
                        error!("subscribe to {} refused ({}): {}", binding.topic, e.as_label(), e);
                        return SubscribeOutcome::Failed;
                    }
                }

                tokio::select! {
                    _ = exit.cancelled() => {}
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::fake::RecordingProvider;
    use std::sync::atomic::Ordering;
    use tokio::time::{sleep, Instant};

    type Fixture = (
        Arc<AppContext>,
        Arc<RecordingProvider>,
        Arc<PublishDispatcher>,
        SubscriptionRegistrar,
    );

    fn registrar() -> Fixture {
        let ctx = Arc::new(AppContext::new("dev-1"));
        let provider = Arc::new(RecordingProvider::default());
        let router = Arc::new(CommandRouter::new());
        let dispatcher = Arc::new(PublishDispatcher::new(
            ctx.clone(),
            provider.clone(),
            router.clone(),
        ));
        let registrar = SubscriptionRegistrar::new(ctx.clone(), dispatcher.clone(), router);
        (ctx, provider, dispatcher, registrar)
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribes_once_connected() {
        let (ctx, provider, dispatcher, registrar) = registrar();

        let started = Instant::now();
        let handle = registrar.subscribe_async(
            "AppControl",
            Qos::AtMostOnce,
            vec![CommandBinding::new("SET_DWELL_TIME", |_| Ok(()))],
        );

        sleep(Duration::from_secs(12)).await;
        assert!(!registrar.router().is_bound("/dev-1/AppControl"));

        ctx.set_network_up(true);
        ctx.set_signal_valid(true);
        provider.connected.store(true, Ordering::SeqCst);
        dispatcher.on_connected().await;

        assert_eq!(handle.await.unwrap(), SubscribeOutcome::Subscribed);
        assert!(started.elapsed() <= Duration::from_secs(15) + Duration::from_millis(10));
        assert!(registrar.router().is_bound("/dev-1/AppControl"));
        assert_eq!(provider.subscribed(), vec!["/dev-1/AppControl"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_on_shutdown() {
        let (ctx, provider, _dispatcher, registrar) = registrar();

        let handle = registrar.subscribe_async("SensorControl", Qos::AtMostOnce, vec![]);
        sleep(Duration::from_secs(1)).await;
        ctx.request_exit();

        assert_eq!(handle.await.unwrap(), SubscribeOutcome::Abandoned);
        assert!(provider.subscribed().is_empty());
        assert!(registrar.router().bindings().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_subscription_is_not_retried() {
        let (ctx, provider, dispatcher, registrar) = registrar();
        ctx.set_network_up(true);
        ctx.set_signal_valid(true);
        provider.connected.store(true, Ordering::SeqCst);
        provider.reject_subscribe.store(true, Ordering::SeqCst);
        dispatcher.on_connected().await;

        let started = Instant::now();
        let handle = registrar.subscribe_async("AppControl", Qos::AtMostOnce, vec![]);

        assert_eq!(handle.await.unwrap(), SubscribeOutcome::Failed);
        assert!(started.elapsed() < Duration::from_millis(limits::SUBSCRIBE_RETRY_MS));
        assert_eq!(provider.subscribe_attempts.load(Ordering::SeqCst), 1);
        assert!(!registrar.router().is_bound("/dev-1/AppControl"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_subscription_retried_until_connected() {
        let (ctx, provider, dispatcher, registrar) = registrar();
        ctx.set_network_up(true);
        ctx.set_signal_valid(true);
        registrar.router().register(TopicBinding::new(
            "/dev-1/AppControl",
            Qos::AtMostOnce,
            vec![CommandBinding::new("SET_DWELL_TIME", |_| Ok(()))],
        ));

        let lost = dispatcher.on_connected().await;
        assert_eq!(lost.len(), 1);

        let handle = registrar.resubscribe(&lost[0]);
        sleep(Duration::from_secs(1)).await;
        assert!(provider.subscribed().is_empty());

        provider.connected.store(true, Ordering::SeqCst);
        assert_eq!(handle.await.unwrap(), SubscribeOutcome::Subscribed);
        assert_eq!(provider.subscribed(), vec!["/dev-1/AppControl"]);
        assert_eq!(
            registrar.router().route("/dev-1/AppControl", "SET_DWELL_TIME 1000"),
            Ok(())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_before_connection() {
        let (_ctx, _provider, _dispatcher, registrar) = registrar();
        let registrar = registrar.with_retry_delay(Duration::from_millis(500));

        let handle = registrar.subscribe_async("LocationControl", Qos::AtMostOnce, vec![]);

        assert!(!handle.is_finished());
        handle.abort();
    }
}
