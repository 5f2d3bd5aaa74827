//! Transport-owning activity
//!
//! The only activity that talks to the connectivity provider. Other
//! activities queue publications in its mailbox through a
//! [`Publisher`](crate::connection::Publisher); inbound control messages are
//! handed to the command router from here.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use tracker_shared::{AppStatus, FrameworkResult};

use crate::command::{CommandRouter, SubscriptionRegistrar};
use crate::connection::{ConnectionEvent, ConnectionState, OutboundPublication, PublishDispatcher};
use crate::context::AppContext;
use crate::tasks::{dwell, Activity, ActivityScope, InitContext, Message};

pub struct MqttActivity {
    ctx: Arc<AppContext>,
    dispatcher: Arc<PublishDispatcher>,
    registrar: Arc<SubscriptionRegistrar>,
    router: Arc<CommandRouter>,
    events: Mutex<mpsc::Receiver<ConnectionEvent>>,
}

impl MqttActivity {
    pub fn new(
        ctx: Arc<AppContext>,
        dispatcher: Arc<PublishDispatcher>,
        registrar: Arc<SubscriptionRegistrar>,
        events: mpsc::Receiver<ConnectionEvent>,
    ) -> Self {
        let router = registrar.router().clone();
        Self {
            ctx,
            dispatcher,
            registrar,
            router,
            events: Mutex::new(events),
        }
    }

    async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => {
                info!("[MQTT] connected");
                self.ctx.set_status(AppStatus::MqttConnected);
                for binding in self.dispatcher.on_connected().await {
                    self.registrar.resubscribe(&binding);
                }
            }
            ConnectionEvent::Disconnected { reason } => {
                warn!("[MQTT] disconnected: {}", reason);
                self.ctx.set_status(AppStatus::MqttDisconnected);
                self.dispatcher.on_disconnected();
            }
            ConnectionEvent::Message { topic, payload } => {
                debug!("[MQTT] {} <- {}", topic, payload);
                if let Err(e) = self.router.route(&topic, &payload) {
                    warn!("[MQTT] command on {} rejected ({}): {}", topic, e.as_label(), e);
                }
            }
        }
    }

    async fn ensure_connected(&self) {
        if self.dispatcher.state() != ConnectionState::Disconnected {
            return;
        }
        if !self.ctx.network_available() {
            debug!("[MQTT] waiting for the network");
            return;
        }

        self.ctx.set_status(AppStatus::MqttConnecting);
        if let Err(e) = self.dispatcher.connect().await {
            warn!("[MQTT] connect failed: {}", e);
        }
    }

    async fn send_all(&self, publications: Vec<OutboundPublication>) {
        if publications.is_empty() {
            return;
        }

        let previous = self.ctx.swap_status(AppStatus::SendingTelemetry);
        for publication in publications {
            if let Err(e) = self.dispatcher.publish(&publication).await {
                warn!("[MQTT] dropped publication to {}: {}", publication.topic, e);
            }
        }
        if self.ctx.status() == AppStatus::SendingTelemetry {
            self.ctx.set_status(previous);
        }
    }
}

#[async_trait]
impl Activity for MqttActivity {
    async fn init(&self, _ctx: &InitContext) -> FrameworkResult {
        Ok(())
    }

    async fn run(&self, scope: &mut ActivityScope) {
        let mut events = self.events.lock().await;
        let mut shutdown = false;

        while !shutdown {
            while let Ok(event) = events.try_recv() {
                self.handle_event(event).await;
            }

            self.ensure_connected().await;

            let mut publications = Vec::new();
            for message in scope.mailbox.drain() {
                match message {
                    Message::Publish(publication) => publications.push(publication),
                    Message::Shutdown => shutdown = true,
                    other => debug!("[MQTT] ignoring {} message", other.kind()),
                }
            }
            self.send_all(publications).await;

            if shutdown {
                break;
            }

            dwell(&scope.dwell, || {
                scope.is_running() && events.is_empty() && !scope.mailbox.has_pending()
            })
            .await;

            shutdown = !scope.is_running();
        }

        self.dispatcher.disconnect().await;
        if scope.exiting() {
            self.router.clear();
        }
        info!("[MQTT] transport closed");
    }
}
