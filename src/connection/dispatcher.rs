//! Publish dispatcher
//!
//! Tracks the transport's connection state and hands publications to the
//! connectivity provider. Publications are rejected straight away while the
//! transport is unavailable; nothing is queued here.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use tracker_shared::{FrameworkError, FrameworkResult, Qos};

use super::provider::{ConnectivityProvider, OutboundPublication};
use crate::command::{CommandRouter, TopicBinding};
use crate::context::AppContext;
use crate::tasks::{Mailbox, Message};

/// Connection state as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

pub struct PublishDispatcher {
    ctx: Arc<AppContext>,
    provider: Arc<dyn ConnectivityProvider>,
    router: Arc<CommandRouter>,
    state: AtomicU8,
}

impl PublishDispatcher {
    pub fn new(
        ctx: Arc<AppContext>,
        provider: Arc<dyn ConnectivityProvider>,
        router: Arc<CommandRouter>,
    ) -> Self {
        Self {
            ctx,
            provider,
            router,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.state.swap(state as u8, Ordering::SeqCst))
    }

    pub fn provider(&self) -> &Arc<dyn ConnectivityProvider> {
        &self.provider
    }

    /// Connected, the provider agrees, and the network link is up
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected
            && self.provider.is_connected()
            && self.ctx.network_available()
    }

    fn ensure_ready(&self) -> FrameworkResult {
        if self.is_ready() {
            Ok(())
        } else {
            Err(FrameworkError::transient(format!(
                "transport not available ({})",
                self.state()
            )))
        }
    }

    /// Ask the provider to connect unless a connection is already up or underway
    pub async fn connect(&self) -> FrameworkResult {
        if self.state() != ConnectionState::Disconnected {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.provider.connect().await {
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    /// Hand one publication to the provider
    ///
    /// `Transient` when the transport is unavailable or the provider fails;
    /// the caller decides whether to try again.
    pub async fn publish(&self, publication: &OutboundPublication) -> FrameworkResult {
        publication.validate()?;
        self.ensure_ready()?;

        match self.provider.publish(publication).await {
            Ok(()) => {
                debug!("published {} bytes to {}", publication.payload.len(), publication.topic);
                Ok(())
            }
            Err(e) => {
                warn!("publish to {} failed: {}", publication.topic, e);
                Err(FrameworkError::transient(format!(
                    "publish to {} failed: {}",
                    publication.topic, e
                )))
            }
        }
    }

    /// Subscribe through the provider; `Transient` until connected
    pub async fn subscribe(&self, topic: &str, qos: Qos) -> FrameworkResult {
        self.ensure_ready()?;
        self.provider.subscribe(topic, qos).await
    }

    /// Record an established session and restore every bound subscription
    ///
    /// Returns the bindings whose resubscription failed; the caller hands
    /// them to the subscription registrar to retry.
    pub async fn on_connected(&self) -> Vec<Arc<TopicBinding>> {
        let previous = self.set_state(ConnectionState::Connected);
        if previous == ConnectionState::Connected {
            return Vec::new();
        }

        let bindings = self.router.bindings();
        if !bindings.is_empty() {
            info!("resubscribing {} topic(s)", bindings.len());
        }

        let mut lost = Vec::new();
        for binding in bindings {
            if let Err(e) = self.provider.subscribe(&binding.topic, binding.qos).await {
                warn!("resubscribe to {} failed: {}", binding.topic, e);
                lost.push(binding);
            }
        }
        lost
    }

    pub fn on_disconnected(&self) {
        self.set_state(ConnectionState::Disconnected);
    }

    pub async fn disconnect(&self) {
        self.provider.disconnect().await;
        self.on_disconnected();
    }
}

/// Handle activities use to publish through the transport-owning activity
///
/// Fails fast when the transport is unavailable; otherwise the publication is
/// queued in the transport activity's mailbox.
#[derive(Clone)]
pub struct Publisher {
    dispatcher: Arc<PublishDispatcher>,
    mailbox: Mailbox,
}

impl Publisher {
    pub fn new(dispatcher: Arc<PublishDispatcher>, mailbox: Mailbox) -> Self {
        Self {
            dispatcher,
            mailbox,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.dispatcher.is_ready()
    }

    pub fn publish(&self, publication: OutboundPublication) -> FrameworkResult {
        publication.validate()?;
        self.dispatcher.ensure_ready()?;
        self.mailbox.send(Message::Publish(publication))
    }
}
