//! Activity descriptors and the entry-point trait every activity implements

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracker_shared::{FrameworkError, FrameworkResult};

use super::dwell::DwellInterval;
use super::mailbox::MailboxReceiver;
use super::manager::LifecycleManager;

/// Identity of every activity the node knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityId {
    Registration,
    Mqtt,
    Led,
    Location,
    Sensor,
}

impl ActivityId {
    pub fn name(self) -> &'static str {
        match self {
            ActivityId::Registration => "Registration",
            ActivityId::Mqtt => "MQTT",
            ActivityId::Led => "LED",
            ActivityId::Location => "Location",
            ActivityId::Sensor => "Sensor",
        }
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Callback run after an activity's loop has returned
pub type OnStopped = Arc<dyn Fn() + Send + Sync>;

/// Entry points of an activity
///
/// The lifecycle manager owns the guard logic (init once, start only when
/// initialized and not running, cooperative stop). An activity only supplies
/// what it does at each step.
#[async_trait]
pub trait Activity: Send + Sync {
    /// One-time setup; an error here aborts startup
    async fn init(&self, ctx: &InitContext) -> FrameworkResult;

    /// Interpret start parameters before the loop is spawned
    ///
    /// `params` are the tokens of the command that asked for the start, with
    /// the command name at index 0. Empty when started by the node itself.
    fn start(&self, _params: &[String], _dwell: &DwellInterval) -> FrameworkResult {
        Ok(())
    }

    /// The activity's loop; returns when the scope says to stop
    async fn run(&self, scope: &mut ActivityScope);

    /// Called when a stop is requested, before the loop observes it
    fn stop(&self) {}
}

/// Static description of one activity
pub struct ActivityDescriptor {
    pub id: ActivityId,
    /// Default pause between work cycles; `None` for tick-driven activities
    pub dwell: Option<Duration>,
    pub mailbox_capacity: usize,
    /// Excluded from the group wait at shutdown and stopped individually
    pub explicit_stop: bool,
    pub on_stopped: Option<OnStopped>,
    pub activity: Arc<dyn Activity>,
}

impl ActivityDescriptor {
    /// `explicit_stop` has no default: every activity states its shutdown policy
    pub fn new(id: ActivityId, explicit_stop: bool, activity: Arc<dyn Activity>) -> Self {
        Self {
            id,
            dwell: None,
            mailbox_capacity: 1,
            explicit_stop,
            on_stopped: None,
            activity,
        }
    }

    pub fn dwell(mut self, dwell: Duration) -> Self {
        self.dwell = Some(dwell);
        self
    }

    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn on_stopped(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stopped = Some(Arc::new(callback));
        self
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

impl fmt::Debug for ActivityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityDescriptor")
            .field("id", &self.id)
            .field("dwell", &self.dwell)
            .field("mailbox_capacity", &self.mailbox_capacity)
            .field("explicit_stop", &self.explicit_stop)
            .field("on_stopped", &self.on_stopped.is_some())
            .finish()
    }
}

/// Handed to [`Activity::init`]
pub struct InitContext {
    pub id: ActivityId,
    pub(super) manager: Weak<LifecycleManager>,
}

impl InitContext {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Non-owning handle to the manager, for command handlers that outlive init
    pub fn manager(&self) -> Weak<LifecycleManager> {
        self.manager.clone()
    }
}

/// Everything an activity's loop needs while it runs
pub struct ActivityScope {
    pub id: ActivityId,
    pub dwell: DwellInterval,
    pub mailbox: MailboxReceiver,
    stop: CancellationToken,
    exit: CancellationToken,
    manager: Weak<LifecycleManager>,
}

impl ActivityScope {
    pub(super) fn new(
        id: ActivityId,
        dwell: DwellInterval,
        mailbox: MailboxReceiver,
        stop: CancellationToken,
        exit: CancellationToken,
        manager: Weak<LifecycleManager>,
    ) -> Self {
        Self {
            id,
            dwell,
            mailbox,
            stop,
            exit,
            manager,
        }
    }

    /// A stop was requested for this activity
    pub fn stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// The whole application is shutting down
    pub fn exiting(&self) -> bool {
        self.exit.is_cancelled()
    }

    /// Neither this activity nor the application has been asked to stop
    pub fn is_running(&self) -> bool {
        !self.stop_requested() && !self.exiting()
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Owned form of [`is_running`](Self::is_running) for long operations
    /// that cannot borrow the scope
    pub fn running_check(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let stop = self.stop.clone();
        let exit = self.exit.clone();
        move || !stop.is_cancelled() && !exit.is_cancelled()
    }

    pub fn manager(&self) -> FrameworkResult<Arc<LifecycleManager>> {
        self.manager
            .upgrade()
            .ok_or_else(|| FrameworkError::not_initialized("lifecycle manager is gone"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle;

    #[async_trait]
    impl Activity for Idle {
        async fn init(&self, _ctx: &InitContext) -> FrameworkResult {
            Ok(())
        }

        async fn run(&self, _scope: &mut ActivityScope) {}
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = ActivityDescriptor::new(ActivityId::Mqtt, false, Arc::new(Idle))
            .dwell(Duration::from_secs(30))
            .mailbox_capacity(10)
            .on_stopped(|| {});

        assert_eq!(descriptor.name(), "MQTT");
        assert_eq!(descriptor.dwell, Some(Duration::from_secs(30)));
        assert_eq!(descriptor.mailbox_capacity, 10);
        assert!(!descriptor.explicit_stop);
        assert!(descriptor.on_stopped.is_some());
    }

    #[test]
    fn test_scope_running_follows_both_tokens() {
        let (_tx, rx) = super::super::mailbox::mailbox("LED", 1);
        let stop = CancellationToken::new();
        let exit = CancellationToken::new();
        let scope = ActivityScope::new(
            ActivityId::Led,
            DwellInterval::from_secs(1),
            rx,
            stop.clone(),
            exit.clone(),
            Weak::new(),
        );

        assert!(scope.is_running());
        exit.cancel();
        assert!(!scope.is_running());
        assert!(!scope.stop_requested());
        assert!(scope.manager().is_err());
    }
}
