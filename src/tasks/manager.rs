//! Lifecycle manager
//!
//! Owns the activity table and drives every activity through
//! init → start → stop. The guard logic lives here once; activities only
//! supply their entry points through [`Activity`].

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracker_shared::{
    limits, FrameworkError, FrameworkResult, LifecycleEvent, LifecycleState, TransitionResult,
};

use super::dwell::DwellInterval;
use super::mailbox::{mailbox, Mailbox, MailboxReceiver, Message};
use super::registry::{ActivityDescriptor, ActivityId, ActivityScope, InitContext};
use crate::context::AppContext;

/// Mutable half of an activity's record
struct Runtime {
    state: LifecycleState,
    running: bool,
    stop: CancellationToken,
    /// Parked here while no loop holds it
    receiver: Option<MailboxReceiver>,
}

struct Entry {
    descriptor: ActivityDescriptor,
    mailbox: Mailbox,
    dwell: DwellInterval,
    init_lock: tokio::sync::Mutex<()>,
    runtime: Mutex<Runtime>,
}

impl Entry {
    fn new(descriptor: ActivityDescriptor) -> Self {
        let (tx, rx) = mailbox(descriptor.name(), descriptor.mailbox_capacity);
        let dwell = DwellInterval::new(descriptor.dwell.unwrap_or(Duration::ZERO));

        Self {
            descriptor,
            mailbox: tx,
            dwell,
            init_lock: tokio::sync::Mutex::new(()),
            runtime: Mutex::new(Runtime {
                state: LifecycleState::Uninitialized,
                running: false,
                stop: CancellationToken::new(),
                receiver: Some(rx),
            }),
        }
    }

    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_running(&self) -> bool {
        self.runtime().running
    }
}

impl Runtime {
    fn apply(&mut self, id: ActivityId, event: LifecycleEvent) {
        match self.state.apply(event) {
            TransitionResult::Changed(next) => {
                debug!("{}: {} -> {}", id, self.state, next);
                self.state = next;
            }
            TransitionResult::Unchanged(_) => {}
            TransitionResult::Invalid { from, event } => {
                warn!("{}: ignoring {:?} while {}", id, event, from);
            }
        }
    }
}

/// Drives activity lifecycles over a fixed descriptor table
pub struct LifecycleManager {
    me: Weak<LifecycleManager>,
    ctx: Arc<AppContext>,
    entries: Vec<Entry>,
}

impl LifecycleManager {
    /// Build the manager from the static activity table
    pub fn new(ctx: Arc<AppContext>, descriptors: Vec<ActivityDescriptor>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            ctx,
            entries: descriptors.into_iter().map(Entry::new).collect(),
        })
    }

    fn entry(&self, id: ActivityId) -> FrameworkResult<&Entry> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .ok_or_else(|| FrameworkError::not_found(format!("no activity registered as {}", id)))
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Activity ids in table order
    pub fn ids(&self) -> Vec<ActivityId> {
        self.entries.iter().map(|e| e.descriptor.id).collect()
    }

    /// Run an activity's init entry point once
    ///
    /// A second call is a no-op. Failure is reported as `Fatal`.
    pub async fn init(&self, id: ActivityId) -> FrameworkResult {
        let entry = self.entry(id)?;
        let _guard = entry.init_lock.lock().await;

        if entry.runtime().state.is_initialized() {
            debug!("{} already initialised", id);
            return Ok(());
        }

        let ctx = InitContext {
            id,
            manager: self.me.clone(),
        };

        if let Err(e) = entry.descriptor.activity.init(&ctx).await {
            error!("{} init failed: {}", id, e);
            return Err(FrameworkError::fatal(format!("{} init failed: {}", id, e)));
        }

        entry.runtime().apply(id, LifecycleEvent::InitSucceeded);
        info!("{} initialised", id);
        Ok(())
    }

    /// Initialise every activity in table order, stopping at the first failure
    pub async fn init_all(&self) -> FrameworkResult {
        for id in self.ids() {
            self.init(id).await?;
        }
        Ok(())
    }

    pub fn start(&self, id: ActivityId) -> FrameworkResult {
        self.start_with(id, &[])
    }

    /// Spawn an activity's loop
    ///
    /// `params` are handed to the activity's start entry point. Returns
    /// `NotInitialized` if init never succeeded and is a no-op if the loop
    /// is already running.
    pub fn start_with(&self, id: ActivityId, params: &[String]) -> FrameworkResult {
        let entry = self.entry(id)?;
        let mut runtime = entry.runtime();

        if !runtime.state.is_initialized() {
            return Err(FrameworkError::not_initialized(format!(
                "{} has not been initialised",
                id
            )));
        }

        if runtime.running {
            debug!("{} is already running", id);
            return Ok(());
        }

        entry.descriptor.activity.start(params, &entry.dwell)?;

        let receiver = runtime.receiver.take().ok_or_else(|| {
            FrameworkError::transient(format!("{} mailbox is still held by its previous loop", id))
        })?;

        let stop = CancellationToken::new();
        runtime.stop = stop.clone();
        runtime.running = true;
        runtime.apply(id, LifecycleEvent::StartSucceeded);
        drop(runtime);

        let mut scope = ActivityScope::new(
            id,
            entry.dwell.clone(),
            receiver,
            stop,
            self.ctx.exit_token().clone(),
            self.me.clone(),
        );
        let activity = entry.descriptor.activity.clone();
        let manager = self.me.clone();

        tokio::spawn(async move {
            if AssertUnwindSafe(activity.run(&mut scope))
                .catch_unwind()
                .await
                .is_err()
            {
                error!("{} loop panicked", id);
            }

            if let Some(manager) = manager.upgrade() {
                manager.loop_exited(id, scope);
            }
        });

        info!("{} started (dwell {:?})", id, entry.dwell.get());
        Ok(())
    }

    fn loop_exited(&self, id: ActivityId, scope: ActivityScope) {
        let Ok(entry) = self.entry(id) else {
            return;
        };

        {
            let mut runtime = entry.runtime();
            runtime.receiver = Some(scope.mailbox);
            runtime.apply(id, LifecycleEvent::LoopExited);
        }

        if let Some(on_stopped) = &entry.descriptor.on_stopped {
            on_stopped();
        }

        entry.runtime().running = false;
        info!("{} stopped", id);
    }

    /// Ask an activity's loop to leave at its next dwell tick
    pub fn request_stop(&self, id: ActivityId) -> FrameworkResult {
        let entry = self.entry(id)?;
        let mut runtime = entry.runtime();

        if !runtime.state.is_initialized() {
            return Err(FrameworkError::not_initialized(format!(
                "{} has not been initialised",
                id
            )));
        }

        if !runtime.running {
            debug!("{} is not running", id);
            return Ok(());
        }

        runtime.apply(id, LifecycleEvent::StopRequested);
        runtime.stop.cancel();
        drop(runtime);

        entry.descriptor.activity.stop();
        info!("{} stop requested", id);
        Ok(())
    }

    /// Request a stop and wait until the loop has returned
    pub async fn stop_and_wait(&self, id: ActivityId) -> FrameworkResult {
        self.request_stop(id)?;

        let entry = self.entry(id)?;
        while entry.is_running() {
            sleep(Duration::from_millis(limits::STOP_POLL_MS)).await;
        }
        Ok(())
    }

    /// Wait until every listed activity without `explicit_stop` has stopped
    ///
    /// Activities marked `explicit_stop` are skipped; the caller stops them
    /// by name afterwards, in dependency order.
    pub async fn wait_for_all(&self, ids: &[ActivityId]) -> FrameworkResult {
        let mut group = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = self.entry(*id)?;
            if entry.descriptor.explicit_stop {
                debug!("{} is stopped explicitly, not waiting for it", id);
            } else {
                group.push(entry);
            }
        }

        while let Some(entry) = group.iter().find(|e| e.is_running()) {
            debug!("waiting for {} to stop", entry.descriptor.id);
            sleep(Duration::from_millis(limits::STOP_POLL_MS)).await;
        }
        Ok(())
    }

    /// [`wait_for_all`](Self::wait_for_all) over the whole table
    pub async fn wait_for_dependents(&self) -> FrameworkResult {
        self.wait_for_all(&self.ids()).await
    }

    /// Queue a message for an activity without blocking
    pub fn send(&self, id: ActivityId, message: Message) -> FrameworkResult {
        let entry = self.entry(id)?;

        if !entry.runtime().state.is_initialized() {
            return Err(FrameworkError::not_initialized(format!(
                "{} has not been initialised",
                id
            )));
        }

        entry.mailbox.send(message)
    }

    /// Producer handle for an activity's mailbox
    pub fn mailbox(&self, id: ActivityId) -> FrameworkResult<Mailbox> {
        Ok(self.entry(id)?.mailbox.clone())
    }

    /// Live dwell interval of an activity
    pub fn dwell(&self, id: ActivityId) -> FrameworkResult<DwellInterval> {
        Ok(self.entry(id)?.dwell.clone())
    }

    pub fn is_running(&self, id: ActivityId) -> bool {
        self.entry(id).map(Entry::is_running).unwrap_or(false)
    }

    pub fn state(&self, id: ActivityId) -> Option<LifecycleState> {
        self.entry(id).ok().map(|e| e.runtime().state)
    }
}
