//! Commands that control an activity from its own control topic

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::info;
use tracker_shared::{limits, FrameworkError, FrameworkResult};

use crate::command::params::{int_param, validate_range};
use crate::command::CommandBinding;
use crate::tasks::{ActivityId, DwellInterval, LifecycleManager, Message};

fn upgrade(manager: &Weak<LifecycleManager>) -> FrameworkResult<Arc<LifecycleManager>> {
    manager
        .upgrade()
        .ok_or_else(|| FrameworkError::not_initialized("lifecycle manager is gone"))
}

/// A command that queues `make()` in the activity's mailbox
pub fn trigger(
    name: &'static str,
    manager: Weak<LifecycleManager>,
    id: ActivityId,
    make: fn() -> Message,
) -> CommandBinding {
    CommandBinding::new(name, move |_| upgrade(&manager)?.send(id, make()))
}

/// `START_TASK [dwellSeconds]`
pub fn start_task(manager: Weak<LifecycleManager>, id: ActivityId) -> CommandBinding {
    CommandBinding::new("START_TASK", move |tokens| {
        upgrade(&manager)?.start_with(id, tokens)
    })
}

/// `STOP_TASK`
pub fn stop_task(manager: Weak<LifecycleManager>, id: ActivityId) -> CommandBinding {
    CommandBinding::new("STOP_TASK", move |_| upgrade(&manager)?.request_stop(id))
}

/// Set an activity's dwell from `START_TASK` parameters
///
/// Without parameters the current dwell is kept. A missing or malformed
/// value gives the default; a value outside the bounds is rejected.
pub fn apply_start_dwell(params: &[String], dwell: &DwellInterval) -> FrameworkResult {
    if params.is_empty() {
        return Ok(());
    }

    let secs = int_param(
        params,
        1,
        limits::TASK_DWELL_MIN_SECS,
        limits::TASK_DWELL_MAX_SECS,
        limits::TASK_DWELL_DEFAULT_SECS,
    );
    let secs = validate_range(
        "task dwell",
        secs,
        limits::TASK_DWELL_MIN_SECS,
        limits::TASK_DWELL_MAX_SECS,
    )?;

    dwell.set(Duration::from_secs(secs as u64));
    info!("task dwell set to {} s", secs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(text: &str) -> Vec<String> {
        crate::command::params::tokenize(text)
    }

    #[test]
    fn test_start_dwell_from_params() {
        let dwell = DwellInterval::from_secs(30);

        apply_start_dwell(&params("START_TASK 10"), &dwell).unwrap();
        assert_eq!(dwell.get(), Duration::from_secs(10));

        apply_start_dwell(&params("START_TASK"), &dwell).unwrap();
        assert_eq!(dwell.get(), Duration::from_secs(30));
    }

    #[test]
    fn test_start_dwell_kept_without_params() {
        let dwell = DwellInterval::from_secs(12);
        apply_start_dwell(&[], &dwell).unwrap();
        assert_eq!(dwell.get(), Duration::from_secs(12));
    }

    #[test]
    fn test_start_dwell_out_of_range() {
        let dwell = DwellInterval::from_secs(30);
        assert!(apply_start_dwell(&params("START_TASK 2"), &dwell).is_err());
        assert!(apply_start_dwell(&params("START_TASK 61"), &dwell).is_err());
        assert_eq!(dwell.get(), Duration::from_secs(30));
    }

    #[test]
    fn test_handlers_fail_once_manager_is_gone() {
        let binding = stop_task(Weak::new(), ActivityId::Sensor);
        let err = (binding.handler)(&params("STOP_TASK")).unwrap_err();
        assert!(matches!(err, FrameworkError::NotInitialized(_)));
    }
}
