//! Application control commands (`AppControl` topic)

use std::time::Duration;

use tracing::info;
use tracker_shared::{limits, FrameworkError};

use crate::command::params::{int_param, validate_range};
use crate::command::CommandBinding;
use crate::logging::{LevelControl, LogLevel};
use crate::tasks::DwellInterval;

pub fn app_control_commands(app_dwell: DwellInterval, levels: LevelControl) -> Vec<CommandBinding> {
    vec![set_dwell_time(app_dwell), set_log_level(levels)]
}

/// `SET_DWELL_TIME <ms>`: pause of the application loop
pub fn set_dwell_time(app_dwell: DwellInterval) -> CommandBinding {
    CommandBinding::new("SET_DWELL_TIME", move |tokens| {
        let millis = int_param(
            tokens,
            1,
            limits::APP_DWELL_MIN_MS,
            limits::APP_DWELL_MAX_MS,
            limits::APP_DWELL_DEFAULT_MS,
        );
        let millis = validate_range(
            "dwell time",
            millis,
            limits::APP_DWELL_MIN_MS,
            limits::APP_DWELL_MAX_MS,
        )?;

        app_dwell.set(Duration::from_millis(millis as u64));
        info!("application dwell time set to {} ms", millis);
        Ok(())
    })
}

/// `SET_LOG_LEVEL <0..=5>`; a missing or malformed level means INFO
pub fn set_log_level(levels: LevelControl) -> CommandBinding {
    CommandBinding::new("SET_LOG_LEVEL", move |tokens| {
        let index = int_param(tokens, 1, 0, 5, LogLevel::Info as i32);
        let level = LogLevel::from_index(index).ok_or_else(|| {
            FrameworkError::validation(format!("log level {} is not 0..=5", index))
        })?;
        levels.set_level(level)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandRouter, TopicBinding};
    use crate::logging::detached_level_control;
    use tracker_shared::Qos;

    const TOPIC: &str = "/3512/AppControl";

    fn router(dwell: &DwellInterval, levels: LevelControl) -> CommandRouter {
        let router = CommandRouter::new();
        router.register(TopicBinding::new(
            TOPIC,
            Qos::AtMostOnce,
            app_control_commands(dwell.clone(), levels),
        ));
        router
    }

    #[test]
    fn test_set_dwell_time_accepts_in_range() {
        let (_layer, levels) = detached_level_control();
        let dwell = DwellInterval::new(Duration::from_millis(30000));
        let router = router(&dwell, levels);

        router.route(TOPIC, "SET_DWELL_TIME 45000").unwrap();
        assert_eq!(dwell.get(), Duration::from_millis(45000));
    }

    #[test]
    fn test_set_dwell_time_rejects_below_minimum() {
        let (_layer, levels) = detached_level_control();
        let dwell = DwellInterval::new(Duration::from_millis(30000));
        let router = router(&dwell, levels);

        let err = router.route(TOPIC, "SET_DWELL_TIME 1").unwrap_err();
        assert!(matches!(err, FrameworkError::Validation(_)));
        assert_eq!(dwell.get(), Duration::from_millis(30000));
    }

    #[test]
    fn test_set_dwell_time_without_value_uses_default() {
        let (_layer, levels) = detached_level_control();
        let dwell = DwellInterval::new(Duration::from_millis(10000));
        let router = router(&dwell, levels);

        router.route(TOPIC, "SET_DWELL_TIME").unwrap();
        assert_eq!(dwell.get(), Duration::from_millis(30000));
    }

    #[test]
    fn test_set_log_level() {
        let (_layer, levels) = detached_level_control();
        let dwell = DwellInterval::new(Duration::from_millis(30000));
        let router = router(&dwell, levels.clone());

        router.route(TOPIC, "SET_LOG_LEVEL 3").unwrap();
        assert_eq!(levels.level(), LogLevel::Warn);

        let err = router.route(TOPIC, "SET_LOG_LEVEL 9").unwrap_err();
        assert!(matches!(err, FrameworkError::Validation(_)));
        assert!(router.route(TOPIC, "SET_LOG_LEVEL -1").is_err());
        assert_eq!(levels.level(), LogLevel::Warn);
    }

    #[test]
    fn test_set_log_level_without_value_uses_info() {
        let (_layer, levels) = detached_level_control();
        let dwell = DwellInterval::new(Duration::from_millis(30000));
        let router = router(&dwell, levels.clone());

        router.route(TOPIC, "SET_LOG_LEVEL 1").unwrap();
        router.route(TOPIC, "SET_LOG_LEVEL").unwrap();
        assert_eq!(levels.level(), LogLevel::Info);

        router.route(TOPIC, "SET_LOG_LEVEL 4").unwrap();
        router.route(TOPIC, "SET_LOG_LEVEL abc").unwrap();
        assert_eq!(levels.level(), LogLevel::Info);
    }
}
