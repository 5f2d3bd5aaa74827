//! Status indicator activity

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracker_shared::FrameworkResult;

use crate::context::AppContext;
use crate::providers::{pattern_for, StatusIndicator};
use crate::tasks::{dwell_with_tick, Activity, ActivityScope, DwellOutcome, InitContext};

const LED_TICK: Duration = Duration::from_millis(100);

/// Mirrors the application status on the indicator once per tick
pub struct LedActivity {
    ctx: Arc<AppContext>,
    indicator: Arc<dyn StatusIndicator>,
}

impl LedActivity {
    pub fn new(ctx: Arc<AppContext>, indicator: Arc<dyn StatusIndicator>) -> Self {
        Self { ctx, indicator }
    }
}

#[async_trait]
impl Activity for LedActivity {
    async fn init(&self, _ctx: &InitContext) -> FrameworkResult {
        self.indicator.set_pattern(pattern_for(self.ctx.status()));
        Ok(())
    }

    async fn run(&self, scope: &mut ActivityScope) {
        let mut last = None;

        loop {
            let pattern = pattern_for(self.ctx.status());
            if last != Some(pattern) {
                self.indicator.set_pattern(pattern);
                last = Some(pattern);
            }

            if dwell_with_tick(&scope.dwell, LED_TICK, || scope.is_running()).await
                == DwellOutcome::Interrupted
            {
                break;
            }
        }
    }
}
