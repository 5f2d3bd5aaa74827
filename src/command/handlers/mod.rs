//! Command handlers bound to control topics

pub mod activity;
pub mod app;

pub use activity::{apply_start_dwell, start_task, stop_task, trigger};
pub use app::{app_control_commands, set_dwell_time, set_log_level};
