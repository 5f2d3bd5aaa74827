//! Configuration for the tracker node
//!
//! This module handles:
//! - Loading and saving the flat key-value configuration file
//! - Building typed node settings with defaults

mod app;
mod store;

pub use app::{config_path, AppConfig, CONFIG_ENV};
pub use store::ConfigStore;
