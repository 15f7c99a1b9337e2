pub mod app;
pub mod audio;
pub mod browser;
pub mod config;
pub mod error;
pub mod logging;
pub mod queue;
pub mod ui;
