pub mod app;
pub mod autosave;
pub mod cli;
pub mod config;
pub mod export;
pub mod markdown;
pub mod notes;
pub mod scratch;
pub mod storage;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
