#![forbid(unsafe_code)]

pub mod agent;
pub mod classify;
pub mod config;
pub mod errors;
pub mod executor;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod settings;
pub mod surface;
pub mod tracker;
pub mod ui;
pub mod workspace;

pub use config::AppConfig;
pub use errors::{AppError, Result};
