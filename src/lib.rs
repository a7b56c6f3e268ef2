#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod control;
pub mod errors;
pub mod models;
pub mod process;
pub mod session;
pub mod wire;

pub use config::AgentConfig;
pub use errors::{AppError, Result};
