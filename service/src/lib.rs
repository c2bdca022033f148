//! Process-level infrastructure: command line/environment configuration and logging.

pub mod config;
pub mod logging;
