//! Server module for Agentgate
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `init_stores`: State backend selection
//! - `init`: Router assembly and the run loop

pub mod config;
mod init;
mod init_stores;
mod loader;

pub use init::run;
pub use loader::load_config;
