//! `agentgate config`: show the configuration the server would run with.

use crate::server::load_config;
use anyhow::{Context, Result};
use std::path::Path;

pub fn run(explicit: Option<&Path>) -> Result<()> {
    let config = load_config(explicit).context("Failed to load configuration")?;
    print!("{}", config.to_toml()?);
    Ok(())
}
