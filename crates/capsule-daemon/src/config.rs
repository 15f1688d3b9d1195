use std::path::PathBuf;

use anyhow::{Result, anyhow};

pub const DEFAULT_DB_PATH: &str = "capsules.db";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = lookup("CAPSULE_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.into())
            .into();

        let sweep_interval_secs = match lookup("CAPSULE_SWEEP_INTERVAL_SECS") {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow!("CAPSULE_SWEEP_INTERVAL_SECS={:?}: {}", raw, e))?,
            None => DEFAULT_SWEEP_INTERVAL_SECS,
        };
        if sweep_interval_secs == 0 {
            return Err(anyhow!("CAPSULE_SWEEP_INTERVAL_SECS must be greater than zero"));
        }

        Ok(Self {
            db_path,
            sweep_interval_secs,
        })
    }
}
