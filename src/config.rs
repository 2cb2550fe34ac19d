use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

use crate::auth::tokens::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Scylla,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "scylla" => Ok(StoreBackend::Scylla),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub workers: usize,
    pub store: StoreBackend,
    pub scylla_node: String,
    pub keyspace: String,
    pub token_ttl: Duration,
    pub sweep_interval: Duration,
    pub bcrypt_cost: u32,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            workers: num_cpus::get(),
            store: StoreBackend::Memory,
            scylla_node: "127.0.0.1:9042".to_string(),
            keyspace: "chirp".to_string(),
            token_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    /// Reads `CHIRP_*` variables; anything missing or unparseable keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let secs = |key: &str| parsed::<u64>(&lookup, key).map(Duration::from_secs);

        Self {
            bind_addr: lookup("CHIRP_BIND").unwrap_or(defaults.bind_addr),
            workers: parsed::<usize>(&lookup, "CHIRP_WORKERS")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.workers),
            store: parsed(&lookup, "CHIRP_STORE").unwrap_or(defaults.store),
            scylla_node: lookup("CHIRP_SCYLLA_NODE").unwrap_or(defaults.scylla_node),
            keyspace: lookup("CHIRP_KEYSPACE").unwrap_or(defaults.keyspace),
            token_ttl: secs("CHIRP_TOKEN_TTL_SECS").unwrap_or(defaults.token_ttl),
            sweep_interval: secs("CHIRP_SWEEP_INTERVAL_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.sweep_interval),
            bcrypt_cost: parsed(&lookup, "CHIRP_BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
            log_level: parsed(&lookup, "CHIRP_LOG").unwrap_or(defaults.log_level),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
