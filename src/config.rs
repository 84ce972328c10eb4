pub use config::Config;
pub use once_cell::sync::OnceCell;
use std::error::Error;
use std::time::Duration;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

pub fn init_global_config() -> Result<(), Box<dyn Error>> {
    let config = Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(config::Environment::with_prefix("SYNCER").separator("__"))
        .build()?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| "Config already set")?;
    Ok(())
}

pub fn get_global_config() -> &'static Config {
    GLOBAL_CONFIG.get().unwrap_or_else(|| {
        eprintln!("FATAL: Config not initialized - call init_global_config() first");
        std::process::exit(1);
    })
}

/// Load config for standalone binaries/utilities
pub fn load_config() -> Result<Config, Box<dyn Error>> {
    Config::builder()
        .add_source(config::File::with_name("config.toml").required(false))
        .add_source(config::Environment::with_prefix("SYNCER").separator("__"))
        .build()
        .map_err(|e| Box::new(e) as Box<dyn Error>)
}

/// Sync engine tunables.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Per-tick batch cap (`MAX_BATCH`).
    pub max_epochs: u64,
    /// Fetcher-level batching hint, passed through to the Chain Fetcher.
    pub use_batch: bool,
    /// Capacity of the subscription -> engine channel.
    pub sub_buffer: usize,
    pub interval_normal: Duration,
    pub interval_catchup: Duration,
    pub decay_threshold: u64,
    pub pivot_ring_capacity: usize,
    pub rpc_bind: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            use_batch: true,
            sub_buffer: 1000,
            interval_normal: Duration::from_secs(1),
            interval_catchup: Duration::from_millis(1),
            decay_threshold: 20_000,
            pivot_ring_capacity: 1000,
            rpc_bind: "127.0.0.1:3206".to_string(),
        }
    }
}

impl SyncSettings {
    /// Build settings from the global config, falling back to defaults for
    /// any key that is absent.
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            max_epochs: config
                .get_int("sync.max_epochs")
                .map(|v| v as u64)
                .unwrap_or(defaults.max_epochs),
            use_batch: config.get_bool("sync.use_batch").unwrap_or(defaults.use_batch),
            sub_buffer: config
                .get_int("sync.sub_buffer")
                .map(|v| v as usize)
                .unwrap_or(defaults.sub_buffer),
            interval_normal: config
                .get_int("sync.interval_normal_ms")
                .map(|v| Duration::from_millis(v as u64))
                .unwrap_or(defaults.interval_normal),
            interval_catchup: config
                .get_int("sync.interval_catchup_ms")
                .map(|v| Duration::from_millis(v as u64))
                .unwrap_or(defaults.interval_catchup),
            decay_threshold: config
                .get_int("sync.decay_threshold")
                .map(|v| v as u64)
                .unwrap_or(defaults.decay_threshold),
            pivot_ring_capacity: config
                .get_int("sync.pivot_ring_capacity")
                .map(|v| v as usize)
                .unwrap_or(defaults.pivot_ring_capacity),
            rpc_bind: config
                .get_string("rpc.bind")
                .unwrap_or(defaults.rpc_bind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_spec_constants() {
        let s = SyncSettings::default();
        assert_eq!(s.decay_threshold, 20_000);
        assert_eq!(s.interval_normal, Duration::from_secs(1));
        assert_eq!(s.interval_catchup, Duration::from_millis(1));
        assert_eq!(s.pivot_ring_capacity, 1000);
    }
}
