//! Hardware configuration of the accelerator.
//!
//! A [`Config`] is loaded once (usually from a toml file) and then only read.
use std::fs;

use eyre::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

pub use crate::satacc::{
    dram::{DramPreset, DramType},
    CacheConfig,
};

/// The type for the watcher sending to the clase
#[repr(C)]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum WatcherToClauseType {
    /// - in this case, the watcher send clause to it's own clause unit
    /// - no interconnect hop is needed
    Streight,
    /// - in this case, the watcher send clause to dedicate clause unit
    /// - the clause task travels through the watcher to clause interconnect
    Icnt,
}

#[repr(C)]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum IcntType {
    Mesh,
    Ring,
    Ideal,
}

/// how the shared l3 cache serves a miss
#[repr(C)]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    /// every miss costs `miss_latency`
    Simple,
    /// misses go to the dram model of `dram_preset`
    Dram,
}

#[repr(C)]
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// a round returns as soon as the trail dispatched it
    NoGapBtweenRounds,
    /// a round returns only when the whole pipeline is idle
    RealRoundGap,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub ideal_memory: bool,
    pub ideal_l3cache: bool,
    pub multi_port: usize,
    pub l3_cache_type: CacheType,
    pub dram_type: DramType,
    pub dram_preset: DramPreset,
    pub l1_hit_latency: usize,
    pub l3_hit_latency: usize,
    pub miss_latency: usize,
    pub private_cache_config: CacheConfig,
    pub l3_cache_config: CacheConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// capacity of the writer buffer
    pub num_writer_entry: usize,
    /// the most entries retired in one cycle
    pub num_writer_merge: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// keep the submission order of the watcher lists instead of sorting them by watcher id
    pub seq: bool,
    /// only one watcher operation is in flight at any time
    pub single_watcher: bool,
    pub init_running_mode: RunMode,
}

/// the config for satacc
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    pub watcher_to_clause_type: WatcherToClauseType,
    pub n_watchers: usize,
    /// clause units of each watcher
    pub n_clauses: usize,
    /// l3 banks and dram channels
    pub mems: usize,
    pub channel_size: usize,
    pub icnt: IcntType,
    pub watcher_to_clause_icnt: IcntType,
    pub watcher_to_writer_icnt: IcntType,
    pub memory: MemoryConfig,
    pub writer: WriterConfig,
    pub scheduling: SchedulingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            watcher_to_clause_type: WatcherToClauseType::Streight,
            n_watchers: 16,
            n_clauses: 1,
            mems: 8,
            channel_size: 16,
            icnt: IcntType::Mesh,
            watcher_to_clause_icnt: IcntType::Mesh,
            watcher_to_writer_icnt: IcntType::Mesh,
            memory: MemoryConfig {
                ideal_memory: false,
                ideal_l3cache: false,
                multi_port: 2,
                l3_cache_type: CacheType::Simple,
                dram_type: DramType::DDR,
                dram_preset: DramPreset::DDR4,
                l1_hit_latency: 1,
                l3_hit_latency: 15,
                miss_latency: 120,
                private_cache_config: CacheConfig {
                    sets: 64,
                    associativity: 4,
                    block_size: 64,
                    channels: 1,
                    alway_hit: false,
                },
                l3_cache_config: CacheConfig {
                    sets: 1024,
                    associativity: 16,
                    block_size: 64,
                    channels: 8,
                    alway_hit: false,
                },
            },
            writer: WriterConfig {
                num_writer_entry: 64,
                num_writer_merge: 8,
            },
            scheduling: SchedulingConfig {
                seq: false,
                single_watcher: false,
                init_running_mode: RunMode::NoGapBtweenRounds,
            },
        }
    }
}

fn check_cache_config(name: &str, config: &CacheConfig) -> Result<()> {
    ensure!(
        config.sets.is_power_of_two(),
        "{name}: sets must be a power of two, got {}",
        config.sets
    );
    ensure!(
        config.block_size.is_power_of_two(),
        "{name}: block_size must be a power of two, got {}",
        config.block_size
    );
    ensure!(config.associativity > 0, "{name}: associativity must not be zero");
    ensure!(config.channels > 0, "{name}: channels must not be zero");
    Ok(())
}

impl Config {
    pub fn from_config_file(config_file: &str) -> Result<Config> {
        let config_file = fs::read_to_string(config_file)
            .wrap_err_with(|| format!("cannot read config file {config_file}"))?;
        Self::from_toml_str(&config_file)
    }

    pub fn from_toml_str(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content).wrap_err("cannot deserialize to Config")?;
        config.validate().wrap_err("invalid config")?;
        Ok(config)
    }

    /// reject configurations no hardware could be built from
    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_watchers > 0, "n_watchers must not be zero");
        ensure!(self.n_clauses > 0, "n_clauses must not be zero");
        ensure!(self.mems > 0, "mems must not be zero");
        ensure!(self.channel_size > 0, "channel_size must not be zero");
        ensure!(
            self.memory.multi_port > 0,
            "multi_port must not be zero"
        );
        ensure!(
            self.writer.num_writer_entry > 0,
            "num_writer_entry must not be zero"
        );
        ensure!(
            self.writer.num_writer_merge > 0,
            "num_writer_merge must not be zero"
        );
        check_cache_config("private_cache_config", &self.memory.private_cache_config)?;
        check_cache_config("l3_cache_config", &self.memory.l3_cache_config)?;
        ensure!(
            self.memory.l3_hit_latency <= self.memory.miss_latency,
            "l3_hit_latency ({}) is larger than miss_latency ({})",
            self.memory.l3_hit_latency,
            self.memory.miss_latency
        );
        ensure!(
            self.memory.dram_preset.family() == self.memory.dram_type,
            "dram_preset {:?} is not a {:?} device",
            self.memory.dram_preset,
            self.memory.dram_type
        );
        Ok(())
    }

    pub fn show_config(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(content) => println!("{content}"),
            Err(e) => tracing::error!("cannot serialize config: {e}"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    const CONFIG: &str = r#"
watcher_to_clause_type = "Icnt"
n_watchers = 4
n_clauses = 2
mems = 2
channel_size = 8
icnt = "Ring"
watcher_to_clause_icnt = "Mesh"
watcher_to_writer_icnt = "Ideal"

[memory]
ideal_memory = false
ideal_l3cache = false
multi_port = 1
l3_cache_type = "Dram"
dram_type = "HBM"
dram_preset = "HBM"
l1_hit_latency = 1
l3_hit_latency = 10
miss_latency = 100

[memory.private_cache_config]
sets = 16
associativity = 2
block_size = 64
channels = 1
alway_hit = false

[memory.l3_cache_config]
sets = 256
associativity = 8
block_size = 64
channels = 2
alway_hit = false

[writer]
num_writer_entry = 4
num_writer_merge = 2

[scheduling]
seq = true
single_watcher = false
init_running_mode = "RealRoundGap"
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.watcher_to_clause_type, WatcherToClauseType::Icnt);
        assert_eq!(config.icnt, IcntType::Ring);
        assert_eq!(config.memory.l3_cache_type, CacheType::Dram);
        assert_eq!(config.memory.dram_preset, DramPreset::HBM);
        assert_eq!(config.writer.num_writer_merge, 2);
        assert_eq!(config.scheduling.init_running_mode, RunMode::RealRoundGap);
    }

    #[test]
    fn test_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap();
        let config = Config::from_config_file(path).unwrap();
        assert_eq!(config.n_watchers, 4);
        assert!(Config::from_config_file("/no/such/config.toml").is_err());
    }

    #[test]
    fn test_missing_field() {
        let broken = CONFIG.replace("n_watchers = 4\n", "");
        let err = Config::from_toml_str(&broken).unwrap_err();
        assert!(format!("{err:?}").contains("n_watchers"));
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.n_clauses = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.memory.l3_cache_config.sets = 100;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.memory.l3_hit_latency = 200;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.memory.dram_preset = DramPreset::HBM;
        assert!(config.validate().is_err());
        config.memory.dram_type = DramType::HBM;
        assert!(config.validate().is_ok());

        let broken = CONFIG.replace("dram_type = \"HBM\"", "dram_type = \"DDR\"");
        assert!(Config::from_toml_str(&broken).is_err());
    }
}
