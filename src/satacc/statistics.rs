use serde::{Deserialize, Serialize};

use crate::config::Config;

use super::{cache::CacheId, satacc_minisat_task::SingleRoundTask};

/// latency samples, `min` and `max` are 0 until the first sample
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct LatencyStat {
    pub count: usize,
    pub total: usize,
    pub min: usize,
    pub max: usize,
}
impl LatencyStat {
    pub fn add(&mut self, latency: usize) {
        if self.count == 0 {
            self.min = latency;
            self.max = latency;
        } else {
            self.min = self.min.min(latency);
            self.max = self.max.max(latency);
        }
        self.count += 1;
        self.total += latency;
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct CacheStatistics {
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// hits charged the hit latency, misses the miss latency. under the dram backed l3
    /// a miss is charged the lookup plus the dram service time
    pub charged_cycles: usize,
    /// from the lookup to the data being ready
    pub latency: LatencyStat,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct WatcherIdleStat {
    pub idle_no_task: usize,
    pub idle_wating_l1: usize,
    pub idle_wating_l3: usize,
    pub idle_send_l1: usize,
    pub idle_send_l3: usize,
    pub idle_send_clause: usize,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct WatcherStatistics {
    pub total_assignments: usize,
    pub total_watchers: usize,
    pub total_clauses_sent: usize,
    pub idle_cycle: usize,
    pub busy_cycle: usize,
    pub idle_stat: WatcherIdleStat,
}
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ClauseIdleStat {
    pub idle_no_task: usize,
    pub idle_wating_l1: usize,
    pub idle_wating_l3: usize,
    pub idle_send_l1: usize,
    pub idle_send_l3: usize,
    pub idle_send_writer: usize,
}
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct SingleClauseStatistics {
    pub total_clause_received: usize,
    pub total_value_read: usize,
    pub total_write_back: usize,
    pub idle_cycle: usize,
    pub busy_cycle: usize,
    pub idle_stat: ClauseIdleStat,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ClauseStatistics {
    pub single_clause: Vec<SingleClauseStatistics>,
}
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AverageStat {
    pub count: usize,
    pub total: usize,
}
impl AverageStat {
    pub fn add(&mut self, value: usize) {
        self.count += 1;
        self.total += value;
    }
    pub fn get_average(&self) -> f64 {
        if self.count == 0 {
            return 0.;
        }
        self.total as f64 / self.count as f64
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct IcntStat {
    pub total_messages: usize,
    pub total_hops: usize,
    pub average_latency: AverageStat,
    pub idle_cycle: usize,
    pub busy_cycle: usize,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct IcntStatistics {
    pub mem: IcntStat,
    pub watcher_to_clause: IcntStat,
    pub watcher_to_writer: IcntStat,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct DramStatistics {
    pub total_requests: usize,
    pub reads: usize,
    pub writes: usize,
    pub row_hits: usize,
    /// the bank had no open row
    pub row_misses: usize,
    pub row_conflicts: usize,
    pub total_dram_cycles: usize,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct WriterStatistics {
    pub admitted: usize,
    pub retired: usize,
    pub writes_issued: usize,
    /// entries folded into a write of another entry
    pub merged: usize,
    /// cycles a request waited because the buffer was full
    pub blocked_cycles: usize,
    pub acks: usize,
    pub max_occupancy: usize,
    pub max_retired_per_step: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Statistics {
    pub total_cycle: usize,
    pub total_rounds: usize,
    /// cycles from a round entering the trail to the simulator returning
    pub round_cycles: AverageStat,
    pub average_assignments: AverageStat,
    pub average_watchers: AverageStat,
    pub average_clauses: AverageStat,
    pub watcher_statistics: Vec<WatcherStatistics>,
    pub clause_statistics: Vec<ClauseStatistics>,
    pub private_cache_statistics: Vec<CacheStatistics>,
    pub l3_cache_statistics: CacheStatistics,
    pub icnt_statistics: IcntStatistics,
    pub dram_statistics: DramStatistics,
    pub writer_statistics: WriterStatistics,
    /// peak number of blocker or clause operations in flight at once
    pub max_in_flight_ops: usize,
    pub config: Config,
}
impl Default for Statistics {
    fn default() -> Self {
        Statistics::new(&Config::default())
    }
}
impl Statistics {
    pub fn new(config: &Config) -> Self {
        let n_watchers = config.n_watchers;
        let n_clauses = config.n_clauses;

        Self {
            config: config.clone(),
            watcher_statistics: vec![WatcherStatistics::default(); n_watchers],
            clause_statistics: vec![
                ClauseStatistics {
                    single_clause: vec![SingleClauseStatistics::default(); n_clauses],
                };
                n_watchers
            ],
            private_cache_statistics: vec![CacheStatistics::default(); n_watchers],
            l3_cache_statistics: Default::default(),
            total_cycle: 0,
            total_rounds: 0,
            round_cycles: Default::default(),
            average_assignments: Default::default(),
            average_watchers: Default::default(),
            average_clauses: Default::default(),
            icnt_statistics: Default::default(),
            dram_statistics: Default::default(),
            writer_statistics: Default::default(),
            max_in_flight_ops: 0,
        }
    }

    fn cache_mut(&mut self, cache_id: CacheId) -> &mut CacheStatistics {
        match cache_id {
            CacheId::PrivateCache(cache_id) => &mut self.private_cache_statistics[cache_id],
            CacheId::L3Cache => &mut self.l3_cache_statistics,
        }
    }

    /// count a lookup and charge its nominal cost
    pub fn record_access(&mut self, cache_id: CacheId, hit: bool, charge: usize) {
        let stat = self.cache_mut(cache_id);
        if hit {
            stat.cache_hits += 1;
        } else {
            stat.cache_misses += 1;
        }
        stat.charged_cycles += charge;
    }

    /// add cycles known only after the lookup, such as the dram service time
    pub fn record_charge(&mut self, cache_id: CacheId, cycles: usize) {
        self.cache_mut(cache_id).charged_cycles += cycles;
    }

    pub fn record_latency(&mut self, cache_id: CacheId, latency: usize) {
        self.cache_mut(cache_id).latency.add(latency);
    }

    /// update each round's statistics
    pub fn update_single_round_task(&mut self, single_round_task: &SingleRoundTask) {
        let single_round_stats = single_round_task.get_statistics();
        self.total_rounds += 1;
        self.average_assignments
            .add(single_round_stats.total_assignments);
        self.average_watchers.add(single_round_stats.total_watchers);
        self.average_clauses.add(single_round_stats.total_clauses);
    }
}
