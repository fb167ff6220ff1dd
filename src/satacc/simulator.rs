use std::{fs::File, path::Path};

use eyre::{eyre, Context};

use crate::{
    config::{CacheType, Config, RunMode},
    satacc::{
        cache::{CacheWithDram, CacheWithFixTime, DramBankConfig},
        icnt::{IcntId, IcntMsgWrapper, SimpleIcnt},
        satacc_minisat_task::{ClauseTask, RoundOutcome, RoundSource, SingleRoundTask},
        trail::Trail,
        watcher_interface::{WatcherInterface, WatcherInterfacePorts},
        writer::Writer,
        MemLayout, MemReq, SataccStatus, Statistics, WriteBackReq,
    },
    satstat::SatStat,
    sim::{ChannelBuilder, SimComponent, SimRunner, SimSender},
};

type L3Bank = Box<dyn SimComponent<SharedStatus = SataccStatus>>;

pub struct TrailAndOthers {
    trail: Trail,
    others: (
        Vec<WatcherInterface>,
        SimpleIcnt<IcntMsgWrapper<MemReq>>,
        SimpleIcnt<IcntMsgWrapper<ClauseTask>>,
        SimpleIcnt<IcntMsgWrapper<WriteBackReq>>,
        Vec<L3Bank>,
        Writer,
    ),
    channel_builder: ChannelBuilder,
    current_running_mode: RunMode,
}

impl SimComponent for TrailAndOthers {
    type SharedStatus = SataccStatus;

    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let (trail_busy, trail_updated) = self.trail.update(shared_status, current_cycle);
        let (others_busy, others_updated) = self.others.update(shared_status, current_cycle);
        let updated = trail_updated || others_updated;
        match self.current_running_mode {
            RunMode::NoGapBtweenRounds => (trail_busy, updated),
            RunMode::RealRoundGap => (
                trail_busy || others_busy || self.channel_builder.get_current_queue_size() > 0,
                updated,
            ),
        }
    }
}

/// what one call of [`Simulator::run_one_round`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub round_index: usize,
    pub start_cycle: usize,
    pub end_cycle: usize,
    pub outcome: Option<RoundOutcome>,
}

/// everything left after [`Simulator::finish`]
#[derive(Debug)]
pub struct FinishedSimulation {
    pub statistics: Statistics,
    pub sat_stat: SatStat,
    pub total_cycle: usize,
}

impl FinishedSimulation {
    /// write the hardware statistics, the solver statistics and the cycle count as json
    pub fn save(
        &self,
        statistics_path: impl AsRef<Path>,
        sat_stat_path: impl AsRef<Path>,
        cycle_path: impl AsRef<Path>,
    ) -> eyre::Result<()> {
        let statistics_path = statistics_path.as_ref();
        let file = File::create(statistics_path)
            .wrap_err_with(|| format!("cannot create {}", statistics_path.display()))?;
        serde_json::to_writer_pretty(file, &self.statistics)
            .wrap_err("cannot write the statistics")?;
        self.sat_stat.save_data(sat_stat_path)?;
        let cycle_path = cycle_path.as_ref();
        let file = File::create(cycle_path)
            .wrap_err_with(|| format!("cannot create {}", cycle_path.display()))?;
        serde_json::to_writer_pretty(file, &self.total_cycle)
            .wrap_err("cannot write the cycle count")?;
        Ok(())
    }
}

/// # Simulator
/// the whole accelerator, alive across rounds
/// - caches, icnt queues and the writer buffer keep their state from one round to the next
/// - rounds come from any [`RoundSource`]
pub struct Simulator {
    config: Config,
    task_sender: SimSender<SingleRoundTask>,
    sim_runner: SimRunner<TrailAndOthers, SataccStatus>,
    sat_stat: SatStat,
    total_rounds: usize,
}

impl Simulator {
    /// validate the config and build all hardware
    pub fn new(config: Config) -> eyre::Result<Self> {
        config
            .validate()
            .wrap_err("cannot build the simulator")?;
        let (task_sender, comp) = Self::build(&config);
        let shared_status = SataccStatus::new(&config);
        Ok(Simulator {
            config,
            task_sender,
            sim_runner: SimRunner::new(comp, shared_status),
            sat_stat: SatStat::new(),
            total_rounds: 0,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn statistics(&self) -> &Statistics {
        &self.sim_runner.get_shared_status().statistics
    }

    pub fn sat_stat(&self) -> &SatStat {
        &self.sat_stat
    }

    pub fn current_cycle(&self) -> usize {
        self.sim_runner.get_current_cycle()
    }

    pub fn total_rounds(&self) -> usize {
        self.total_rounds
    }

    /// run the next round of `source`, `None` when it has no round left
    pub fn run_one_round(
        &mut self,
        source: &mut impl RoundSource,
    ) -> eyre::Result<Option<RoundReport>> {
        let Some(round) = source.next_round() else {
            return Ok(None);
        };
        for watcher_task in round.assignments.iter() {
            let total_clauses = watcher_task.single_watcher_tasks.len();
            let clauses_read = watcher_task
                .single_watcher_tasks
                .iter()
                .filter(|clause_task| clause_task.have_to_read_clause())
                .count();
            self.sat_stat
                .record_watcher_added(total_clauses, clauses_read);
        }
        let outcome = round.outcome;
        let start_cycle = self.sim_runner.get_current_cycle();
        self.task_sender
            .send(round)
            .map_err(|_| eyre!("the trail still holds a round"))?;
        self.sim_runner
            .run()
            .wrap_err_with(|| format!("round {} failed", self.total_rounds))?;
        let end_cycle = self.sim_runner.get_current_cycle();

        if let Some(outcome) = outcome {
            self.sat_stat
                .record_decision(outcome == RoundOutcome::Conflict);
        }
        self.sim_runner
            .get_shared_status_mut()
            .statistics
            .round_cycles
            .add(end_cycle - start_cycle);
        let report = RoundReport {
            round_index: self.total_rounds,
            start_cycle,
            end_cycle,
            outcome,
        };
        self.total_rounds += 1;
        if self.total_rounds % 1000 == 0 {
            tracing::info!(
                "total rounds: {}, cycle: {end_cycle}",
                self.total_rounds
            );
        }
        Ok(Some(report))
    }

    /// run every round of `source`, the source is released afterwards
    pub fn run_full(&mut self, mut source: impl RoundSource) -> eyre::Result<()> {
        while self.run_one_round(&mut source)?.is_some() {}
        Ok(())
    }

    /// drain the pipeline and hand out the final statistics
    pub fn finish(mut self) -> eyre::Result<FinishedSimulation> {
        self.sim_runner.get_sim_mut().current_running_mode = RunMode::RealRoundGap;
        self.sim_runner
            .run()
            .wrap_err("cannot drain the simulator")?;
        let (_, mut status, total_cycle) = self.sim_runner.into_inner();
        status.statistics.total_cycle = total_cycle;
        tracing::info!(
            "simulator finished! total rounds: {}, total cycles: {total_cycle}",
            self.total_rounds
        );
        Ok(FinishedSimulation {
            statistics: status.statistics,
            sat_stat: self.sat_stat,
            total_cycle,
        })
    }

    fn build(config: &Config) -> (SimSender<SingleRoundTask>, TrailAndOthers) {
        let init_running_mode = config.scheduling.init_running_mode;
        tracing::info!("build simulator with mode: {init_running_mode:?}");
        let channel_builder = ChannelBuilder::new();
        let layout = MemLayout::new(config);
        let n_watchers = config.n_watchers;
        let channel_size = config.channel_size;

        // build the trail
        let (trail_senders, trail_receivers) =
            channel_builder.sim_channel_array(channel_size, n_watchers);
        let (task_sender, task_receiver) = channel_builder.sim_channel(channel_size);
        let trail = Trail::new(
            trail_senders,
            task_receiver,
            n_watchers,
            config.scheduling.seq,
            config.scheduling.single_watcher,
        );

        // build the icnt from pe to cache
        let (mem_icnt, mem_base_ports) = SimpleIcnt::<IcntMsgWrapper<MemReq>>::new_with_config(
            layout.total_ports(),
            channel_size,
            config.icnt,
            IcntId::Mem,
            &channel_builder,
        );
        let (clause_icnt, clause_base_ports) =
            SimpleIcnt::<IcntMsgWrapper<ClauseTask>>::new_with_config(
                n_watchers,
                channel_size,
                config.watcher_to_clause_icnt,
                IcntId::WatcherToClause,
                &channel_builder,
            );
        let (writer_icnt, mut writer_base_ports) =
            SimpleIcnt::<IcntMsgWrapper<WriteBackReq>>::new_with_config(
                n_watchers + 1,
                channel_size,
                config.watcher_to_writer_icnt,
                IcntId::WatcherToWriter,
                &channel_builder,
            );

        // build watchers and clauses
        let writer_port = writer_base_ports.pop();
        let watchers_interface = clause_base_ports
            .into_iter()
            .zip(trail_receivers)
            .zip(mem_base_ports.iter().take(n_watchers))
            .zip(writer_base_ports)
            .enumerate()
            .map(
                |(watcher_pe_id, (((clause_icnt, watcher_task_in), mem_icnt), writer_icnt))| {
                    WatcherInterface::new(
                        WatcherInterfacePorts {
                            mem_icnt: mem_icnt.clone(),
                            clause_icnt,
                            writer_sender: writer_icnt.out_port,
                            watcher_task_in,
                        },
                        &channel_builder,
                        config,
                        watcher_pe_id,
                    )
                },
            )
            .collect::<Vec<_>>();

        // build the l3 banks
        let memory = &config.memory;
        let mut l3_cache_config = memory.l3_cache_config.clone();
        l3_cache_config.alway_hit |= memory.ideal_l3cache;
        let accept_per_cycle = if memory.ideal_l3cache {
            None
        } else {
            Some(memory.multi_port)
        };
        let l3_banks = (0..config.mems)
            .map(|mem_id| {
                let port = mem_base_ports[layout.bank_port(mem_id)].clone();
                let bank: L3Bank = match memory.l3_cache_type {
                    CacheType::Simple => Box::new(CacheWithFixTime::new(
                        &l3_cache_config,
                        port,
                        memory.l3_hit_latency,
                        memory.miss_latency,
                        accept_per_cycle,
                        memory.ideal_memory,
                    )),
                    CacheType::Dram => Box::new(CacheWithDram::new(
                        &l3_cache_config,
                        port,
                        memory.l3_hit_latency,
                        accept_per_cycle,
                        memory.ideal_memory,
                        DramBankConfig {
                            preset: memory.dram_preset,
                            banks: config.mems,
                            multi_port: memory.multi_port,
                            queue_size: channel_size,
                        },
                    )),
                };
                bank
            })
            .collect::<Vec<_>>();

        // the writer sits on the last node of both the memory and the writer icnt
        let writer_req_in = match writer_port {
            Some(port) => port.in_port,
            None => channel_builder.sim_channel(channel_size).1,
        };
        let writer = Writer::new(
            writer_req_in,
            mem_base_ports[layout.writer_port()].clone(),
            &config.writer,
            layout,
        );

        let simulator = TrailAndOthers {
            trail,
            others: (
                watchers_interface,
                mem_icnt,
                clause_icnt,
                writer_icnt,
                l3_banks,
                writer,
            ),
            channel_builder,
            current_running_mode: init_running_mode,
        };
        (task_sender, simulator)
    }
}

/// build a fresh simulator, run the whole task on it and finish it
pub fn run_full_expr(
    mut config: Config,
    task: impl RoundSource,
) -> eyre::Result<FinishedSimulation> {
    config.scheduling.init_running_mode = RunMode::RealRoundGap;
    let mut simulator = Simulator::new(config)?;
    simulator.run_full(task)?;
    simulator.finish()
}

#[cfg(test)]
mod test {
    use crate::{
        config::{CacheType, Config, DramPreset, DramType, IcntType, WatcherToClauseType},
        satacc::SataccMinisatTask,
        test_utils,
    };

    use super::*;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.watcher_to_clause_type = WatcherToClauseType::Icnt;
        config.n_watchers = 4;
        config.n_clauses = 2;
        config.mems = 4;
        config.memory.multi_port = 1;
        config.memory.private_cache_config.sets = 16;
        config.memory.l3_cache_config.sets = 16;
        config.memory.l3_cache_config.channels = 4;
        config.writer.num_writer_entry = 2;
        config.writer.num_writer_merge = 2;
        config.scheduling.init_running_mode = RunMode::RealRoundGap;
        config
    }

    /// two rounds touching every kind of operation
    fn sample_task() -> SataccMinisatTask {
        let mut task = SataccMinisatTask::new();
        task.start_new_round().unwrap();
        task.add_watcher_task(0, 100, 1).unwrap();
        task.add_single_watcher_task(1000, 2000, 1, 20, 1).unwrap();
        task.add_single_watcher_clause_value_addr(3000, 1).unwrap();
        task.add_single_watcher_clause_value_addr(4000, 1).unwrap();
        task.add_single_watcher_task_no_clause(1064, 1).unwrap();
        task.add_watcher_task(64, 164, 6).unwrap();
        task.add_single_watcher_task(5000, 6000, 2, 10, 6).unwrap();
        task.end_round(true).unwrap();

        task.start_new_round().unwrap();
        task.add_watcher_task(128, 228, 3).unwrap();
        task.add_single_watcher_task(1000, 2000, 1, 20, 3).unwrap();
        task.add_single_watcher_clause_value_addr(3000, 1).unwrap();
        task.end_round(false).unwrap();
        task
    }

    fn total_cache_hits(stat: &Statistics) -> usize {
        stat.l3_cache_statistics.cache_hits
            + stat
                .private_cache_statistics
                .iter()
                .map(|cache| cache.cache_hits)
                .sum::<usize>()
    }

    #[test]
    fn test_simulator() {
        test_utils::init();
        let mut simulator = Simulator::new(small_config()).unwrap();
        let mut task = sample_task();
        let first = task.run_one_round(&mut simulator).unwrap().unwrap();
        assert_eq!(first.round_index, 0);
        assert_eq!(first.outcome, Some(RoundOutcome::Conflict));
        assert!(first.end_cycle > first.start_cycle);
        let hits_after_first = total_cache_hits(simulator.statistics());
        let second = task.run_one_round(&mut simulator).unwrap().unwrap();
        assert_eq!(second.round_index, 1);
        assert_eq!(second.start_cycle, first.end_cycle);
        assert!(task.run_one_round(&mut simulator).unwrap().is_none());
        // round two rereads lines round one left in the caches
        assert!(total_cache_hits(simulator.statistics()) > hits_after_first);

        let mut cold = Simulator::new(small_config()).unwrap();
        let mut cold_task = SataccMinisatTask::new();
        cold_task.start_new_round().unwrap();
        cold_task.add_watcher_task(128, 228, 3).unwrap();
        cold_task
            .add_single_watcher_task(1000, 2000, 1, 20, 3)
            .unwrap();
        cold_task
            .add_single_watcher_clause_value_addr(3000, 1)
            .unwrap();
        cold_task.end_round(false).unwrap();
        let cold_round = cold_task.run_one_round(&mut cold).unwrap().unwrap();
        assert!(
            second.end_cycle - second.start_cycle < cold_round.end_cycle - cold_round.start_cycle
        );

        let result = simulator.sat_stat().result();
        assert_eq!(result.total_decisions, 2);
        assert_eq!(result.total_conflicts, 1);
        assert_eq!(result.total_watchers, 3);
        assert_eq!(result.total_clauses, 4);
        assert_eq!(result.total_clauses_with_data, 3);

        let finished = simulator.finish().unwrap();
        let stat = &finished.statistics;
        assert_eq!(stat.total_rounds, 2);
        assert_eq!(stat.total_cycle, finished.total_cycle);
        // both clauses with values are written back
        let writer = &stat.writer_statistics;
        assert_eq!(writer.admitted, 2);
        assert_eq!(writer.retired, 2);
        assert_eq!(writer.acks, writer.writes_issued);
        assert!(writer.max_occupancy <= 2);
        assert!(writer.max_retired_per_step <= 2);
        let sent: usize = stat
            .watcher_statistics
            .iter()
            .map(|watcher| watcher.total_clauses_sent)
            .sum();
        assert_eq!(sent, 3);
        assert!(stat.icnt_statistics.watcher_to_clause.total_messages == 3);
    }

    #[test]
    fn test_decisions_add_up() {
        test_utils::init();
        let mut task = SataccMinisatTask::new();
        for round in 0..5 {
            task.start_new_round().unwrap();
            task.add_watcher_task(round * 64, round * 64 + 4096, round as usize)
                .unwrap();
            task.add_single_watcher_task_no_clause(round * 64 + 8192, round as usize)
                .unwrap();
            task.end_round(round % 2 == 0).unwrap();
        }
        // the last round stays open and records no decision
        task.start_new_round().unwrap();
        task.add_single_watcher_task_no_clause(0, 0).unwrap();

        let finished = run_full_expr(small_config(), task).unwrap();
        let result = finished.sat_stat.result();
        assert_eq!(result.total_decisions, 5);
        assert_eq!(result.total_conflicts, 3);
        assert_eq!(
            result.total_conflicts + result.total_no_conflicts,
            result.total_decisions
        );
        assert_eq!(finished.statistics.total_rounds, 6);
    }

    #[test]
    fn test_zero_rounds() {
        test_utils::init();
        let mut simulator = Simulator::new(small_config()).unwrap();
        let before = simulator.statistics().clone();
        simulator.run_full(SataccMinisatTask::new()).unwrap();
        assert_eq!(simulator.statistics(), &before);
        assert_eq!(simulator.current_cycle(), 0);
        assert_eq!(simulator.total_rounds(), 0);
    }

    #[test]
    fn test_ideal_memory_latency() {
        test_utils::init();
        let mut config = small_config();
        config.memory.ideal_memory = true;
        config.memory.ideal_l3cache = true;
        config.memory.l3_cache_type = CacheType::Dram;
        config.memory.dram_type = DramType::HBM;
        config.memory.dram_preset = DramPreset::HBM;
        let finished = run_full_expr(config.clone(), sample_task()).unwrap();
        let l3 = &finished.statistics.l3_cache_statistics;
        assert!(l3.latency.count > 0);
        assert_eq!(l3.cache_misses, 0);
        assert_eq!(l3.latency.min, config.memory.l3_hit_latency);
        assert_eq!(l3.latency.max, config.memory.l3_hit_latency);
        assert_eq!(finished.statistics.dram_statistics.total_dram_cycles, 0);
    }

    #[test]
    fn test_dram_backed_l3() {
        test_utils::init();
        let mut config = small_config();
        config.memory.l3_cache_type = CacheType::Dram;
        config.memory.dram_type = DramType::DDR;
        config.memory.dram_preset = DramPreset::DDR4;
        config.icnt = IcntType::Ring;
        let finished = run_full_expr(config, sample_task()).unwrap();
        let dram = &finished.statistics.dram_statistics;
        assert!(dram.total_requests > 0);
        assert!(dram.total_dram_cycles > 0);
        assert_eq!(
            dram.row_hits + dram.row_misses + dram.row_conflicts,
            dram.total_requests
        );
    }

    #[test]
    fn test_determinism() {
        test_utils::init();
        let first = run_full_expr(small_config(), sample_task()).unwrap();
        let second = run_full_expr(small_config(), sample_task()).unwrap();
        assert_eq!(first.statistics, second.statistics);
        assert_eq!(first.total_cycle, second.total_cycle);
        assert_eq!(first.sat_stat.result(), second.sat_stat.result());
    }

    #[test]
    fn test_direct_mode_no_clause_round() {
        test_utils::init();
        let mut config = Config::default();
        config.n_watchers = 2;
        config.n_clauses = 4;
        config.memory.ideal_memory = true;
        config.watcher_to_clause_type = WatcherToClauseType::Streight;
        let mut simulator = Simulator::new(config).unwrap();
        let mut task = SataccMinisatTask::new();
        task.start_new_round().unwrap();
        task.add_single_watcher_task_no_clause(64, 0).unwrap();
        task.add_single_watcher_task_no_clause(128, 2).unwrap();
        let report = task.run_one_round(&mut simulator).unwrap().unwrap();
        assert_eq!(report.outcome, None);
        assert_eq!(simulator.sat_stat().result().total_decisions, 0);
        assert_eq!(simulator.statistics().dram_statistics.total_dram_cycles, 0);
        let finished = simulator.finish().unwrap();
        assert_eq!(finished.statistics.writer_statistics.admitted, 0);
    }

    #[test]
    fn test_single_watcher_mode() {
        test_utils::init();
        let mut config = small_config();
        config.scheduling.single_watcher = true;
        let finished = run_full_expr(config, sample_task()).unwrap();
        assert_eq!(finished.statistics.total_rounds, 2);
        assert_eq!(finished.sat_stat.result().total_decisions, 2);
        assert_eq!(finished.statistics.writer_statistics.retired, 2);
        // one blocker or clause operation at a time
        assert_eq!(finished.statistics.max_in_flight_ops, 1);

        // watcher 1 overlaps its two blockers when not serialized
        let overlapped = run_full_expr(small_config(), sample_task()).unwrap();
        assert!(overlapped.statistics.max_in_flight_ops >= 2);
    }

    #[test]
    fn test_save_results() {
        test_utils::init();
        let finished = run_full_expr(small_config(), sample_task()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        finished
            .save(
                dir.path().join("statistics.json"),
                dir.path().join("satstat.json"),
                dir.path().join("cycle.json"),
            )
            .unwrap();
        let loaded: Statistics = serde_json::from_reader(
            File::open(dir.path().join("statistics.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(loaded, finished.statistics);
        let cycle: usize =
            serde_json::from_reader(File::open(dir.path().join("cycle.json")).unwrap()).unwrap();
        assert_eq!(cycle, finished.total_cycle);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = small_config();
        config.n_watchers = 0;
        assert!(Simulator::new(config).is_err());
    }
}
