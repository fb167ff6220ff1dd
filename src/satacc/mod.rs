//! The accelerator model: the task recorded from the solver, every hardware
//! unit, and the [`Simulator`] wiring them together.
pub(crate) mod cache;
mod clause;
pub mod dram;
mod icnt;
mod satacc_minisat_task;
mod simulator;
pub mod statistics;
mod trail;
mod waiting_task;
mod watcher;
mod watcher_interface;
mod writer;

use enum_as_inner::EnumAsInner;

pub use cache::CacheConfig;
pub use satacc_minisat_task::{
    ClauseData, ClauseTask, RoundOutcome, RoundSource, SataccMinisatTask, SingleRoundStatistics,
    SingleRoundTask, WatcherTask,
};
pub use simulator::{run_full_expr, FinishedSimulation, RoundReport, Simulator};
pub use statistics::Statistics;

use crate::config::Config;

use self::icnt::IcntMsgWrapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumAsInner)]
pub enum MemReqType {
    /// the clause unit `.0` of the source interface reads the clause
    ClauseReadData(usize),
    /// the clause unit `.0` of the source interface reads a literal value
    ClauseReadValue(usize),
    WatcherReadMetaData,
    WatcherReadData,
    WatcherReadBlocker,
    WriterWrite,
}

#[derive(Debug, Clone)]
pub struct MemReq {
    pub addr: u64,
    pub id: usize,
    /// the memory icnt node the answer goes back to
    pub source_port: usize,
    /// the l3 bank
    pub mem_id: usize,
    pub is_write: bool,
    pub req_type: MemReqType,
}

/// the l3 bank (and dram channel) owning the 64 byte line of `addr`
pub fn mem_partition(addr: u64, mems: usize) -> usize {
    ((addr >> 6) % mems as u64) as usize
}

/// Node numbering of the memory interconnect.
///
/// `[0, total_watchers)` are the watcher interfaces, the next `mems` nodes
/// are the l3 banks and the last node is the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemLayout {
    pub total_watchers: usize,
    pub mems: usize,
}

impl MemLayout {
    pub fn new(config: &Config) -> Self {
        MemLayout {
            total_watchers: config.n_watchers,
            mems: config.mems,
        }
    }
    pub fn bank_port(&self, mem_id: usize) -> usize {
        self.total_watchers + mem_id
    }
    pub fn writer_port(&self) -> usize {
        self.total_watchers + self.mems
    }
    pub fn total_ports(&self) -> usize {
        self.total_watchers + self.mems + 1
    }
    /// build a request for the l3 bank owning `addr`
    pub fn l3_req(
        &self,
        context: &mut SataccStatus,
        addr: u64,
        source_port: usize,
        req_type: MemReqType,
        is_write: bool,
    ) -> IcntMsgWrapper<MemReq> {
        let mem_id = mem_partition(addr, self.mems);
        IcntMsgWrapper {
            msg: MemReq {
                addr,
                id: context.next_mem_id(),
                source_port,
                mem_id,
                is_write,
                req_type,
            },
            mem_target_port: self.bank_port(mem_id),
        }
    }
}

/// a processed clause asking the writer to update it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBackReq {
    pub clause_id: usize,
    pub addr: u64,
    pub watcher_pe_id: usize,
}

/// the state every hardware unit can see
#[derive(Debug)]
pub struct SataccStatus {
    pub current_mem_req_id: usize,
    pub statistics: Statistics,
    /// watcher lists and watcher operations dispatched but not finished
    pub pending_work: usize,
    /// watcher operations between their blocker read and their completion
    pub in_flight_ops: usize,
}

impl Default for SataccStatus {
    fn default() -> Self {
        SataccStatus::new(&Config::default())
    }
}

impl SataccStatus {
    pub fn new(config: &Config) -> Self {
        SataccStatus {
            current_mem_req_id: 0,
            statistics: Statistics::new(config),
            pending_work: 0,
            in_flight_ops: 0,
        }
    }

    pub fn next_mem_id(&mut self) -> usize {
        self.current_mem_req_id += 1;
        self.current_mem_req_id
    }

    /// a watcher list and its operations left the trail
    pub fn start_watcher_list(&mut self, operations: usize) {
        self.pending_work += 1 + operations;
    }

    pub fn finish_watcher_list(&mut self) {
        self.pending_work = self.pending_work.saturating_sub(1);
    }

    pub fn start_single_watcher_task(&mut self) {
        self.in_flight_ops += 1;
        self.statistics.max_in_flight_ops =
            self.statistics.max_in_flight_ops.max(self.in_flight_ops);
    }

    pub fn finish_single_watcher_task(&mut self) {
        self.pending_work = self.pending_work.saturating_sub(1);
        self.in_flight_ops = self.in_flight_ops.saturating_sub(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_layout() {
        let mut config = Config::default();
        config.n_watchers = 4;
        config.mems = 2;
        let layout = MemLayout::new(&config);
        assert_eq!(layout.bank_port(1), 5);
        assert_eq!(layout.writer_port(), 6);
        assert_eq!(layout.total_ports(), 7);

        let mut status = SataccStatus::new(&config);
        let req = layout.l3_req(&mut status, 64, 3, MemReqType::WatcherReadData, false);
        assert_eq!(req.msg.mem_id, 1);
        assert_eq!(req.mem_target_port, 5);
        assert_eq!(req.msg.source_port, 3);
        assert_eq!(req.msg.id, 1);
        assert_eq!(mem_partition(128, 2), 0);
    }

    #[test]
    fn test_pending_work() {
        let mut status = SataccStatus::default();
        status.start_watcher_list(2);
        assert_eq!(status.pending_work, 3);
        status.finish_watcher_list();
        status.start_single_watcher_task();
        assert_eq!(status.in_flight_ops, 1);
        status.start_single_watcher_task();
        assert_eq!(status.in_flight_ops, 2);
        status.finish_single_watcher_task();
        status.finish_single_watcher_task();
        assert_eq!(status.pending_work, 0);
        assert_eq!(status.in_flight_ops, 0);
        assert_eq!(status.statistics.max_in_flight_ops, 2);
    }
}
