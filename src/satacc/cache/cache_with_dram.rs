use std::collections::VecDeque;

use crate::{
    satacc::{
        dram::{DramModel, DramPreset},
        icnt::IcntMsgWrapper,
        MemReq, SataccStatus,
    },
    sim::{InOutPort, SimComponent},
};

use super::{CacheConfig, CacheCore, CacheId};

/// the l3 bank backed by one dram channel
#[derive(Debug)]
pub struct CacheWithDram {
    core: CacheCore,
    dram: DramModel,
    req_port: InOutPort<IcntMsgWrapper<MemReq>>,
    hit_latency: usize,
    accept_per_cycle: Option<usize>,
    ideal_memory: bool,
    /// missed tags the dram could not take yet, with their write flag
    temp_send_blocked_req: VecDeque<(u64, bool)>,
}

pub struct DramBankConfig {
    pub preset: DramPreset,
    /// number of l3 banks, each with its own channel
    pub banks: usize,
    pub multi_port: usize,
    pub queue_size: usize,
}

impl CacheWithDram {
    pub fn new(
        config: &CacheConfig,
        req_port: InOutPort<IcntMsgWrapper<MemReq>>,
        hit_latency: usize,
        accept_per_cycle: Option<usize>,
        ideal_memory: bool,
        dram_config: DramBankConfig,
    ) -> Self {
        let dram = DramModel::new(
            dram_config.preset,
            1,
            dram_config.banks,
            dram_config.multi_port,
            dram_config.queue_size,
        );
        Self {
            // a miss pays the lookup here and the dram service time once the dram starts it
            core: CacheCore::new(config, hit_latency, hit_latency, CacheId::L3Cache),
            dram,
            req_port,
            hit_latency,
            accept_per_cycle,
            ideal_memory,
            temp_send_blocked_req: VecDeque::new(),
        }
    }
}

impl SimComponent for CacheWithDram {
    type SharedStatus = SataccStatus;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let mut updated = false;
        let limit = self.accept_per_cycle.unwrap_or(usize::MAX);
        let mut accepted = 0;
        // a blocked miss holds the input port, the dram queue is full anyway
        while accepted < limit && self.temp_send_blocked_req.is_empty() {
            let Some(IcntMsgWrapper { msg, .. }) = self.req_port.in_port.recv() else {
                break;
            };
            let is_write = msg.is_write;
            if let Some(tag) = self.core.accept(msg, shared_status, current_cycle) {
                if self.ideal_memory {
                    self.core.schedule_fill(tag, current_cycle + self.hit_latency);
                } else {
                    self.temp_send_blocked_req.push_back((tag, is_write));
                }
            }
            accepted += 1;
            updated = true;
        }

        while let Some(&(tag, is_write)) = self.temp_send_blocked_req.front() {
            if self.dram.send(tag, is_write).is_err() {
                tracing::debug!(tag, "cannot send to dram now at cycle: {current_cycle}");
                break;
            }
            self.temp_send_blocked_req.pop_front();
            updated = true;
        }

        let dram_busy = self.dram.is_busy();
        let dram_cycles_before = shared_status.statistics.dram_statistics.total_dram_cycles;
        self.dram
            .tick(current_cycle, &mut shared_status.statistics.dram_statistics);
        let dram_cycles =
            shared_status.statistics.dram_statistics.total_dram_cycles - dram_cycles_before;
        shared_status
            .statistics
            .record_charge(CacheId::L3Cache, dram_cycles);
        while let Some(tag) = self.dram.pop() {
            tracing::debug!(tag, "dram returned at cycle: {current_cycle}");
            self.core.schedule_fill(tag, current_cycle + self.hit_latency);
            updated = true;
        }

        updated |= self.core.collect_ready(shared_status, current_cycle);
        updated |= self
            .core
            .send_ready(&self.req_port.out_port, |req| req.source_port, current_cycle);

        let busy = self.core.is_busy()
            || dram_busy
            || !self.temp_send_blocked_req.is_empty()
            || !self.req_port.in_port.is_empty();
        // the dram always finishes what it started
        updated |= dram_busy || self.core.waiting_timed_event(current_cycle);
        (busy, updated)
    }
}
