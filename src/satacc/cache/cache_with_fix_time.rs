use crate::{
    satacc::{icnt::IcntMsgWrapper, MemReq, SataccStatus},
    sim::{InOutPort, SimComponent},
};

use super::{CacheConfig, CacheCore, CacheId};

/// the l3 bank with fix time
/// the hit latency is fixed
/// when miss, the latency will be `miss_latency`
#[derive(Debug)]
pub struct CacheWithFixTime {
    core: CacheCore,
    req_port: InOutPort<IcntMsgWrapper<MemReq>>,
    miss_latency: usize,
    /// requests accepted per cycle, `None` accepts everything
    accept_per_cycle: Option<usize>,
}
impl CacheWithFixTime {
    /// under `ideal_memory` the miss is served at `hit_latency`
    pub fn new(
        config: &CacheConfig,
        req_port: InOutPort<IcntMsgWrapper<MemReq>>,
        hit_latency: usize,
        miss_latency: usize,
        accept_per_cycle: Option<usize>,
        ideal_memory: bool,
    ) -> Self {
        let miss_latency = if ideal_memory {
            hit_latency
        } else {
            miss_latency
        };
        Self {
            core: CacheCore::new(config, hit_latency, miss_latency, CacheId::L3Cache),
            req_port,
            miss_latency,
            accept_per_cycle,
        }
    }
}

impl SimComponent for CacheWithFixTime {
    type SharedStatus = SataccStatus;
    fn update(
        &mut self,
        shared_status: &mut Self::SharedStatus,
        current_cycle: usize,
    ) -> (bool, bool) {
        let mut updated = false;
        let limit = self.accept_per_cycle.unwrap_or(usize::MAX);
        let mut accepted = 0;
        while accepted < limit {
            let Some(IcntMsgWrapper { msg, .. }) = self.req_port.in_port.recv() else {
                break;
            };
            if let Some(tag) = self.core.accept(msg, shared_status, current_cycle) {
                self.core.schedule_fill(tag, current_cycle + self.miss_latency);
            }
            accepted += 1;
            updated = true;
        }
        updated |= self.core.collect_ready(shared_status, current_cycle);
        updated |= self
            .core
            .send_ready(&self.req_port.out_port, |req| req.source_port, current_cycle);

        let busy = self.core.is_busy() || !self.req_port.in_port.is_empty();
        updated |= self.core.waiting_timed_event(current_cycle);
        (busy, updated)
    }
}
